use crate::data::SoftConstraintTotals;
use crate::domain::{TupleKey, ValidDomain};
use crate::instance::{Block, Instance};
use good_lp::{
    constraint, default_solver, variable, Constraint, Expression, ProblemVariables,
    ResolutionError, Solution, SolverModel, Variable,
};
use log::{debug, info};
use std::collections::HashMap;
use std::time::Instant;

/// Solver invocation knobs. One thread and a fixed seed keep runs
/// reproducible; raise the thread count for large instances.
#[derive(Debug, Clone)]
pub struct SolveOptions {
    pub time_limit_seconds: f64,
    pub threads: u32,
    pub random_seed: i32,
    pub log_to_console: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        SolveOptions {
            time_limit_seconds: 120.0,
            threads: 1,
            random_seed: 1234,
            log_to_console: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolveStatus {
    Optimal,
    TimeLimitFeasible,
    Infeasible,
    TimeLimitNoSolution,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SolveResult {
    pub status: SolveStatus,
    pub objective: f64,
    pub breakdown: SoftConstraintTotals,
    pub chosen: Vec<TupleKey>,
}

impl SolveResult {
    pub fn has_solution(&self) -> bool {
        matches!(
            self.status,
            SolveStatus::Optimal | SolveStatus::TimeLimitFeasible
        )
    }
}

/// The declared model, ready to be handed to the solver. Extra tagged
/// constraints (what-if queries, objective cutoffs) are appended at
/// solve time so the same build can back several solves.
pub struct BuiltModel {
    vars: ProblemVariables,
    pub x: HashMap<TupleKey, Variable>,
    pub tuple_order: Vec<TupleKey>,
    /// Start variables per (course, block, day, period), one per room.
    pub starts: HashMap<(usize, Block, usize, u32), Vec<Variable>>,
    objective: Expression,
    s1: Expression,
    s2: Expression,
    s3: Expression,
    constraints: Vec<Constraint>,
}

impl BuiltModel {
    /// `S1 + S2 + S3 <= bound`, used both for the warm-start cutoff and
    /// the what-if minimality bound.
    pub fn objective_bound(&self, bound: f64) -> Constraint {
        constraint!(self.objective.clone() <= bound)
    }

    pub fn num_assignment_vars(&self) -> usize {
        self.x.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }
}

/// Declares variables, hard constraints and the three soft-constraint
/// linearizations over the pruned domain. The arithmetic here must stay
/// in lockstep with `score::evaluate`.
pub fn build_model(inst: &Instance, domain: &ValidDomain) -> BuiltModel {
    let mut vars = ProblemVariables::new();
    let mut x: HashMap<TupleKey, Variable> = HashMap::new();
    let mut starts: HashMap<(usize, Block, usize, u32), Vec<Variable>> = HashMap::new();
    let mut course_occ: HashMap<(usize, Block, usize, u32), Vec<Variable>> = HashMap::new();
    let mut room_occ: HashMap<(usize, Block, usize, u32), Vec<Variable>> = HashMap::new();
    let mut inst_occ: HashMap<(usize, Block, usize, u32), Vec<Variable>> = HashMap::new();
    let mut course_block_starts: HashMap<(usize, Block), Vec<Variable>> = HashMap::new();
    let mut course_day_starts: HashMap<(usize, Block, usize), Vec<Variable>> = HashMap::new();

    // decision map over the pruned domain; occupancy registries let the
    // conflict constraints below be written as plain sums
    for &key in &domain.tuples {
        let (c, b, d, p, r) = key;
        let v = vars.add(variable().binary());
        x.insert(key, v);
        let dur = inst.courses[c].periods_per_session;
        starts.entry((c, b, d, p)).or_default().push(v);
        course_block_starts.entry((c, b)).or_default().push(v);
        course_day_starts.entry((c, b, d)).or_default().push(v);
        for t in p..p + dur {
            course_occ.entry((c, b, d, t)).or_default().push(v);
            room_occ.entry((r, b, d, t)).or_default().push(v);
            inst_occ
                .entry((inst.courses[c].instructor, b, d, t))
                .or_default()
                .push(v);
        }
    }

    let blocks: Vec<Block> = [1u8, 2]
        .into_iter()
        .filter(|&b| inst.block_weight(b) > 0)
        .collect();

    let mut constraints: Vec<Constraint> = Vec::new();

    // at most one course per instructor-period, with the linked
    // per-period teaching indicator
    for i in 0..inst.instructors.len() {
        for &b in &blocks {
            for d in 0..inst.days.len() {
                for p in 1..=inst.num_periods {
                    if let Some(vs) = inst_occ.get(&(i, b, d, p)) {
                        let occ: Expression = vs.iter().copied().sum();
                        constraints.push(constraint!(occ.clone() <= 1));
                        let h = vars.add(variable().binary());
                        constraints.push(constraint!(Expression::from(h) - occ == 0));
                    }
                }
            }
        }
    }

    // no room double-booking
    for r in 0..inst.rooms.len() {
        for &b in &blocks {
            for d in 0..inst.days.len() {
                for p in 1..=inst.num_periods {
                    if let Some(vs) = room_occ.get(&(r, b, d, p)) {
                        if vs.len() > 1 {
                            let occ: Expression = vs.iter().copied().sum();
                            constraints.push(constraint!(occ <= 1));
                        }
                    }
                }
            }
        }
    }

    // required sessions per block. Emitted even when no variable
    // survived pruning, which correctly renders the model infeasible.
    for (c, course) in inst.courses.iter().enumerate() {
        for &b in &course.blocks {
            let total: Expression = course_block_starts
                .get(&(c, b))
                .map(|vs| vs.iter().copied().sum())
                .unwrap_or_else(|| Expression::from(0));
            constraints.push(constraint!(total == course.sessions_per_week as f64));
        }
    }

    // at most one session per course-day
    for (c, course) in inst.courses.iter().enumerate() {
        for &b in &course.blocks {
            for d in 0..inst.days.len() {
                if let Some(vs) = course_day_starts.get(&(c, b, d)) {
                    if vs.len() > 1 {
                        let day_total: Expression = vs.iter().copied().sum();
                        constraints.push(constraint!(day_total <= 1));
                    }
                }
            }
        }
    }

    // a full-term course repeats the same weekly pattern in both blocks
    for &(c, b, d, p, r) in &domain.tuples {
        if b != 1 || inst.courses[c].blocks.len() != 2 {
            continue;
        }
        if let Some(&v2) = x.get(&(c, 2, d, p, r)) {
            let diff = Expression::from(x[&(c, b, d, p, r)]) - v2;
            constraints.push(constraint!(diff == 0));
        }
    }

    let occ_expr = |c: usize, b: Block, d: usize, p: u32| -> Option<Expression> {
        course_occ
            .get(&(c, b, d, p))
            .map(|vs| vs.iter().copied().sum())
    };

    // S1: student conflicts, one indicator per co-occupied period
    let w1 = inst.weights.student_conflict;
    let mut s1 = Expression::from(0);
    for c1 in 0..inst.courses.len() {
        for c2 in (c1 + 1)..inst.courses.len() {
            let cc = inst.students_cc[c1][c2];
            if cc == 0 {
                continue;
            }
            for &b in &inst.courses[c1].blocks {
                if !inst.courses[c2].blocks.contains(&b) {
                    continue;
                }
                let bw = inst.block_weight(b) as f64;
                for d in 0..inst.days.len() {
                    for p in 1..=inst.num_periods {
                        let (Some(o1), Some(o2)) = (occ_expr(c1, b, d, p), occ_expr(c2, b, d, p))
                        else {
                            continue;
                        };
                        let phi = vars.add(variable().binary());
                        constraints.push(constraint!(o1 + o2 - phi <= 1));
                        s1 += (w1 * cc as f64 * bw) * phi;
                    }
                }
            }
        }
    }

    // S2: symmetric back-to-back metric per instructor-day. The product
    // has_teaching * (2B - T + 1) is linearized through g with
    // McCormick-style bounds, M = number of the instructor's courses in
    // the block.
    let w2 = inst.weights.compactness;
    let mut s2 = Expression::from(0);
    for (i, instructor) in inst.instructors.iter().enumerate() {
        let pref = instructor.back_to_back_preference;
        if pref == 0 {
            continue;
        }
        for &b in &blocks {
            let active: Vec<usize> = inst
                .courses
                .iter()
                .enumerate()
                .filter(|(_, c)| c.instructor == i && c.blocks.contains(&b))
                .map(|(idx, _)| idx)
                .collect();
            if active.is_empty() {
                continue;
            }
            let max_t = active.len() as f64;
            let bw = inst.block_weight(b) as f64;
            for d in 0..inst.days.len() {
                let day_vars: Vec<Variable> = active
                    .iter()
                    .filter_map(|&c| course_day_starts.get(&(c, b, d)))
                    .flatten()
                    .copied()
                    .collect();
                if day_vars.is_empty() {
                    continue;
                }
                let t_expr: Expression = day_vars.iter().copied().sum();

                // adjacency indicators, both directions of every pair
                let mut b_expr = Expression::from(0);
                for &c1 in &active {
                    let dur1 = inst.courses[c1].periods_per_session;
                    for &c2 in &active {
                        if c1 == c2 {
                            continue;
                        }
                        for p in 1..=inst.num_periods {
                            let (Some(first), Some(second)) = (
                                starts.get(&(c1, b, d, p)),
                                starts.get(&(c2, b, d, p + dur1)),
                            ) else {
                                continue;
                            };
                            let sum1: Expression = first.iter().copied().sum();
                            let sum2: Expression = second.iter().copied().sum();
                            let z = vars.add(variable().binary());
                            constraints.push(constraint!(Expression::from(z) - sum1.clone() <= 0));
                            constraints.push(constraint!(Expression::from(z) - sum2.clone() <= 0));
                            constraints.push(constraint!(sum1 + sum2 - z <= 1));
                            b_expr += z;
                        }
                    }
                }

                let ht = vars.add(variable().binary());
                constraints.push(constraint!(Expression::from(ht) - t_expr.clone() <= 0));
                constraints.push(constraint!(t_expr.clone() - max_t * ht <= 0));

                let g = vars.add(variable().min(-max_t).max(max_t));
                let two_b = 2.0 * b_expr;
                // g >= 2B - T + 1 - M(1 - ht)
                constraints.push(constraint!(
                    Expression::from(g) - two_b.clone() + t_expr.clone() - max_t * ht
                        >= 1.0 - max_t
                ));
                // g <= 2B - T + 1 + M(1 - ht)
                constraints.push(constraint!(
                    Expression::from(g) - two_b + t_expr.clone() + max_t * ht <= 1.0 + max_t
                ));
                // |g| <= M * ht
                constraints.push(constraint!(Expression::from(g) + max_t * ht >= 0));
                constraints.push(constraint!(Expression::from(g) - max_t * ht <= 0));

                s2 += (w2 * pref as f64 * bw) * g;
            }
        }
    }

    // S3: lunch occupancy indicators for instructors who opted out
    let w3 = inst.weights.lunch;
    let mut s3 = Expression::from(0);
    for (c, course) in inst.courses.iter().enumerate() {
        let pen = inst.instructors[course.instructor].lunch_penalty();
        if pen == 0.0 {
            continue;
        }
        for &b in &course.blocks {
            let bw = inst.block_weight(b) as f64;
            for d in 0..inst.days.len() {
                for &lp in &inst.lunch_periods {
                    let Some(occ) = occ_expr(c, b, d, lp) else {
                        continue;
                    };
                    let pi = vars.add(variable().binary());
                    constraints.push(constraint!(occ - pi <= 0));
                    s3 += (w3 * pen * bw) * pi;
                }
            }
        }
    }

    let objective = s1.clone() + s2.clone() + s3.clone();
    debug!(
        "built MILP: {} assignment variables, {} constraints",
        x.len(),
        constraints.len()
    );

    BuiltModel {
        vars,
        x,
        tuple_order: domain.tuples.clone(),
        starts,
        objective,
        s1,
        s2,
        s3,
        constraints,
    }
}

/// Hands the model to the solver and maps the outcome. `extra` carries
/// per-solve constraints (warm-start cutoff, what-if queries).
pub fn solve_model(model: BuiltModel, extra: Vec<Constraint>, opts: &SolveOptions) -> SolveResult {
    let BuiltModel {
        vars,
        x,
        tuple_order,
        starts: _,
        objective,
        s1,
        s2,
        s3,
        constraints,
    } = model;

    info!(
        "starting MILP solve: {} assignment variables, {} constraints, time limit {:.0}s",
        x.len(),
        constraints.len() + extra.len(),
        opts.time_limit_seconds
    );

    let started = Instant::now();
    let mut solver = vars
        .minimise(objective.clone())
        .using(default_solver)
        .set_option("time_limit", opts.time_limit_seconds)
        .set_option("threads", opts.threads as i32)
        .set_option("presolve", "on")
        .set_option("mip_heuristic_effort", 0.2)
        .set_option("random_seed", opts.random_seed)
        .set_option("log_to_console", opts.log_to_console);
    for c in constraints {
        solver.add_constraint(c);
    }
    for c in extra {
        solver.add_constraint(c);
    }

    match solver.solve() {
        Ok(solution) => {
            let elapsed = started.elapsed().as_secs_f64();
            let chosen: Vec<TupleKey> = tuple_order
                .iter()
                .copied()
                .filter(|key| solution.value(x[key]) > 0.5)
                .collect();
            let breakdown = SoftConstraintTotals {
                student_conflicts: s1.eval_with(&solution),
                instructor_compactness: s2.eval_with(&solution),
                lunch_teaching: s3.eval_with(&solution),
            };
            let status = if elapsed >= opts.time_limit_seconds {
                SolveStatus::TimeLimitFeasible
            } else {
                SolveStatus::Optimal
            };
            info!(
                "solve finished in {elapsed:.2}s with objective {}",
                objective.eval_with(&solution)
            );
            SolveResult {
                status,
                objective: objective.eval_with(&solution),
                breakdown,
                chosen,
            }
        }
        Err(ResolutionError::Infeasible) => SolveResult {
            status: SolveStatus::Infeasible,
            objective: 0.0,
            breakdown: SoftConstraintTotals::default(),
            chosen: Vec::new(),
        },
        Err(ResolutionError::Unbounded) => SolveResult {
            status: SolveStatus::Failed("model reported unbounded".into()),
            objective: 0.0,
            breakdown: SoftConstraintTotals::default(),
            chosen: Vec::new(),
        },
        Err(other) => {
            let message = other.to_string();
            let status = if message.to_ascii_lowercase().contains("time") {
                SolveStatus::TimeLimitNoSolution
            } else {
                SolveStatus::Failed(message)
            };
            SolveResult {
                status,
                objective: 0.0,
                breakdown: SoftConstraintTotals::default(),
                chosen: Vec::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::*;
    use crate::domain;
    use crate::instance::Instance;

    fn input() -> SchedulingInput {
        SchedulingInput {
            term_config: TermConfig {
                num_weeks: 2,
                days: vec!["Mon".into()],
                day_start_time: "09:00".into(),
                day_end_time: "11:00".into(),
                period_length_minutes: 30,
            },
            classrooms: vec![ClassroomSpec {
                id: "R1".into(),
                name: String::new(),
                capacity: 30,
            }],
            instructors: vec![InstructorSpec {
                id: "I1".into(),
                name: String::new(),
                availability: None,
                back_to_back_preference: 1,
                allow_lunch_teaching: false,
            }],
            courses: vec![CourseSpec {
                id: "C1".into(),
                name: String::new(),
                instructor_id: "I1".into(),
                expected_enrollment: 10,
                course_type: CourseType::FullTerm,
            }],
            students: vec![],
            conflict_weights: ConflictWeights {
                global_student_conflict_weight: 1.0,
                instructor_compactness_weight: 1.0,
                preferred_time_slots_weight: 1.0,
            },
        }
    }

    #[test]
    fn one_variable_per_domain_tuple() {
        let inst = Instance::build(&input()).unwrap();
        let dom = domain::enumerate(&inst);
        let model = build_model(&inst, &dom);
        assert_eq!(model.num_assignment_vars(), dom.len());
        assert_eq!(model.tuple_order, dom.tuples);
        assert!(model.num_constraints() > 0);
    }

    #[test]
    fn start_lists_group_rooms() {
        let mut raw = input();
        raw.classrooms.push(ClassroomSpec {
            id: "R2".into(),
            name: String::new(),
            capacity: 30,
        });
        let inst = Instance::build(&raw).unwrap();
        let dom = domain::enumerate(&inst);
        let model = build_model(&inst, &dom);
        // Two rooms admit the course, so every (c, b, d, p) start list
        // holds two variables.
        assert!(model.starts.values().all(|vs| vs.len() == 2));
    }
}

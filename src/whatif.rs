use crate::data::{
    IisItem, QueryConstraint, Schedule, SchedulingInput, WhatIfOutput, WhatIfStatus,
};
use crate::domain;
use crate::error::ScheduleError;
use crate::instance::{Block, Instance};
use crate::model::{self, BuiltModel, SolveOptions, SolveResult, SolveStatus};
use crate::output;
use good_lp::{constraint, Constraint, Expression};
use log::{info, warn};
use std::collections::HashSet;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct WhatIfOptions {
    pub solve: SolveOptions,
    /// Skip conflict extraction entirely and emit the conservative report.
    pub skip_iis: bool,
    /// Wall-clock budget for the whole conflict extraction.
    pub iis_time_limit_seconds: f64,
}

impl Default for WhatIfOptions {
    fn default() -> Self {
        WhatIfOptions {
            solve: SolveOptions::default(),
            skip_iis: false,
            iis_time_limit_seconds: 60.0,
        }
    }
}

/// A query resolved to internal indices. Several normalized entries can
/// share one tag: an instructor-level day veto expands to one entry per
/// course while staying a single user-visible query.
#[derive(Debug, Clone)]
struct NormalizedQuery {
    tag: usize,
    body: QueryBody,
}

#[derive(Debug, Clone, Copy)]
enum QueryBody {
    EnforceSlot { course: usize, block: Block, day: usize, period: u32 },
    VetoSlot { course: usize, block: Option<Block>, day: usize, period: u32 },
    VetoDay { course: usize, day: usize },
    EnforceRoom { course: usize, room: usize },
    /// Internal 1-based period by which every session must have ended.
    EnforceBefore { course: usize, last_period: u32 },
    /// Internal 1-based period at or after which every session must start.
    EnforceAfter { course: usize, first_period: u32 },
}

/// Answers a counterfactual query: rebuild the full model, append the
/// user constraints and the minimality bound `objective <= original`,
/// and re-solve. Infeasibility is explained by a conflict set over the
/// appended constraints.
pub fn analyze(
    input: &SchedulingInput,
    queries: &[QueryConstraint],
    original_objective: f64,
    opts: &WhatIfOptions,
) -> WhatIfOutput {
    let inst = match Instance::build(input) {
        Ok(i) => i,
        Err(e) => return error_output(WhatIfStatus::Error, e.to_string()),
    };
    let normalized = match normalize(&inst, queries) {
        Ok(n) => n,
        Err(e) => return error_output(WhatIfStatus::UdspError, e.to_string()),
    };
    let dom = domain::enumerate(&inst);

    // Tag indices: one per query, minimality last.
    let minimality_tag = queries.len();
    let num_tags = queries.len() + 1;
    let bound = original_objective + 1e-6 * original_objective.abs().max(1.0);

    let solve_subset = |included: &HashSet<usize>| -> SolveResult {
        let built = model::build_model(&inst, &dom);
        let mut extra = Vec::new();
        for q in &normalized {
            if included.contains(&q.tag) {
                extra.push(query_constraint(&inst, &built, &q.body));
            }
        }
        if included.contains(&minimality_tag) {
            extra.push(built.objective_bound(bound));
        }
        model::solve_model(built, extra, &opts.solve)
    };

    let all: HashSet<usize> = (0..num_tags).collect();
    info!(
        "what-if: {} query constraints plus minimality bound {bound:.4}",
        queries.len()
    );
    let primary = solve_subset(&all);

    match primary.status {
        SolveStatus::Optimal | SolveStatus::TimeLimitFeasible => WhatIfOutput {
            status: WhatIfStatus::FeasibleQuery,
            alternative_objective: Some(primary.objective),
            objective_difference: Some(primary.objective - original_objective),
            schedule: Schedule {
                assignments: output::expand_assignments(&inst, &primary.chosen),
            },
            iis: Vec::new(),
            interpretation: None,
            error: None,
        },
        SolveStatus::Infeasible => {
            let membership = if opts.skip_iis {
                None
            } else {
                extract_conflict_set(&solve_subset, num_tags, opts.iis_time_limit_seconds)
            };
            infeasible_query_output(queries, original_objective, minimality_tag, membership)
        }
        SolveStatus::TimeLimitNoSolution => {
            // No incumbent inside the limit; infeasibility is unproven, so
            // only the conservative report is defensible.
            infeasible_query_output(queries, original_objective, minimality_tag, None)
        }
        SolveStatus::Failed(message) => error_output(WhatIfStatus::Error, message),
    }
}

/// Deletion filter over the tagged constraints: drop one tag at a time
/// and re-solve; a tag whose removal restores feasibility is essential
/// and stays, the rest are discarded. The base model is feasible (it
/// was solved for the original schedule), so the surviving set is a
/// minimal infeasible subset of the tags. Returns None when the budget
/// runs out or a probe fails, triggering the conservative report.
fn extract_conflict_set<F>(solve_subset: &F, num_tags: usize, budget_seconds: f64) -> Option<Vec<usize>>
where
    F: Fn(&HashSet<usize>) -> SolveResult,
{
    let deadline = Instant::now() + Duration::from_secs_f64(budget_seconds);
    let mut active: HashSet<usize> = (0..num_tags).collect();
    for tag in 0..num_tags {
        if Instant::now() >= deadline {
            warn!("conflict extraction ran out of budget at tag {tag}");
            return None;
        }
        let mut candidate = active.clone();
        candidate.remove(&tag);
        match solve_subset(&candidate).status {
            SolveStatus::Infeasible => {
                active.remove(&tag);
            }
            SolveStatus::Optimal | SolveStatus::TimeLimitFeasible => {}
            other => {
                warn!("conflict extraction probe failed ({other:?})");
                return None;
            }
        }
    }
    let mut result: Vec<usize> = active.into_iter().collect();
    result.sort_unstable();
    Some(result)
}

fn infeasible_query_output(
    queries: &[QueryConstraint],
    original_objective: f64,
    minimality_tag: usize,
    membership: Option<Vec<usize>>,
) -> WhatIfOutput {
    let minimality_description = format!(
        "the alternative schedule must score no worse than the original optimum ({original_objective:.4})"
    );
    let (iis, interpretation) = match membership {
        Some(tags) => {
            let items: Vec<IisItem> = tags
                .iter()
                .map(|&t| {
                    if t == minimality_tag {
                        IisItem {
                            tag: "minimality".into(),
                            description: minimality_description.clone(),
                            confirmed: true,
                        }
                    } else {
                        IisItem {
                            tag: format!("query_{t}"),
                            description: queries[t].to_string(),
                            confirmed: true,
                        }
                    }
                })
                .collect();
            let has_minimality = tags.contains(&minimality_tag);
            let has_queries = tags.iter().any(|&t| t != minimality_tag);
            let text = if items.is_empty() {
                "the base scheduling problem is itself infeasible; no query constraint is to blame"
                    .to_string()
            } else if has_minimality && has_queries {
                "the requested changes are only achievable at a strictly worse objective than the original optimum".to_string()
            } else if has_minimality {
                "the scenario is feasible but strictly worse than the original optimum".to_string()
            } else {
                "the requested changes contradict the hard scheduling constraints regardless of cost".to_string()
            };
            (items, text)
        }
        None => {
            let mut items: Vec<IisItem> = queries
                .iter()
                .enumerate()
                .map(|(i, q)| IisItem {
                    tag: format!("query_{i}"),
                    description: q.to_string(),
                    confirmed: false,
                })
                .collect();
            items.push(IisItem {
                tag: "minimality".into(),
                description: minimality_description,
                confirmed: false,
            });
            (
                items,
                "conflict analysis was unavailable; all query constraints and the minimality bound are likely in conflict".to_string(),
            )
        }
    };
    WhatIfOutput {
        status: WhatIfStatus::InfeasibleQuery,
        alternative_objective: None,
        objective_difference: None,
        schedule: Schedule::default(),
        iis,
        interpretation: Some(interpretation),
        error: None,
    }
}

fn error_output(status: WhatIfStatus, message: String) -> WhatIfOutput {
    WhatIfOutput {
        status,
        alternative_objective: None,
        objective_difference: None,
        schedule: Schedule::default(),
        iis: Vec::new(),
        interpretation: None,
        error: Some(message),
    }
}

fn normalize(
    inst: &Instance,
    queries: &[QueryConstraint],
) -> Result<Vec<NormalizedQuery>, ScheduleError> {
    let course = |id: &str| {
        inst.course_by_id(id)
            .ok_or_else(|| ScheduleError::invalid_query(format!("unknown course '{id}'")))
    };
    let day = |label: &str| {
        inst.day_by_label(label)
            .ok_or_else(|| ScheduleError::invalid_query(format!("unknown day '{label}'")))
    };
    let week = |w: u32| {
        if w >= inst.num_weeks {
            Err(ScheduleError::invalid_query(format!(
                "week {w} out of range (term has {} weeks)",
                inst.num_weeks
            )))
        } else {
            Ok(w + 1)
        }
    };
    let period = |p: u32| {
        if p >= inst.num_periods {
            Err(ScheduleError::invalid_query(format!(
                "period {p} out of range (day has {} periods)",
                inst.num_periods
            )))
        } else {
            Ok(p + 1)
        }
    };

    let mut normalized = Vec::new();
    for (tag, query) in queries.iter().enumerate() {
        match query {
            QueryConstraint::EnforceTimeSlot { course_id, week: w, day: d, period_start } => {
                normalized.push(NormalizedQuery {
                    tag,
                    body: QueryBody::EnforceSlot {
                        course: course(course_id)?,
                        block: inst.block_of_week(week(*w)?),
                        day: day(d)?,
                        period: period(*period_start)?,
                    },
                });
            }
            QueryConstraint::VetoTimeSlot { course_id, week: w, day: d, period_start } => {
                let block = match w {
                    Some(w) => Some(inst.block_of_week(week(*w)?)),
                    None => None,
                };
                normalized.push(NormalizedQuery {
                    tag,
                    body: QueryBody::VetoSlot {
                        course: course(course_id)?,
                        block,
                        day: day(d)?,
                        period: period(*period_start)?,
                    },
                });
            }
            QueryConstraint::VetoDay { course_id, instructor_id, day: d } => {
                let d = day(d)?;
                if let Some(course_id) = course_id {
                    normalized.push(NormalizedQuery {
                        tag,
                        body: QueryBody::VetoDay { course: course(course_id)?, day: d },
                    });
                } else if let Some(instructor_id) = instructor_id {
                    let i = inst.instructor_by_id(instructor_id).ok_or_else(|| {
                        ScheduleError::invalid_query(format!(
                            "unknown instructor '{instructor_id}'"
                        ))
                    })?;
                    let courses = inst.courses_of_instructor(i);
                    if courses.is_empty() {
                        return Err(ScheduleError::invalid_query(format!(
                            "no courses found for instructor '{instructor_id}'"
                        )));
                    }
                    for c in courses {
                        normalized.push(NormalizedQuery {
                            tag,
                            body: QueryBody::VetoDay { course: c, day: d },
                        });
                    }
                } else {
                    return Err(ScheduleError::invalid_query(
                        "veto_day needs a course_id or an instructor_id",
                    ));
                }
            }
            QueryConstraint::EnforceRoom { course_id, room_id } => {
                let room = inst.room_by_id(room_id).ok_or_else(|| {
                    ScheduleError::invalid_query(format!("unknown room '{room_id}'"))
                })?;
                normalized.push(NormalizedQuery {
                    tag,
                    body: QueryBody::EnforceRoom { course: course(course_id)?, room },
                });
            }
            QueryConstraint::EnforceBeforeTime { course_id, period_end } => {
                normalized.push(NormalizedQuery {
                    tag,
                    body: QueryBody::EnforceBefore {
                        course: course(course_id)?,
                        last_period: period(*period_end)?,
                    },
                });
            }
            QueryConstraint::EnforceAfterTime { course_id, period_start } => {
                normalized.push(NormalizedQuery {
                    tag,
                    body: QueryBody::EnforceAfter {
                        course: course(course_id)?,
                        first_period: period(*period_start)?,
                    },
                });
            }
        }
    }

    reject_contradictions(inst, &normalized)?;
    Ok(normalized)
}

/// An enforce and a veto on the same (course, day, period) can never
/// both hold; surface that before burning solver time.
fn reject_contradictions(
    inst: &Instance,
    normalized: &[NormalizedQuery],
) -> Result<(), ScheduleError> {
    for a in normalized {
        let QueryBody::EnforceSlot { course, block, day, period } = &a.body else {
            continue;
        };
        for b in normalized {
            if let QueryBody::VetoSlot {
                course: vc,
                block: vb,
                day: vd,
                period: vp,
            } = &b.body
            {
                if vc == course
                    && vd == day
                    && vp == period
                    && vb.map_or(true, |vb| vb == *block)
                {
                    return Err(ScheduleError::invalid_query(format!(
                        "contradictory constraints: cannot both enforce and veto '{}' on {} at period {}",
                        inst.courses[*course].id,
                        inst.days[*day],
                        period - 1
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Translates one normalized query into a linear constraint over the
/// model's start variables. A sum that comes out empty (the slot never
/// survived pruning) yields an unsatisfiable equality, which is exactly
/// the answer the conflict set should attribute to that query.
fn query_constraint(inst: &Instance, model: &BuiltModel, body: &QueryBody) -> Constraint {
    let start_sum = |c: usize, b: Block, d: usize, p: u32| -> Expression {
        model
            .starts
            .get(&(c, b, d, p))
            .map(|vs| vs.iter().copied().sum())
            .unwrap_or_else(|| Expression::from(0))
    };
    match *body {
        QueryBody::EnforceSlot { course, block, day, period } => {
            let total = start_sum(course, block, day, period);
            constraint!(total == 1)
        }
        QueryBody::VetoSlot { course, block, day, period } => {
            let blocks: Vec<Block> = match block {
                Some(b) => vec![b],
                None => inst.courses[course].blocks.clone(),
            };
            let mut total = Expression::from(0);
            for b in blocks {
                total += start_sum(course, b, day, period);
            }
            constraint!(total == 0)
        }
        QueryBody::VetoDay { course, day } => {
            let mut total = Expression::from(0);
            for key in &model.tuple_order {
                let &(c, _, d, _, _) = key;
                if c == course && d == day {
                    total += model.x[key];
                }
            }
            constraint!(total == 0)
        }
        QueryBody::EnforceRoom { course, room } => {
            let mut total = Expression::from(0);
            for key in &model.tuple_order {
                let &(c, _, _, _, r) = key;
                if c == course && r == room {
                    total += model.x[key];
                }
            }
            constraint!(total >= 1)
        }
        QueryBody::EnforceBefore { course, last_period } => {
            session_count_bound(inst, model, course, |_p, end| end <= last_period)
        }
        QueryBody::EnforceAfter { course, first_period } => {
            session_count_bound(inst, model, course, |p, _end| p >= first_period)
        }
    }
}

/// Weighted count of sessions whose placement satisfies `keep`, forced
/// to cover all of the course's sessions. Each block-level start stands
/// for one session per active week in that block.
fn session_count_bound(
    inst: &Instance,
    model: &BuiltModel,
    course: usize,
    keep: impl Fn(u32, u32) -> bool,
) -> Constraint {
    let dur = inst.courses[course].periods_per_session;
    let mut total = Expression::from(0);
    for key in &model.tuple_order {
        let &(c, b, _d, p, _r) = key;
        if c != course || !keep(p, p + dur - 1) {
            continue;
        }
        let weeks = inst.course_weeks_in_block(c, b) as f64;
        total += weeks * model.x[key];
    }
    let required = inst.courses[course].total_sessions as f64;
    constraint!(total >= required)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::*;

    fn input() -> SchedulingInput {
        SchedulingInput {
            term_config: TermConfig {
                num_weeks: 2,
                days: vec!["Mon".into(), "Tue".into()],
                day_start_time: "09:00".into(),
                day_end_time: "12:00".into(),
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
                back_to_back_preference: 0,
                allow_lunch_teaching: true,
            }],
            courses: vec![
                CourseSpec {
                    id: "C1".into(),
                    name: String::new(),
                    instructor_id: "I1".into(),
                    expected_enrollment: 10,
                    course_type: CourseType::FullTerm,
                },
                CourseSpec {
                    id: "C2".into(),
                    name: String::new(),
                    instructor_id: "I1".into(),
                    expected_enrollment: 10,
                    course_type: CourseType::FullTerm,
                },
            ],
            students: vec![],
            conflict_weights: ConflictWeights {
                global_student_conflict_weight: 1.0,
                instructor_compactness_weight: 1.0,
                preferred_time_slots_weight: 1.0,
            },
        }
    }

    #[test]
    fn rejects_unknown_references() {
        let inst = Instance::build(&input()).unwrap();
        let bad_course = vec![QueryConstraint::VetoDay {
            course_id: Some("ghost".into()),
            instructor_id: None,
            day: "Mon".into(),
        }];
        assert!(normalize(&inst, &bad_course).is_err());

        let bad_day = vec![QueryConstraint::VetoDay {
            course_id: Some("C1".into()),
            instructor_id: None,
            day: "Sun".into(),
        }];
        assert!(normalize(&inst, &bad_day).is_err());

        let bad_week = vec![QueryConstraint::EnforceTimeSlot {
            course_id: "C1".into(),
            week: 7,
            day: "Mon".into(),
            period_start: 0,
        }];
        assert!(normalize(&inst, &bad_week).is_err());

        let bad_period = vec![QueryConstraint::EnforceAfterTime {
            course_id: "C1".into(),
            period_start: 42,
        }];
        assert!(normalize(&inst, &bad_period).is_err());
    }

    #[test]
    fn instructor_day_veto_expands_per_course_with_shared_tag() {
        let inst = Instance::build(&input()).unwrap();
        let queries = vec![QueryConstraint::VetoDay {
            course_id: None,
            instructor_id: Some("I1".into()),
            day: "Tue".into(),
        }];
        let normalized = normalize(&inst, &queries).unwrap();
        assert_eq!(normalized.len(), 2);
        assert!(normalized.iter().all(|q| q.tag == 0));
    }

    #[test]
    fn veto_day_requires_a_target() {
        let inst = Instance::build(&input()).unwrap();
        let queries = vec![QueryConstraint::VetoDay {
            course_id: None,
            instructor_id: None,
            day: "Mon".into(),
        }];
        assert!(normalize(&inst, &queries).is_err());
    }

    #[test]
    fn contradictory_enforce_and_veto_is_rejected() {
        let inst = Instance::build(&input()).unwrap();
        let queries = vec![
            QueryConstraint::EnforceTimeSlot {
                course_id: "C1".into(),
                week: 0,
                day: "Mon".into(),
                period_start: 2,
            },
            QueryConstraint::VetoTimeSlot {
                course_id: "C1".into(),
                week: None,
                day: "Mon".into(),
                period_start: 2,
            },
        ];
        assert!(normalize(&inst, &queries).is_err());
    }

    #[test]
    fn week_maps_to_block() {
        let inst = Instance::build(&input()).unwrap();
        let queries = vec![QueryConstraint::EnforceTimeSlot {
            course_id: "C1".into(),
            week: 1,
            day: "Mon".into(),
            period_start: 0,
        }];
        let normalized = normalize(&inst, &queries).unwrap();
        match normalized[0].body {
            QueryBody::EnforceSlot { block, period, .. } => {
                assert_eq!(block, 2);
                assert_eq!(period, 1);
            }
            _ => panic!("unexpected body"),
        }
    }

    #[test]
    fn query_constraints_build_against_a_model() {
        let inst = Instance::build(&input()).unwrap();
        let dom = crate::domain::enumerate(&inst);
        let built = crate::model::build_model(&inst, &dom);
        let queries = vec![
            QueryConstraint::EnforceRoom { course_id: "C1".into(), room_id: "R1".into() },
            QueryConstraint::EnforceBeforeTime { course_id: "C1".into(), period_end: 4 },
            QueryConstraint::EnforceAfterTime { course_id: "C2".into(), period_start: 1 },
            QueryConstraint::VetoTimeSlot {
                course_id: "C2".into(),
                week: Some(0),
                day: "Mon".into(),
                period_start: 0,
            },
        ];
        let normalized = normalize(&inst, &queries).unwrap();
        for q in &normalized {
            let _ = query_constraint(&inst, &built, &q.body);
        }
    }
}

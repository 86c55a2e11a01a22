use crate::data::{RunStatus, Schedule, ScheduleAssignment, SchedulingOutput, SoftConstraintTotals};
use crate::domain::TupleKey;
use crate::instance::Instance;
use crate::model::{SolveResult, SolveStatus};

/// Expands block-level decisions into per-week assignments, restricted
/// to each course's active week range. Session numbering follows
/// enumeration order within each course.
pub fn expand_assignments(inst: &Instance, chosen: &[TupleKey]) -> Vec<ScheduleAssignment> {
    let mut counters = vec![0u32; inst.courses.len()];
    let mut out = Vec::new();
    for &(c, b, d, p, r) in chosen {
        let course = &inst.courses[c];
        let (block_start, block_end) = inst.block_range(b);
        let lo = course.week_start.max(block_start);
        let hi = course.week_end.min(block_end);
        for week in lo..=hi {
            counters[c] += 1;
            out.push(ScheduleAssignment {
                course_id: course.id.clone(),
                course_session_id: format!("{}_s{}", course.id, counters[c]),
                session_number: counters[c],
                room_id: inst.rooms[r].id.clone(),
                week: week - 1,
                day: inst.days[d].clone(),
                period_start: p - 1,
                period_length: course.periods_per_session,
                instructor_id: inst.instructors[course.instructor].id.clone(),
            });
        }
    }
    out
}

/// Assembles the run output from a solve result and the warm-start
/// baseline score.
pub fn format_output(
    inst: &Instance,
    result: &SolveResult,
    initial_score: f64,
) -> SchedulingOutput {
    match &result.status {
        SolveStatus::Optimal | SolveStatus::TimeLimitFeasible => {
            let status = if matches!(result.status, SolveStatus::Optimal) {
                RunStatus::Optimal
            } else {
                RunStatus::TimeLimitFeasible
            };
            SchedulingOutput {
                status,
                objective_value: Some(result.objective),
                improvement_summary: Some(format!(
                    "initial heuristic score {:.4} -> final objective {:.4}",
                    initial_score, result.objective
                )),
                soft_constraint_totals: result.breakdown,
                schedule: Schedule {
                    assignments: expand_assignments(inst, &result.chosen),
                },
                error: None,
                diagnostics: None,
            }
        }
        SolveStatus::Infeasible => infeasible_output(
            "solver proved the problem infeasible under the hard constraints",
        ),
        SolveStatus::TimeLimitNoSolution => {
            infeasible_output("time limit reached without a feasible incumbent")
        }
        SolveStatus::Failed(message) => SchedulingOutput {
            status: RunStatus::Error,
            objective_value: None,
            improvement_summary: None,
            soft_constraint_totals: SoftConstraintTotals::default(),
            schedule: Schedule::default(),
            error: Some(message.clone()),
            diagnostics: Some("unexpected solver failure".into()),
        },
    }
}

pub fn infeasible_output(diagnostics: &str) -> SchedulingOutput {
    SchedulingOutput {
        status: RunStatus::Infeasible,
        objective_value: None,
        improvement_summary: None,
        soft_constraint_totals: SoftConstraintTotals::default(),
        schedule: Schedule::default(),
        error: None,
        diagnostics: Some(diagnostics.into()),
    }
}

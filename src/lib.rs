//! Course-scheduling optimization core: a MILP over pruned
//! (course, block, day, period, room) tuples with a greedy warm start,
//! an exact heuristic score evaluator, and a what-if (UDSP) analyzer
//! that explains infeasible counterfactuals through a conflict set.

pub mod data;
pub mod domain;
pub mod error;
pub mod greedy;
pub mod instance;
pub mod model;
pub mod output;
pub mod score;
pub mod whatif;

pub use data::{
    QueryConstraint, RunStatus, Schedule, ScheduleAssignment, SchedulingInput, SchedulingOutput,
    SoftConstraintTotals, WhatIfOutput, WhatIfStatus,
};
pub use error::ScheduleError;
pub use model::SolveOptions;
pub use whatif::WhatIfOptions;

use log::info;

/// Runs one full optimization: normalize, prune, warm-start, build,
/// solve, format. Invalid input is the only error; solver failures are
/// folded into the returned status.
pub fn run_optimization(
    input: &SchedulingInput,
    opts: &SolveOptions,
) -> Result<SchedulingOutput, ScheduleError> {
    let inst = instance::Instance::build(input)?;
    let dom = domain::enumerate(&inst);
    if dom.is_empty() {
        return Ok(output::infeasible_output(
            "no feasible assignment tuples remain after pruning; the problem is over-constrained",
        ));
    }

    let warm = greedy::warm_start(&inst, &dom);
    let initial_score = score::total(&score::evaluate(&inst, &warm.tuples));

    let built = model::build_model(&inst, &dom);
    let mut extra = Vec::new();
    if warm.complete {
        // The greedy assignment is feasible at this score, so the bound
        // cannot cut off the optimum; it only prunes the search above
        // the incumbent the way an injected start would.
        let slack = 1e-6 * initial_score.abs().max(1.0);
        extra.push(built.objective_bound(initial_score + slack));
        info!("warm start complete, bounding objective at {initial_score:.4}");
    }

    let result = model::solve_model(built, extra, opts);
    Ok(output::format_output(&inst, &result, initial_score))
}

/// Answers a what-if query against the original problem and its optimal
/// objective. Never fails: every outcome is a status-tagged record.
pub fn run_what_if(
    input: &SchedulingInput,
    queries: &[QueryConstraint],
    original_objective: f64,
    opts: &WhatIfOptions,
) -> WhatIfOutput {
    whatif::analyze(input, queries, original_objective, opts)
}

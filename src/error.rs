use thiserror::Error;

/// Failures surfaced by the scheduling core.
///
/// Solver outcomes that are ordinary results (infeasible, time limit) are
/// not errors; they are reported as statuses on the output objects.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("solver failure: {0}")]
    Solver(String),
}

impl ScheduleError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        ScheduleError::InvalidInput(msg.into())
    }

    pub fn invalid_query(msg: impl Into<String>) -> Self {
        ScheduleError::InvalidQuery(msg.into())
    }
}

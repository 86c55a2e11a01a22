use serde::{Deserialize, Serialize};
use std::fmt;

/// Term-wide calendar settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TermConfig {
    pub num_weeks: u32,
    pub days: Vec<String>,
    pub day_start_time: String,
    pub day_end_time: String,
    pub period_length_minutes: u32,
}

/// A physical room with a given capacity.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassroomSpec {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub capacity: u32,
}

/// One (day, period) slot in an instructor's availability list.
/// Period indices are 0-based on the wire.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AvailabilitySlot {
    pub day: String,
    pub period_index: u32,
}

/// An instructor with their scheduling constraints and preferences.
///
/// When `availability` is absent the instructor is fully available; when
/// any slots are listed, only the listed slots are available.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstructorSpec {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub availability: Option<Vec<AvailabilitySlot>>,
    #[serde(default)]
    pub back_to_back_preference: u32,
    #[serde(default)]
    pub allow_lunch_teaching: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseType {
    FullTerm,
    FirstHalfTerm,
    SecondHalfTerm,
}

/// A course to be scheduled.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CourseSpec {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub instructor_id: String,
    pub expected_enrollment: u32,
    #[serde(rename = "type")]
    pub course_type: CourseType,
}

/// One student's enrollment list; only used to build the pairwise
/// conflict matrix.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StudentSpec {
    pub enrolled_course_ids: Vec<String>,
}

/// Weights for the three soft objectives (S1, S2, S3).
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ConflictWeights {
    pub global_student_conflict_weight: f64,
    pub instructor_compactness_weight: f64,
    pub preferred_time_slots_weight: f64,
}

/// The complete input for one optimization run.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulingInput {
    pub term_config: TermConfig,
    pub classrooms: Vec<ClassroomSpec>,
    pub instructors: Vec<InstructorSpec>,
    pub courses: Vec<CourseSpec>,
    #[serde(default)]
    pub students: Vec<StudentSpec>,
    pub conflict_weights: ConflictWeights,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Optimal,
    TimeLimitFeasible,
    Infeasible,
    Error,
}

/// One scheduled session occurrence. Weeks and periods are 0-based on
/// the wire; `period_length` counts periods.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleAssignment {
    pub course_id: String,
    pub course_session_id: String,
    pub session_number: u32,
    pub room_id: String,
    pub week: u32,
    pub day: String,
    pub period_start: u32,
    pub period_length: u32,
    pub instructor_id: String,
}

/// Weighted per-objective penalty totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SoftConstraintTotals {
    pub student_conflicts: f64,
    pub instructor_compactness: f64,
    pub lunch_teaching: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Schedule {
    pub assignments: Vec<ScheduleAssignment>,
}

/// The final output of one optimization run.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulingOutput {
    pub status: RunStatus,
    pub objective_value: Option<f64>,
    pub improvement_summary: Option<String>,
    pub soft_constraint_totals: SoftConstraintTotals,
    pub schedule: Schedule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

/// A single user-imposed what-if constraint.
///
/// Weeks and periods are 0-based on the wire, matching the schedule
/// output. `veto_day` accepts either a course or an instructor; an
/// instructor-level veto expands to one veto per course they teach.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryConstraint {
    EnforceTimeSlot {
        course_id: String,
        week: u32,
        day: String,
        period_start: u32,
    },
    VetoTimeSlot {
        course_id: String,
        #[serde(default)]
        week: Option<u32>,
        day: String,
        period_start: u32,
    },
    VetoDay {
        #[serde(default)]
        course_id: Option<String>,
        #[serde(default)]
        instructor_id: Option<String>,
        day: String,
    },
    EnforceRoom {
        course_id: String,
        room_id: String,
    },
    EnforceBeforeTime {
        course_id: String,
        period_end: u32,
    },
    EnforceAfterTime {
        course_id: String,
        period_start: u32,
    },
}

impl fmt::Display for QueryConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryConstraint::EnforceTimeSlot { course_id, week, day, period_start } => {
                write!(f, "schedule {course_id} in week {week} on {day} at period {period_start}")
            }
            QueryConstraint::VetoTimeSlot { course_id, week: Some(w), day, period_start } => {
                write!(f, "keep {course_id} away from {day} period {period_start} in week {w}")
            }
            QueryConstraint::VetoTimeSlot { course_id, week: None, day, period_start } => {
                write!(f, "keep {course_id} away from {day} period {period_start} in every week")
            }
            QueryConstraint::VetoDay { course_id: Some(c), day, .. } => {
                write!(f, "keep {c} off {day}")
            }
            QueryConstraint::VetoDay { instructor_id: Some(i), day, .. } => {
                write!(f, "keep all courses of {i} off {day}")
            }
            QueryConstraint::VetoDay { day, .. } => write!(f, "keep nothing off {day}"),
            QueryConstraint::EnforceRoom { course_id, room_id } => {
                write!(f, "put {course_id} in room {room_id} at least once")
            }
            QueryConstraint::EnforceBeforeTime { course_id, period_end } => {
                write!(f, "finish every session of {course_id} by period {period_end}")
            }
            QueryConstraint::EnforceAfterTime { course_id, period_start } => {
                write!(f, "start every session of {course_id} at period {period_start} or later")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WhatIfStatus {
    FeasibleQuery,
    InfeasibleQuery,
    UdspError,
    Error,
}

/// One member of the extracted conflict set. `confirmed` is false when
/// the item comes from the conservative fallback report.
#[derive(Debug, Clone, Serialize)]
pub struct IisItem {
    pub tag: String,
    pub description: String,
    pub confirmed: bool,
}

/// The outcome of a what-if (UDSP) analysis.
#[derive(Debug, Clone, Serialize)]
pub struct WhatIfOutput {
    pub status: WhatIfStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternative_objective: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective_difference: Option<f64>,
    pub schedule: Schedule,
    pub iis: Vec<IisItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

use crate::data::{CourseType, SchedulingInput};
use crate::error::ScheduleError;
use log::debug;
use std::collections::HashMap;

/// Lunch window in minutes from midnight: [12:00, 12:30).
const LUNCH_START_MINUTES: u32 = 12 * 60;
const LUNCH_END_MINUTES: u32 = 12 * 60 + 30;

/// Weekly session length requirements in minutes.
const FULL_TERM_SESSION_MINUTES: u32 = 90;
const HALF_TERM_SESSION_MINUTES: u32 = 180;

/// A block index: 1 = weeks `1..=half_point`, 2 = the remaining weeks.
pub type Block = u8;

#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub capacity: u32,
}

#[derive(Debug, Clone)]
pub struct Instructor {
    pub id: String,
    pub name: String,
    /// `avail[day][period - 1]`, periods 1-based internally.
    avail: Vec<Vec<bool>>,
    pub back_to_back_preference: u32,
    pub allow_lunch_teaching: bool,
}

impl Instructor {
    pub fn is_available(&self, day: usize, period: u32) -> bool {
        self.avail[day][(period - 1) as usize]
    }

    /// Weight of the lunch penalty for this instructor: 1.0 unless they
    /// opted into lunch teaching.
    pub fn lunch_penalty(&self) -> f64 {
        if self.allow_lunch_teaching {
            0.0
        } else {
            1.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct Course {
    pub id: String,
    pub name: String,
    pub instructor: usize,
    pub enrollment: u32,
    pub course_type: CourseType,
    pub periods_per_session: u32,
    pub total_sessions: u32,
    /// Active week range, 1-based inclusive.
    pub week_start: u32,
    pub week_end: u32,
    pub blocks: Vec<Block>,
    pub sessions_per_week: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Weights {
    pub student_conflict: f64,
    pub compactness: f64,
    pub lunch: f64,
}

/// The fully indexed, immutable problem instance.
///
/// Periods and weeks are 1-based here; the wire format is 0-based and
/// converted at the boundaries (normalizer in, formatter out).
#[derive(Debug, Clone)]
pub struct Instance {
    pub num_weeks: u32,
    pub half_point: u32,
    pub days: Vec<String>,
    pub num_periods: u32,
    pub period_length: u32,
    pub lunch_periods: Vec<u32>,
    pub rooms: Vec<Room>,
    pub instructors: Vec<Instructor>,
    pub courses: Vec<Course>,
    /// Symmetric co-enrollment counts, zero diagonal.
    pub students_cc: Vec<Vec<u32>>,
    pub weights: Weights,
    course_index: HashMap<String, usize>,
    room_index: HashMap<String, usize>,
    instructor_index: HashMap<String, usize>,
    day_index: HashMap<String, usize>,
}

impl Instance {
    pub fn build(input: &SchedulingInput) -> Result<Instance, ScheduleError> {
        let term = &input.term_config;

        if term.num_weeks == 0 {
            return Err(ScheduleError::invalid_input("num_weeks must be positive"));
        }
        if term.days.is_empty() {
            return Err(ScheduleError::invalid_input("term_config.days must not be empty"));
        }
        if term.period_length_minutes == 0 {
            return Err(ScheduleError::invalid_input("period_length_minutes must be positive"));
        }
        if input.courses.is_empty() {
            return Err(ScheduleError::invalid_input("at least one course is required"));
        }
        if input.instructors.is_empty() {
            return Err(ScheduleError::invalid_input("at least one instructor is required"));
        }

        let mut day_index = HashMap::new();
        for (d, label) in term.days.iter().enumerate() {
            if day_index.insert(label.clone(), d).is_some() {
                return Err(ScheduleError::invalid_input(format!(
                    "duplicate day label '{label}'"
                )));
            }
        }

        let day_start = parse_time(&term.day_start_time)?;
        let day_end = parse_time(&term.day_end_time)?;
        if day_end <= day_start {
            return Err(ScheduleError::invalid_input(format!(
                "empty teaching day: {} to {}",
                term.day_start_time, term.day_end_time
            )));
        }
        let num_periods = (day_end - day_start) / term.period_length_minutes;
        if num_periods == 0 {
            return Err(ScheduleError::invalid_input(
                "teaching day is shorter than one period",
            ));
        }

        let lunch_periods = lunch_periods(day_start, term.period_length_minutes, num_periods);

        let w = &input.conflict_weights;
        if w.global_student_conflict_weight < 0.0
            || w.instructor_compactness_weight < 0.0
            || w.preferred_time_slots_weight < 0.0
        {
            return Err(ScheduleError::invalid_input(
                "conflict weights must be non-negative",
            ));
        }
        let weights = Weights {
            student_conflict: w.global_student_conflict_weight,
            compactness: w.instructor_compactness_weight,
            lunch: w.preferred_time_slots_weight,
        };

        let rooms: Vec<Room> = input
            .classrooms
            .iter()
            .map(|r| Room {
                id: r.id.clone(),
                name: r.name.clone(),
                capacity: r.capacity,
            })
            .collect();
        let mut room_index = HashMap::new();
        for (i, r) in rooms.iter().enumerate() {
            if room_index.insert(r.id.clone(), i).is_some() {
                return Err(ScheduleError::invalid_input(format!(
                    "duplicate classroom id '{}'",
                    r.id
                )));
            }
        }

        let mut instructors = Vec::with_capacity(input.instructors.len());
        let mut instructor_index = HashMap::new();
        for (i, spec) in input.instructors.iter().enumerate() {
            if instructor_index.insert(spec.id.clone(), i).is_some() {
                return Err(ScheduleError::invalid_input(format!(
                    "duplicate instructor id '{}'",
                    spec.id
                )));
            }
            // Absent availability list means fully available; a non-empty
            // list flips the default and whitelists the listed slots.
            let fully_available = spec.availability.as_ref().is_none_or(|a| a.is_empty());
            let mut avail = vec![vec![fully_available; num_periods as usize]; term.days.len()];
            if let Some(slots) = &spec.availability {
                for slot in slots {
                    let d = *day_index.get(&slot.day).ok_or_else(|| {
                        ScheduleError::invalid_input(format!(
                            "instructor '{}' availability names unknown day '{}'",
                            spec.id, slot.day
                        ))
                    })?;
                    if slot.period_index >= num_periods {
                        return Err(ScheduleError::invalid_input(format!(
                            "instructor '{}' availability period {} out of range (0..{})",
                            spec.id, slot.period_index, num_periods
                        )));
                    }
                    avail[d][slot.period_index as usize] = true;
                }
            }
            instructors.push(Instructor {
                id: spec.id.clone(),
                name: spec.name.clone(),
                avail,
                back_to_back_preference: spec.back_to_back_preference,
                allow_lunch_teaching: spec.allow_lunch_teaching,
            });
        }

        let half_point = term.num_weeks / 2;
        let mut courses = Vec::with_capacity(input.courses.len());
        let mut course_index = HashMap::new();
        for (c, spec) in input.courses.iter().enumerate() {
            if course_index.insert(spec.id.clone(), c).is_some() {
                return Err(ScheduleError::invalid_input(format!(
                    "duplicate course id '{}'",
                    spec.id
                )));
            }
            let instructor = *instructor_index.get(&spec.instructor_id).ok_or_else(|| {
                ScheduleError::invalid_input(format!(
                    "course '{}' references unknown instructor '{}'",
                    spec.id, spec.instructor_id
                ))
            })?;
            let (required_minutes, week_start, week_end) = match spec.course_type {
                CourseType::FullTerm => (FULL_TERM_SESSION_MINUTES, 1, term.num_weeks),
                CourseType::FirstHalfTerm => (HALF_TERM_SESSION_MINUTES, 1, half_point),
                CourseType::SecondHalfTerm => {
                    (HALF_TERM_SESSION_MINUTES, half_point + 1, term.num_weeks)
                }
            };
            if week_end < week_start {
                return Err(ScheduleError::invalid_input(format!(
                    "course '{}' has no active weeks in a {}-week term",
                    spec.id, term.num_weeks
                )));
            }
            let active_weeks = week_end - week_start + 1;
            let total_sessions = active_weeks;
            let mut blocks = Vec::new();
            if half_point >= 1 && week_start <= half_point {
                blocks.push(1);
            }
            if week_end > half_point {
                blocks.push(2);
            }
            courses.push(Course {
                id: spec.id.clone(),
                name: spec.name.clone(),
                instructor,
                enrollment: spec.expected_enrollment,
                course_type: spec.course_type,
                periods_per_session: required_minutes.div_ceil(term.period_length_minutes),
                total_sessions,
                week_start,
                week_end,
                blocks,
                sessions_per_week: total_sessions.div_ceil(active_weeks),
            });
        }

        let mut students_cc = vec![vec![0u32; courses.len()]; courses.len()];
        for (s, student) in input.students.iter().enumerate() {
            let mut enrolled = Vec::with_capacity(student.enrolled_course_ids.len());
            for id in &student.enrolled_course_ids {
                let c = *course_index.get(id).ok_or_else(|| {
                    ScheduleError::invalid_input(format!(
                        "student {s} enrolled in unknown course '{id}'"
                    ))
                })?;
                enrolled.push(c);
            }
            enrolled.sort_unstable();
            enrolled.dedup();
            for i in 0..enrolled.len() {
                for j in (i + 1)..enrolled.len() {
                    students_cc[enrolled[i]][enrolled[j]] += 1;
                    students_cc[enrolled[j]][enrolled[i]] += 1;
                }
            }
        }

        debug!(
            "normalized instance: {} courses, {} instructors, {} rooms, {} days x {} periods, {} weeks (half point {})",
            courses.len(),
            instructors.len(),
            rooms.len(),
            term.days.len(),
            num_periods,
            term.num_weeks,
            half_point
        );

        Ok(Instance {
            num_weeks: term.num_weeks,
            half_point,
            days: term.days.clone(),
            num_periods,
            period_length: term.period_length_minutes,
            lunch_periods,
            rooms,
            instructors,
            courses,
            students_cc,
            weights,
            course_index,
            room_index,
            instructor_index,
            day_index,
        })
    }

    /// Week range of a block, 1-based inclusive. Block 1 is empty when
    /// the term has a single week.
    pub fn block_range(&self, block: Block) -> (u32, u32) {
        if block == 1 {
            (1, self.half_point)
        } else {
            (self.half_point + 1, self.num_weeks)
        }
    }

    /// Number of weeks in a block; scales every soft penalty arising there.
    pub fn block_weight(&self, block: Block) -> u32 {
        let (start, end) = self.block_range(block);
        if end < start {
            0
        } else {
            end - start + 1
        }
    }

    pub fn block_of_week(&self, week: u32) -> Block {
        if week <= self.half_point {
            1
        } else {
            2
        }
    }

    /// How many of the course's active weeks fall inside the block.
    pub fn course_weeks_in_block(&self, course: usize, block: Block) -> u32 {
        let c = &self.courses[course];
        let (bs, be) = self.block_range(block);
        let lo = c.week_start.max(bs);
        let hi = c.week_end.min(be);
        if hi < lo {
            0
        } else {
            hi - lo + 1
        }
    }

    pub fn course_by_id(&self, id: &str) -> Option<usize> {
        self.course_index.get(id).copied()
    }

    pub fn room_by_id(&self, id: &str) -> Option<usize> {
        self.room_index.get(id).copied()
    }

    pub fn instructor_by_id(&self, id: &str) -> Option<usize> {
        self.instructor_index.get(id).copied()
    }

    pub fn day_by_label(&self, label: &str) -> Option<usize> {
        self.day_index.get(label).copied()
    }

    /// Course indices per instructor, in course order.
    pub fn courses_of_instructor(&self, instructor: usize) -> Vec<usize> {
        self.courses
            .iter()
            .enumerate()
            .filter(|(_, c)| c.instructor == instructor)
            .map(|(i, _)| i)
            .collect()
    }
}

fn parse_time(s: &str) -> Result<u32, ScheduleError> {
    let bad = || ScheduleError::invalid_input(format!("malformed time '{s}', expected HH:MM"));
    let (h, m) = s.split_once(':').ok_or_else(bad)?;
    let h: u32 = h.parse().map_err(|_| bad())?;
    let m: u32 = m.parse().map_err(|_| bad())?;
    if h > 23 || m > 59 {
        return Err(bad());
    }
    Ok(h * 60 + m)
}

/// Periods (1-based) whose time range intersects [12:00, 12:30).
fn lunch_periods(day_start: u32, period_length: u32, num_periods: u32) -> Vec<u32> {
    (1..=num_periods)
        .filter(|p| {
            let start = day_start + (p - 1) * period_length;
            let end = start + period_length;
            start < LUNCH_END_MINUTES && end > LUNCH_START_MINUTES
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        AvailabilitySlot, ClassroomSpec, ConflictWeights, CourseSpec, InstructorSpec, StudentSpec,
        TermConfig,
    };

    fn base_input() -> SchedulingInput {
        SchedulingInput {
            term_config: TermConfig {
                num_weeks: 4,
                days: vec!["Mon".into(), "Tue".into()],
                day_start_time: "08:00".into(),
                day_end_time: "14:00".into(),
                period_length_minutes: 30,
            },
            classrooms: vec![ClassroomSpec {
                id: "R1".into(),
                name: "Room 1".into(),
                capacity: 40,
            }],
            instructors: vec![InstructorSpec {
                id: "I1".into(),
                name: "Prof One".into(),
                availability: None,
                back_to_back_preference: 0,
                allow_lunch_teaching: false,
            }],
            courses: vec![CourseSpec {
                id: "C1".into(),
                name: "Course 1".into(),
                instructor_id: "I1".into(),
                expected_enrollment: 25,
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
    fn derives_periods_and_lunch() {
        let inst = Instance::build(&base_input()).unwrap();
        assert_eq!(inst.num_periods, 12);
        // 12:00-12:30 is exactly period 9 with 30-minute periods from 08:00.
        assert_eq!(inst.lunch_periods, vec![9]);
    }

    #[test]
    fn lunch_spans_two_periods_with_offset_grid() {
        let mut input = base_input();
        input.term_config.day_start_time = "08:15".into();
        input.term_config.day_end_time = "13:15".into();
        let inst = Instance::build(&input).unwrap();
        assert_eq!(inst.num_periods, 10);
        // Periods cover 11:45-12:15 and 12:15-12:45; both touch the window.
        assert_eq!(inst.lunch_periods, vec![8, 9]);
    }

    #[test]
    fn full_term_course_shape() {
        let inst = Instance::build(&base_input()).unwrap();
        let c = &inst.courses[0];
        assert_eq!(c.periods_per_session, 3);
        assert_eq!((c.week_start, c.week_end), (1, 4));
        assert_eq!(c.total_sessions, 4);
        assert_eq!(c.sessions_per_week, 1);
        assert_eq!(c.blocks, vec![1, 2]);
        assert_eq!(inst.block_weight(1), 2);
        assert_eq!(inst.block_weight(2), 2);
    }

    #[test]
    fn half_term_course_shape() {
        let mut input = base_input();
        input.courses[0].course_type = CourseType::SecondHalfTerm;
        let inst = Instance::build(&input).unwrap();
        let c = &inst.courses[0];
        assert_eq!(c.periods_per_session, 6);
        assert_eq!((c.week_start, c.week_end), (3, 4));
        assert_eq!(c.total_sessions, 2);
        assert_eq!(c.blocks, vec![2]);
        assert_eq!(inst.course_weeks_in_block(0, 2), 2);
        assert_eq!(inst.course_weeks_in_block(0, 1), 0);
    }

    #[test]
    fn single_week_term_has_empty_first_block() {
        let mut input = base_input();
        input.term_config.num_weeks = 1;
        let inst = Instance::build(&input).unwrap();
        assert_eq!(inst.half_point, 0);
        assert_eq!(inst.block_weight(1), 0);
        assert_eq!(inst.courses[0].blocks, vec![2]);
    }

    #[test]
    fn first_half_course_rejected_in_single_week_term() {
        let mut input = base_input();
        input.term_config.num_weeks = 1;
        input.courses[0].course_type = CourseType::FirstHalfTerm;
        assert!(matches!(
            Instance::build(&input),
            Err(ScheduleError::InvalidInput(_))
        ));
    }

    #[test]
    fn availability_defaults_flip_when_listed() {
        let mut input = base_input();
        input.instructors[0].availability = Some(vec![
            AvailabilitySlot { day: "Mon".into(), period_index: 0 },
            AvailabilitySlot { day: "Mon".into(), period_index: 3 },
        ]);
        let inst = Instance::build(&input).unwrap();
        let i = &inst.instructors[0];
        assert!(i.is_available(0, 1));
        assert!(!i.is_available(0, 2));
        assert!(i.is_available(0, 4));
        assert!(!i.is_available(1, 1));
    }

    #[test]
    fn absent_availability_means_fully_available() {
        let inst = Instance::build(&base_input()).unwrap();
        let i = &inst.instructors[0];
        for d in 0..inst.days.len() {
            for p in 1..=inst.num_periods {
                assert!(i.is_available(d, p));
            }
        }
    }

    #[test]
    fn student_conflict_matrix_is_symmetric() {
        let mut input = base_input();
        input.courses.push(CourseSpec {
            id: "C2".into(),
            name: String::new(),
            instructor_id: "I1".into(),
            expected_enrollment: 10,
            course_type: CourseType::FullTerm,
        });
        input.students = vec![
            StudentSpec { enrolled_course_ids: vec!["C1".into(), "C2".into()] },
            StudentSpec { enrolled_course_ids: vec!["C2".into(), "C1".into(), "C1".into()] },
        ];
        let inst = Instance::build(&input).unwrap();
        assert_eq!(inst.students_cc[0][1], 2);
        assert_eq!(inst.students_cc[1][0], 2);
        assert_eq!(inst.students_cc[0][0], 0);
    }

    #[test]
    fn rejects_bad_inputs() {
        let mut dup_days = base_input();
        dup_days.term_config.days = vec!["Mon".into(), "Mon".into()];
        assert!(Instance::build(&dup_days).is_err());

        let mut empty_range = base_input();
        empty_range.term_config.day_end_time = "08:00".into();
        assert!(Instance::build(&empty_range).is_err());

        let mut bad_instructor = base_input();
        bad_instructor.courses[0].instructor_id = "nobody".into();
        assert!(Instance::build(&bad_instructor).is_err());

        let mut bad_avail = base_input();
        bad_avail.instructors[0].availability =
            Some(vec![AvailabilitySlot { day: "Mon".into(), period_index: 99 }]);
        assert!(Instance::build(&bad_avail).is_err());

        let mut bad_weight = base_input();
        bad_weight.conflict_weights.global_student_conflict_weight = -1.0;
        assert!(Instance::build(&bad_weight).is_err());

        let mut bad_student = base_input();
        bad_student.students =
            vec![StudentSpec { enrolled_course_ids: vec!["ghost".into()] }];
        assert!(Instance::build(&bad_student).is_err());
    }

    #[test]
    fn block_of_week_splits_at_half_point() {
        let inst = Instance::build(&base_input()).unwrap();
        assert_eq!(inst.block_of_week(1), 1);
        assert_eq!(inst.block_of_week(2), 1);
        assert_eq!(inst.block_of_week(3), 2);
        assert_eq!(inst.block_of_week(4), 2);
    }
}

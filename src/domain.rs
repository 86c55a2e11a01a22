use crate::instance::{Block, Instance};
use log::debug;
use std::collections::HashSet;

/// One candidate decision: (course, block, day, period_start, room).
/// Only tuples that survive pruning become MILP variables.
pub type TupleKey = (usize, Block, usize, u32, usize);

/// The pruned variable domain, in deterministic enumeration order.
#[derive(Debug, Clone)]
pub struct ValidDomain {
    pub tuples: Vec<TupleKey>,
    index: HashSet<TupleKey>,
}

impl ValidDomain {
    pub fn contains(&self, key: &TupleKey) -> bool {
        self.index.contains(key)
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }
}

/// Enumerates the tuples satisfying the trivially forced hard
/// constraints: session fits in the day, instructor available on every
/// occupied period, room large enough. Everything else stays implicit
/// zero, which shrinks the variable space the solver sees by orders of
/// magnitude.
pub fn enumerate(inst: &Instance) -> ValidDomain {
    let mut tuples = Vec::new();
    for (c, course) in inst.courses.iter().enumerate() {
        let dur = course.periods_per_session;
        if dur > inst.num_periods {
            continue;
        }
        let instructor = &inst.instructors[course.instructor];
        for &b in &course.blocks {
            for d in 0..inst.days.len() {
                for p in 1..=(inst.num_periods - dur + 1) {
                    if !(p..p + dur).all(|t| instructor.is_available(d, t)) {
                        continue;
                    }
                    for (r, room) in inst.rooms.iter().enumerate() {
                        if room.capacity >= course.enrollment {
                            tuples.push((c, b, d, p, r));
                        }
                    }
                }
            }
        }
    }
    let theoretical = inst.courses.len()
        * 2
        * inst.days.len()
        * inst.num_periods as usize
        * inst.rooms.len();
    debug!(
        "pruned variable domain: {} tuples out of a theoretical maximum of {}",
        tuples.len(),
        theoretical
    );
    let index = tuples.iter().copied().collect();
    ValidDomain { tuples, index }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::*;

    fn input() -> SchedulingInput {
        SchedulingInput {
            term_config: TermConfig {
                num_weeks: 2,
                days: vec!["Mon".into()],
                day_start_time: "09:00".into(),
                day_end_time: "11:00".into(),
                period_length_minutes: 30,
            },
            classrooms: vec![
                ClassroomSpec { id: "small".into(), name: String::new(), capacity: 10 },
                ClassroomSpec { id: "big".into(), name: String::new(), capacity: 100 },
            ],
            instructors: vec![InstructorSpec {
                id: "I1".into(),
                name: String::new(),
                availability: None,
                back_to_back_preference: 0,
                allow_lunch_teaching: true,
            }],
            courses: vec![CourseSpec {
                id: "C1".into(),
                name: String::new(),
                instructor_id: "I1".into(),
                expected_enrollment: 30,
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
    fn prunes_undersized_rooms_and_late_starts() {
        let inst = crate::instance::Instance::build(&input()).unwrap();
        let domain = enumerate(&inst);
        // 4 periods, 3-period sessions: starts 1..=2; only the big room
        // fits 30 students; blocks 1 and 2.
        assert_eq!(domain.len(), 4);
        assert!(domain.tuples.iter().all(|&(_, _, _, p, r)| p <= 2 && r == 1));
        assert!(domain.contains(&(0, 1, 0, 1, 1)));
        assert!(domain.contains(&(0, 2, 0, 2, 1)));
        assert!(!domain.contains(&(0, 1, 0, 1, 0)));
    }

    #[test]
    fn prunes_unavailable_periods() {
        let mut raw = input();
        // Only periods 1..=3 (0-based 0..=2) on Mon are available, so a
        // 3-period session can start at period 1 only.
        raw.instructors[0].availability = Some(vec![
            AvailabilitySlot { day: "Mon".into(), period_index: 0 },
            AvailabilitySlot { day: "Mon".into(), period_index: 1 },
            AvailabilitySlot { day: "Mon".into(), period_index: 2 },
        ]);
        let inst = crate::instance::Instance::build(&raw).unwrap();
        let domain = enumerate(&inst);
        assert!(domain.tuples.iter().all(|&(_, _, _, p, _)| p == 1));
        assert_eq!(domain.len(), 2);
    }

    #[test]
    fn session_longer_than_day_yields_empty_domain() {
        let mut raw = input();
        raw.term_config.day_end_time = "10:00".into();
        raw.term_config.period_length_minutes = 60;
        // 1 period per day, full-term session needs ceil(90/60) = 2.
        let inst = crate::instance::Instance::build(&raw).unwrap();
        assert!(enumerate(&inst).is_empty());
    }
}

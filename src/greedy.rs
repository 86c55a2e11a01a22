use crate::domain::{TupleKey, ValidDomain};
use crate::instance::Instance;
use log::{debug, info};
use std::cmp::Reverse;
use std::collections::HashSet;

/// A feasible (possibly partial) starting assignment. `complete` is
/// true when every course reached its per-block session quota.
#[derive(Debug, Clone)]
pub struct WarmStart {
    pub tuples: Vec<TupleKey>,
    pub complete: bool,
}

/// Places courses greedily, most-constrained first: single-block
/// courses before full-term ones, larger enrollments before smaller.
/// Every placement respects the pruned domain plus room and instructor
/// occupancy in all of the course's blocks, so the result satisfies the
/// hard constraints it touches.
pub fn warm_start(inst: &Instance, domain: &ValidDomain) -> WarmStart {
    let mut order: Vec<usize> = (0..inst.courses.len()).collect();
    order.sort_by_key(|&c| {
        let course = &inst.courses[c];
        (course.blocks.len(), Reverse(course.enrollment))
    });

    let mut rooms_by_capacity: Vec<usize> = (0..inst.rooms.len()).collect();
    rooms_by_capacity.sort_by_key(|&r| inst.rooms[r].capacity);

    // (block, day, period, room) and (instructor, block, day, period)
    let mut rooms_used: HashSet<(u8, usize, u32, usize)> = HashSet::new();
    let mut instructor_busy: HashSet<(usize, u8, usize, u32)> = HashSet::new();

    let mut tuples = Vec::new();
    let mut complete = true;

    for &c in &order {
        let course = &inst.courses[c];
        let dur = course.periods_per_session;
        let quota = course.sessions_per_week;
        let mut placed = 0;

        'days: for d in 0..inst.days.len() {
            if placed == quota {
                break;
            }
            if dur > inst.num_periods {
                break;
            }
            for p in 1..=(inst.num_periods - dur + 1) {
                for &r in &rooms_by_capacity {
                    let fits = course.blocks.iter().all(|&b| {
                        domain.contains(&(c, b, d, p, r))
                            && (p..p + dur).all(|t| {
                                !rooms_used.contains(&(b, d, t, r))
                                    && !instructor_busy.contains(&(course.instructor, b, d, t))
                            })
                    });
                    if fits {
                        for &b in &course.blocks {
                            for t in p..p + dur {
                                rooms_used.insert((b, d, t, r));
                                instructor_busy.insert((course.instructor, b, d, t));
                            }
                            tuples.push((c, b, d, p, r));
                        }
                        placed += 1;
                        continue 'days;
                    }
                }
            }
        }

        if placed < quota {
            debug!(
                "greedy could not place course '{}' ({placed}/{quota} sessions)",
                course.id
            );
            complete = false;
        }
    }

    info!(
        "greedy warm start placed {} tuples (complete: {complete})",
        tuples.len()
    );
    WarmStart { tuples, complete }
}

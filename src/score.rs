use crate::data::SoftConstraintTotals;
use crate::domain::TupleKey;
use crate::instance::{Block, Instance};
use itertools::Itertools;
use std::collections::HashMap;

/// Computes the exact weighted objective of an assignment.
///
/// This is the same function the MILP minimizes, evaluated directly:
/// any drift between the two (overlap counting, lunch membership, block
/// weighting) silently breaks the improvement summary, so changes here
/// must be mirrored in the model builder and vice versa.
pub fn evaluate(inst: &Instance, tuples: &[TupleKey]) -> SoftConstraintTotals {
    // Session intervals per (block, day): (course, first period, last period).
    let mut sessions: HashMap<(Block, usize), Vec<(usize, u32, u32)>> = HashMap::new();
    for &(c, b, d, p, _r) in tuples {
        let dur = inst.courses[c].periods_per_session;
        sessions.entry((b, d)).or_default().push((c, p, p + dur - 1));
    }

    let mut s1 = 0.0;
    let mut s2 = 0.0;
    let mut s3 = 0.0;

    for (&(b, _d), list) in &sessions {
        let bw = inst.block_weight(b) as f64;

        // S1: co-enrolled pairs overlapping on the day, one unit per
        // shared period.
        for i in 0..list.len() {
            for j in (i + 1)..list.len() {
                let (c1, s1p, e1) = list[i];
                let (c2, s2p, e2) = list[j];
                if c1 == c2 {
                    continue;
                }
                let cc = inst.students_cc[c1][c2];
                if cc == 0 {
                    continue;
                }
                let lo = s1p.max(s2p);
                let hi = e1.min(e2);
                if hi >= lo {
                    s1 += cc as f64 * bw * (hi - lo + 1) as f64;
                }
            }
        }

        // S2: symmetric back-to-back metric 2B - (T - 1) per instructor-day.
        let by_instructor = list
            .iter()
            .map(|&(c, s, e)| (inst.courses[c].instructor, (s, e)))
            .into_group_map();
        for (i, mut intervals) in by_instructor {
            let pref = inst.instructors[i].back_to_back_preference;
            if pref == 0 {
                continue;
            }
            intervals.sort_unstable();
            let t = intervals.len();
            if t < 2 {
                continue;
            }
            let adjacent = intervals
                .windows(2)
                .filter(|w| w[0].1 + 1 == w[1].0)
                .count();
            s2 += pref as f64 * bw * (2.0 * adjacent as f64 - (t as f64 - 1.0));
        }
    }

    // S3: one unit per lunch period a session touches.
    for &(c, b, _d, p, _r) in tuples {
        let pen = inst.instructors[inst.courses[c].instructor].lunch_penalty();
        if pen == 0.0 {
            continue;
        }
        let bw = inst.block_weight(b) as f64;
        let end = p + inst.courses[c].periods_per_session - 1;
        let touched = inst
            .lunch_periods
            .iter()
            .filter(|&&lp| lp >= p && lp <= end)
            .count();
        s3 += pen * bw * touched as f64;
    }

    SoftConstraintTotals {
        student_conflicts: inst.weights.student_conflict * s1,
        instructor_compactness: inst.weights.compactness * s2,
        lunch_teaching: inst.weights.lunch * s3,
    }
}

pub fn total(totals: &SoftConstraintTotals) -> f64 {
    totals.student_conflicts + totals.instructor_compactness + totals.lunch_teaching
}

//! Tandem-repeat handling for the stage-one sort.
//!
//! A sort group whose members repeat with a period below half the known
//! match length would cost quadratic comparisons. Instead the group is
//! split: the highest-indexed member of each repeat chain (its terminator)
//! is sorted normally, and the order of the remaining members is induced
//! from the terminators afterwards using period marks stored in the ISA
//! overlay.

use crate::tools::shared::SharedSlice;

use super::text::Text;
use super::{IS_TANDEM_REPEAT, ISA_INDEX_MASK, PRECEDING_IS_A, SA_INDEX_MASK};

/// One deferred repeat group: absolute suffix-array range, how many
/// terminators sit at its tail after sorting, and the repeat period.
pub(crate) struct TandemRecord {
    pub start: i32,
    pub end: i32,
    pub num_terminators: i32,
    pub period: i32,
}

/// Cheap screen: can the group's starting word occur inside the window of
/// its last two prefix words? False positives only cost the index sort in
/// `partition_repeats`; a miss merely falls back to plain sorting.
pub(crate) fn has_potential_repeats(starting: u64, ending: [u64; 2]) -> bool {
    let combined = ((ending[0] as u128) << 64) | ending[1] as u128;
    (0..=8).any(|shift| (combined >> (8 * shift)) as u64 == starting)
}

/// Detect repeats inside one sort group. On success the non-terminators are
/// moved to the front of `part` (skipped by the caller's sort), a record is
/// pushed for the completion phase, and the count of skipped entries is
/// returned. Leaves the group permuted but that is irrelevant to a sort.
pub(crate) fn partition_repeats(
    text: &Text<'_>,
    part: &mut [i32],
    match_len: i32,
    sa_base: i32,
    repeats: &mut Vec<TandemRecord>,
) -> usize {
    part.sort_unstable_by_key(|&v| v & SA_INDEX_MASK);
    let half = match_len >> 1;
    let mut period = 0i32;
    let mut prev = part[0] & SA_INDEX_MASK;
    for &v in &part[1..] {
        let cur = v & SA_INDEX_MASK;
        if prev + half >= cur {
            period = cur - prev;
            break;
        }
        prev = cur;
    }
    if period == 0 {
        return 0;
    }

    // Walk right to left over the index order; a member whose successor sits
    // exactly one period ahead is a non-terminator and goes to the tail.
    let mut term_end = part.len() - 1;
    let mut prev = part[part.len() - 1] & SA_INDEX_MASK;
    for cur in (0..part.len() - 1).rev() {
        let v = part[cur] & SA_INDEX_MASK;
        if prev - v == period {
            part.swap(term_end, cur);
            term_end -= 1;
        }
        prev = v;
    }
    let num_terminators = term_end + 1;
    part.reverse();
    repeats.push(TandemRecord {
        start: sa_base,
        end: sa_base + part.len() as i32,
        num_terminators: num_terminators as i32,
        period,
    });
    part.len() - num_terminators
}

/// Induce the sorted order of a repeat group from its now-sorted
/// terminators. Runs after all stage-one sorting; `isa_base` is the start of
/// the ISA overlay inside the shared suffix array.
pub(crate) fn complete_repeats(
    text: &Text<'_>,
    sa: &SharedSlice<'_, i32>,
    isa_base: usize,
    record: &TandemRecord,
) {
    let bytes = text.bytes();
    let len = (record.end - record.start) as usize;
    let part = unsafe { sa.slice_mut(record.start as usize, len) };
    let num_term = record.num_terminators as usize;
    let period = record.period;
    let term_begin = len - num_term;

    // Publish the period of every non-terminator so the sweeps below can
    // recognise chain members.
    for &v in &part[..term_begin] {
        let idx = v & SA_INDEX_MASK;
        unsafe {
            sa.set(
                isa_base + (idx >> 1) as usize,
                period | IS_TANDEM_REPEAT,
            )
        };
    }

    // Split the sorted terminators: for the first group, prepending one
    // period makes a suffix sort higher; for the rest, lower.
    let mut lo = 0i32;
    let mut hi = num_term as i32 - 1;
    let mut num_ascending = 0i32;
    while lo <= hi {
        let mid = (lo + hi) >> 1;
        let t = part[term_begin + mid as usize];
        if !text.suffix_after(0, t, (t & SA_INDEX_MASK) + period) {
            num_ascending = mid;
            hi = mid - 1;
        } else {
            num_ascending = mid + 1;
            lo = mid + 1;
        }
    }
    let num_ascending = num_ascending.min(num_term as i32) as usize;
    let num_descending = num_term - num_ascending;

    // Ascending terminators move to the partition front in sorted order.
    for i in 0..num_ascending {
        part[i] = part[term_begin + i];
    }

    // Forward sweep: each emitted suffix pulls the member one period before
    // it in right behind itself. Self-feeding until no new members appear.
    let mut cur = 0usize;
    let mut cur_end = num_ascending;
    let mut next = cur_end;
    while cur != cur_end {
        while cur != cur_end {
            let idx = part[cur] & SA_INDEX_MASK;
            cur += 1;
            if idx >= period {
                let r = idx - period;
                let isa = unsafe { sa.get(isa_base + (r >> 1) as usize) };
                if isa & IS_TANDEM_REPEAT != 0 && isa & ISA_INDEX_MASK == period {
                    let ru = r as usize;
                    let flag = if ru > 0 && bytes[ru - 1] <= bytes[ru] {
                        0
                    } else {
                        PRECEDING_IS_A
                    };
                    part[next] = r | flag;
                    next += 1;
                }
            }
        }
        cur_end = next;
    }

    // Mirror sweep for the descending terminators, filling from the back.
    let mut cur = len as i32 - 1;
    let mut cur_end = cur - num_descending as i32;
    let mut next = cur_end;
    while cur != cur_end {
        while cur != cur_end {
            let idx = part[cur as usize] & SA_INDEX_MASK;
            cur -= 1;
            if idx >= period {
                let r = idx - period;
                let isa = unsafe { sa.get(isa_base + (r >> 1) as usize) };
                if isa & IS_TANDEM_REPEAT != 0 && isa & ISA_INDEX_MASK == period {
                    let ru = r as usize;
                    let flag = if ru > 0 && bytes[ru - 1] <= bytes[ru] {
                        0
                    } else {
                        PRECEDING_IS_A
                    };
                    part[next as usize] = r | flag;
                    next -= 1;
                }
            }
        }
        cur_end = next;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn repeat_screen_matches_embedded_word() {
        let starting = u64::from_be_bytes(*b"abababab");
        let w = u64::from_be_bytes(*b"babababa");
        assert!(has_potential_repeats(starting, [starting, w]));
        assert!(has_potential_repeats(starting, [w, starting]));
        let other = u64::from_be_bytes(*b"zzzzzzzz");
        assert!(!has_potential_repeats(starting, [other, other]));
    }

    #[test]
    fn repeat_screen_sees_straddling_windows() {
        // The pattern only appears across the boundary of the two words.
        let starting = u64::from_be_bytes(*b"ccccdddd");
        let hi = u64::from_be_bytes(*b"xxxxcccc");
        let lo = u64::from_be_bytes(*b"ddddyyyy");
        assert!(has_potential_repeats(starting, [hi, lo]));
    }

    #[test]
    fn partitions_period_two_chain() {
        // Positions 0,2,4,6 of "ababababa..": one chain, terminator 6.
        let data = b"abababababab";
        let text = Text::new(data);
        let mut part = vec![4i32, 0, 6, 2];
        let mut records = Vec::new();
        let moved = partition_repeats(&text, &mut part, 18, 0, &mut records);
        assert_eq!(moved, 3);
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.period, 2);
        assert_eq!(rec.num_terminators, 1);
        // Terminator ends up past the skipped prefix.
        assert_eq!(part[3] & SA_INDEX_MASK, 6);
    }

    #[test]
    fn no_record_without_close_neighbours() {
        let data = b"abcdefghijklmnopqrstuvwxyz0123456789ABCDEFGH";
        let text = Text::new(data);
        let mut part = vec![30i32, 0, 20, 10];
        let mut records = Vec::new();
        let moved = partition_repeats(&text, &mut part, 18, 0, &mut records);
        assert_eq!(moved, 0);
        assert!(records.is_empty());
    }
}

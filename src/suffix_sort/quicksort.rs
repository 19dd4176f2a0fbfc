//! Stage-one direct sort: an iterative seven-way multikey quicksort over
//! 8-byte big-endian words, with an insertion sort for small groups and the
//! tandem-repeat shortcut for pathologically repetitive groups.
//!
//! Every range on the stack shares a known prefix of `match_len` bytes; only
//! the three pivot-equal regions deepen the match by a word.

use super::tandem::{self, TandemRecord};
use super::text::Text;

pub(crate) const INSERTION_SORT_THRESHOLD: usize = 16;
/// Match depth at which tandem-repeat detection becomes possible: the leading
/// digram plus two full words of context.
pub(crate) const TANDEM_CHECK_DEPTH: i32 = 2 + 8 + 8;

struct Frame {
    start: usize,
    end: usize,
    match_len: i32,
    /// First word of the group's shared prefix, captured once the match is
    /// deep enough for repeat detection.
    starting: u64,
    /// Last two words of the shared prefix.
    ending: [u64; 2],
}

/// Sort one B* digram partition in place. `sa_base` is the partition's
/// absolute position in the suffix array, used to record tandem-repeat
/// ranges for the completion phase.
pub(crate) fn sort_bstar_partition(
    text: &Text<'_>,
    part: &mut [i32],
    digram: u16,
    sa_base: i32,
    repeats: &mut Vec<TandemRecord>,
) {
    if part.len() < 2 {
        return;
    }
    let mut frames = Vec::with_capacity(64);
    frames.push(Frame {
        start: 0,
        end: part.len(),
        match_len: 2,
        starting: 0,
        ending: [0, digram as u64],
    });

    while let Some(frame) = frames.pop() {
        let Frame {
            mut start,
            end,
            match_len,
            mut starting,
            ending,
        } = frame;
        if end - start < 2 {
            continue;
        }

        if match_len >= TANDEM_CHECK_DEPTH {
            if match_len == TANDEM_CHECK_DEPTH {
                starting = text.word(0, part[start]);
            }
            if tandem::has_potential_repeats(starting, ending) {
                start += tandem::partition_repeats(
                    text,
                    &mut part[start..end],
                    match_len,
                    sa_base + start as i32,
                    repeats,
                );
                if end - start < 2 {
                    continue;
                }
            }
        }

        if end - start < INSERTION_SORT_THRESHOLD {
            insertion_sort(
                text,
                &mut part[start..end],
                match_len,
                starting,
                ending,
                sa_base + start as i32,
                repeats,
            );
            continue;
        }

        // Five evenly spaced candidates, sorted by a fixed nine-comparator
        // network; the 1st, 3rd and 5th become the pivots.
        let offset = match_len as usize;
        let size = end - start;
        let sixth = size / 6;
        let c1 = start + sixth;
        let c2 = c1 + sixth;
        let c3 = c2 + sixth;
        let c4 = c3 + sixth;
        let c5 = c4 + sixth;
        let mut v1 = text.word(offset, part[c1]);
        let mut v2 = text.word(offset, part[c2]);
        let mut v3 = text.word(offset, part[c3]);
        let mut v4 = text.word(offset, part[c4]);
        let mut v5 = text.word(offset, part[c5]);
        macro_rules! order {
            ($a:ident, $b:ident, $pa:expr, $pb:expr) => {
                if $a > $b {
                    part.swap($pa, $pb);
                    std::mem::swap(&mut $a, &mut $b);
                }
            };
        }
        order!(v1, v2, c1, c2);
        order!(v4, v5, c4, c5);
        order!(v1, v3, c1, c3);
        order!(v2, v3, c2, c3);
        order!(v1, v4, c1, c4);
        order!(v3, v4, c3, c4);
        order!(v2, v5, c2, c5);
        order!(v2, v3, c2, c3);
        order!(v4, v5, c4, c5);
        let (p1, p2, p3) = (v1, v3, v5);

        // Seven-way partition: | <p1 | =p1 | p1..p2 | =p2 | p2..p3 | =p3 | >p3 |
        let mut cur = start;
        let mut begin_p1 = start;
        let mut end_p1 = start;
        let mut begin_p2 = start;
        let mut end_p2 = end - 1;
        let mut begin_p3 = end - 1;
        let mut end_p3 = end - 1;
        part.swap(cur, c1);
        cur += 1;
        if p1 != p2 {
            begin_p2 += 1;
            end_p1 += 1;
        }
        part.swap(cur, c3);
        cur += 1;
        if p2 != p3 {
            part.swap(end_p2, c5);
            end_p2 -= 1;
            begin_p3 -= 1;
        }
        while cur <= end_p2 {
            let v = text.word(offset, part[cur]);
            if v <= p2 {
                if v < p2 {
                    part.swap(begin_p2, cur);
                    if v <= p1 {
                        if v < p1 {
                            part.swap(begin_p1, begin_p2);
                            begin_p1 += 1;
                        }
                        part.swap(end_p1, begin_p2);
                        end_p1 += 1;
                    }
                    begin_p2 += 1;
                }
                cur += 1;
            } else {
                part.swap(end_p2, cur);
                if v >= p3 {
                    if v > p3 {
                        part.swap(end_p2, end_p3);
                        end_p3 -= 1;
                    }
                    part.swap(end_p2, begin_p3);
                    begin_p3 -= 1;
                }
                end_p2 -= 1;
            }
        }
        end_p2 += 1;
        begin_p3 += 1;
        end_p3 += 1;

        let next_len = match_len + 8;
        let sub = [
            (start, begin_p1, match_len, ending),
            (begin_p1, end_p1, next_len, [ending[1], p1]),
            (end_p1, begin_p2, match_len, ending),
            (begin_p2, end_p2, next_len, [ending[1], p2]),
            (end_p2, begin_p3, match_len, ending),
            (begin_p3, end_p3, next_len, [ending[1], p3]),
            (end_p3, end, match_len, ending),
        ];
        // Push right to left so the leftmost range pops first.
        for &(s, e, ml, ep) in sub.iter().rev() {
            if e - s >= 2 {
                frames.push(Frame {
                    start: s,
                    end: e,
                    match_len: ml,
                    starting,
                    ending: ep,
                });
            }
        }
    }
}

struct Run {
    match_len: i32,
    size: usize,
    starting: u64,
    ending: [u64; 2],
    check_repeats: bool,
}

/// Insertion sort over 8-byte keys for groups below the threshold. Runs of
/// equal keys re-enter through a private stack with the match deepened by a
/// word, so a group is never compared byte-by-byte.
fn insertion_sort(
    text: &Text<'_>,
    part: &mut [i32],
    match_len: i32,
    starting: u64,
    ending: [u64; 2],
    sa_base: i32,
    repeats: &mut Vec<TandemRecord>,
) {
    if part.len() < 2 {
        return;
    }
    let mut runs: Vec<Run> = Vec::with_capacity(INSERTION_SORT_THRESHOLD);
    runs.push(Run {
        match_len,
        size: part.len(),
        starting,
        ending,
        check_repeats: false,
    });
    let mut base = 0usize;
    let mut values = [0u64; INSERTION_SORT_THRESHOLD];

    while let Some(run) = runs.pop() {
        let Run {
            match_len,
            mut size,
            mut starting,
            ending,
            check_repeats,
        } = run;
        if size <= 2 {
            if size == 2 && text.suffix_after(match_len as usize, part[base], part[base + 1]) {
                part.swap(base, base + 1);
            }
            base += size;
            continue;
        }

        if match_len >= TANDEM_CHECK_DEPTH && check_repeats {
            let moved = tandem::partition_repeats(
                text,
                &mut part[base..base + size],
                match_len,
                sa_base + base as i32,
                repeats,
            );
            base += moved;
            size -= moved;
            if size == 0 {
                continue;
            }
        }

        let offset = match_len as usize;
        values[0] = text.word(offset, part[base]);
        for i in 1..size {
            let index = part[base + i];
            let value = text.word(offset, index);
            let mut j = i;
            while j > 0 && values[j - 1] > value {
                values[j] = values[j - 1];
                part[base + j] = part[base + j - 1];
                j -= 1;
            }
            values[j] = value;
            part[base + j] = index;
        }

        // Split into runs of equal keys, pushed largest-key first so the
        // smallest group is processed next and `base` advances in order.
        let next_len = match_len + 8;
        let mut i = size as i32 - 1;
        while i >= 0 {
            let top = i;
            let value = values[top as usize];
            i -= 1;
            while i >= 0 && values[i as usize] == value {
                i -= 1;
            }
            let group = (top - i) as usize;
            let check = tandem::has_potential_repeats(starting, [ending[1], value]);
            if next_len == 2 + 8 {
                starting = text.word(0, part[base]);
            }
            runs.push(Run {
                match_len: next_len,
                size: group,
                starting,
                ending: [ending[1], value],
                check_repeats: check,
            });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::suffix_sort::text::SuffixType;
    use crate::suffix_sort::SA_INDEX_MASK;

    fn sorted_by_suffix(text: &Text<'_>, part: &[i32]) -> bool {
        part.windows(2).all(|w| text.suffix_after(0, w[1], w[0]))
    }

    /// B* positions whose leading digram is "ab".
    fn ab_group(text: &Text<'_>) -> Vec<i32> {
        let data = text.bytes();
        (0..text.len())
            .filter(|&i| {
                text.suffix_type(i) == SuffixType::BStar
                    && data[i] == b'a'
                    && data[i + 1] == b'b'
            })
            .map(|i| i as i32)
            .collect()
    }

    fn sort_group(data: &[u8], expected: usize) {
        let text = Text::new(data);
        let mut positions = ab_group(&text);
        assert_eq!(positions.len(), expected);
        let digram = text.digram(positions[0] as usize) as u16;
        let mut repeats = Vec::new();
        sort_bstar_partition(&text, &mut positions, digram, 0, &mut repeats);
        assert!(
            repeats.is_empty(),
            "fixtures here must not defer tandem repeats"
        );
        assert!(sorted_by_suffix(&text, &positions));
        for w in positions.windows(2) {
            assert_ne!(w[0] & SA_INDEX_MASK, w[1] & SA_INDEX_MASK);
        }
    }

    #[test]
    fn sorts_small_group_by_insertion() {
        // Five "ab" openings with a digit after the 'b', so every 'a' is a
        // B* and the group stays below the insertion threshold.
        sort_group(b"ab1ab9ab5ab3ab7", 5);
    }

    #[test]
    fn sorts_large_group_through_quicksort() {
        // 64 "ab" openings with varied low tails, enough to run the
        // seven-way partition several levels deep.
        let mut data = Vec::new();
        for i in 0u32..64 {
            data.extend_from_slice(b"ab");
            data.push((i * 37 + 11).rem_euclid(97) as u8);
            data.push((i * 101 + 3).rem_euclid(97) as u8);
        }
        sort_group(&data, 64);
    }

    #[test]
    fn deep_equal_prefixes_are_resolved() {
        // Groups sharing a 26-byte prefix force several match-length
        // extensions before the keys diverge at the digit.
        let mut data = Vec::new();
        for tail in [b'1', b'9', b'5', b'3', b'7'] {
            data.extend_from_slice(b"ab");
            data.extend_from_slice(&[b'a'; 24]);
            data.push(tail);
        }
        sort_group(&data, 5);
    }
}

//! Second stage of the two-stage sort: two linear bucket passes recover the
//! order of every suffix from the sorted B* set.
//!
//! The right-to-left pass walks the array from the top; every entry whose
//! preceding suffix is type B places that suffix at the tail cursor of its
//! two-byte bucket. The left-to-right pass then places type-A suffixes at
//! the head cursors of their byte buckets and clears the analysis flags.
//! With `BWT = true` the same passes overwrite finished slots with the
//! preceding byte, leaving the transform in the array, and report the
//! sentinel row.
//!
//! Multi-threaded variants work in bounded windows: slots past the next
//! unfilled slot are not yet determined, but everything before it is, so a
//! window can be scanned in parallel, destinations reserved per
//! (worker, symbol), and the entries scattered with no write conflicts.

use rayon::prelude::*;

use crate::tools::shared::SharedSlice;

use super::{Sorter, PRECEDING_IS_A, SA_INDEX_MASK, UNSORTED_B};

/// Entries a worker may buffer per window; the window spans at most this
/// many slots per worker.
const INDUCE_CACHE: usize = 1 << 12;

struct InduceCache {
    entries: Vec<(u8, i32)>,
    counts: [i32; 256],
    sentinel: Option<usize>,
}

impl InduceCache {
    fn new() -> Self {
        InduceCache {
            entries: Vec::with_capacity(INDUCE_CACHE),
            counts: [0; 256],
            sentinel: None,
        }
    }

    fn reset(&mut self) {
        self.entries.clear();
        self.counts = [0; 256];
        self.sentinel = None;
    }
}

/// Induce the sorted order of B suffixes from the sorted B* suffixes.
pub(crate) fn right_to_left<const BWT: bool>(sorter: &mut Sorter<'_>, sa: &mut [i32]) {
    if sorter.pool.workers() == 1 {
        right_to_left_serial::<BWT>(sorter, sa);
    } else {
        right_to_left_windowed::<BWT>(sorter, sa);
    }
}

/// Induce the sorted order of A suffixes from the sorted B suffixes. In BWT
/// mode, returns the sentinel row.
pub(crate) fn left_to_right<const BWT: bool>(sorter: &mut Sorter<'_>, sa: &mut [i32]) -> usize {
    if sorter.pool.workers() == 1 {
        left_to_right_serial::<BWT>(sorter, sa)
    } else {
        left_to_right_windowed::<BWT>(sorter, sa)
    }
}

fn right_to_left_serial<const BWT: bool>(sorter: &mut Sorter<'_>, sa: &mut [i32]) {
    let bytes = sorter.text.bytes();
    let mut cur = sa.len() - 1;
    for sym in (0..256usize).rev() {
        let end = cur - sorter.b_byte[sym] as usize;
        while cur > end {
            let v = sa[cur];
            if v & PRECEDING_IS_A == 0 {
                let j = (v & SA_INDEX_MASK) - 1;
                let ju = j as usize;
                let c = bytes[ju] as usize;
                let flag = if ju > 0 && bytes[ju - 1] <= bytes[ju] {
                    0
                } else {
                    PRECEDING_IS_A
                };
                let slot = &mut sorter.back_bucket[sym << 8 | c];
                *slot -= 1;
                sa[*slot as usize] = j | flag;
                if BWT {
                    sa[cur] = c as i32;
                }
            }
            cur -= 1;
        }
        cur -= sorter.a_byte[sym] as usize;
    }
}

fn left_to_right_serial<const BWT: bool>(sorter: &mut Sorter<'_>, sa: &mut [i32]) -> usize {
    let bytes = sorter.text.bytes();
    let mut sentinel = 0usize;
    for k in 0..sa.len() {
        let v = sa[k];
        if v & PRECEDING_IS_A != 0 {
            let idx = v & SA_INDEX_MASK;
            if idx != 0 {
                let ju = (idx - 1) as usize;
                let c = bytes[ju] as usize;
                let preceding_is_a = ju == 0 || bytes[ju - 1] >= bytes[ju];
                let slot = &mut sorter.front_bucket[c];
                let dest = *slot as usize;
                *slot += 1;
                sa[dest] = if preceding_is_a {
                    ju as i32 | PRECEDING_IS_A
                } else if BWT {
                    // Final value already known: the slot will never be
                    // revisited for induction.
                    bytes[ju - 1] as i32
                } else {
                    ju as i32
                };
            }
            if BWT {
                if idx != 0 {
                    sa[k] = bytes[(idx - 1) as usize] as i32;
                } else {
                    sentinel = k;
                }
            } else {
                sa[k] = idx;
            }
        }
    }
    sentinel
}

fn right_to_left_windowed<const BWT: bool>(sorter: &mut Sorter<'_>, sa: &mut [i32]) {
    let workers = sorter.pool.workers();
    let pool = sorter.pool;
    let bytes = sorter.text.bytes();
    let mut caches: Vec<InduceCache> = (0..workers).map(|_| InduceCache::new()).collect();
    let mut dest = vec![0i32; 256 * workers];
    let view = SharedSlice::new(sa);
    let mut cur = view.len() - 1;

    for sym in (0..256usize).rev() {
        let end = cur - sorter.b_byte[sym] as usize;
        while cur > end {
            // Everything above the next unfilled slot is determined and safe
            // to scan; all writes of this window land at or below it.
            let max_end = end.max(cur.saturating_sub(INDUCE_CACHE * workers));
            let mut bottom = cur;
            while bottom > max_end && unsafe { view.get(bottom) } != UNSORTED_B {
                bottom -= 1;
            }
            let window = cur - bottom;
            debug_assert!(window > 0, "induce window stalled at slot {}", cur);
            let per = (window + workers - 1) / workers;
            let bounds: Vec<(usize, usize)> = (0..workers)
                .map(|w| {
                    let hi = cur - (w * per).min(window);
                    let lo = cur - ((w + 1) * per).min(window);
                    (lo, hi)
                })
                .collect();

            // Scan phase: descending over disjoint chunks, buffering the
            // induced entries.
            pool.install(|| {
                caches
                    .par_iter_mut()
                    .zip(&bounds)
                    .for_each(|(cache, &(lo, hi))| {
                        cache.reset();
                        let chunk = unsafe { view.slice_mut(lo + 1, hi - lo) };
                        for slot in chunk.iter_mut().rev() {
                            let v = *slot;
                            if v & PRECEDING_IS_A == 0 {
                                let j = (v & SA_INDEX_MASK) - 1;
                                let ju = j as usize;
                                let c = bytes[ju];
                                let flag = if ju > 0 && bytes[ju - 1] <= bytes[ju] {
                                    0
                                } else {
                                    PRECEDING_IS_A
                                };
                                cache.entries.push((c, j | flag));
                                cache.counts[c as usize] += 1;
                                if BWT {
                                    *slot = c as i32;
                                }
                            }
                        }
                    });
            });

            // Reservation phase: walk symbol stripes, reserving a disjoint
            // destination range per (worker, symbol) off the shared tail
            // cursors. Worker 0 scanned the topmost chunk, so it reserves
            // first, preserving the serial order.
            let stripe = (256 + workers - 1) / workers;
            let bucket = &mut sorter.back_bucket[(sym << 8)..(sym << 8) + 256];
            pool.install(|| {
                bucket
                    .par_chunks_mut(stripe)
                    .zip(dest.par_chunks_mut(stripe * workers))
                    .enumerate()
                    .for_each(|(ci, (cursors, dchunk))| {
                        for (k, cursor) in cursors.iter_mut().enumerate() {
                            let symbol = ci * stripe + k;
                            for (w, cache) in caches.iter().enumerate() {
                                dchunk[k * workers + w] = *cursor;
                                *cursor -= cache.counts[symbol];
                            }
                        }
                    });
            });

            // Scatter phase: each worker drains its cache into its reserved
            // ranges, decrement-before-write like the serial pass.
            pool.install(|| {
                caches.par_iter().enumerate().for_each(|(w, cache)| {
                    let mut cursors = [0i32; 256];
                    for (c, cursor) in cursors.iter_mut().enumerate() {
                        *cursor = dest[c * workers + w];
                    }
                    for &(c, value) in &cache.entries {
                        let cursor = &mut cursors[c as usize];
                        *cursor -= 1;
                        unsafe { view.set(*cursor as usize, value) };
                    }
                });
            });

            cur = bottom;
        }
        cur -= sorter.a_byte[sym] as usize;
    }
}

fn left_to_right_windowed<const BWT: bool>(sorter: &mut Sorter<'_>, sa: &mut [i32]) -> usize {
    let workers = sorter.pool.workers();
    let pool = sorter.pool;
    let bytes = sorter.text.bytes();
    let mut caches: Vec<InduceCache> = (0..workers).map(|_| InduceCache::new()).collect();
    let mut dest = vec![0i32; 256 * workers];
    let view = SharedSlice::new(sa);
    let len = view.len();
    let mut sentinel = 0usize;
    let mut cur = 0usize;

    while cur < len {
        if !BWT {
            // Entries with a type-B predecessor induce nothing here.
            while cur < len && unsafe { view.get(cur) } & PRECEDING_IS_A == 0 {
                cur += 1;
            }
            if cur >= len {
                break;
            }
        }
        let begin = cur;
        let max_end = len.min(begin + INDUCE_CACHE * workers);
        // Step over the slot at `begin` (it may itself carry the filler
        // value), then stop at the next unfilled A slot: its value is
        // produced by this very window.
        if cur != max_end {
            cur += 1;
        }
        while cur != max_end && unsafe { view.get(cur) } != PRECEDING_IS_A {
            cur += 1;
        }
        let end = cur;
        let window = end - begin;
        let per = (window + workers - 1) / workers;
        let bounds: Vec<(usize, usize)> = (0..workers)
            .map(|w| {
                let lo = begin + (w * per).min(window);
                let hi = begin + ((w + 1) * per).min(window);
                (lo, hi)
            })
            .collect();

        pool.install(|| {
            caches
                .par_iter_mut()
                .zip(&bounds)
                .for_each(|(cache, &(lo, hi))| {
                    cache.reset();
                    let chunk = unsafe { view.slice_mut(lo, hi - lo) };
                    for (off, slot) in chunk.iter_mut().enumerate() {
                        let v = *slot;
                        if v & PRECEDING_IS_A != 0 {
                            let idx = v & SA_INDEX_MASK;
                            if idx != 0 {
                                let ju = (idx - 1) as usize;
                                let c = bytes[ju];
                                let preceding_is_a = ju == 0 || bytes[ju - 1] >= bytes[ju];
                                let entry = if preceding_is_a {
                                    ju as i32 | PRECEDING_IS_A
                                } else if BWT {
                                    bytes[ju - 1] as i32
                                } else {
                                    ju as i32
                                };
                                cache.entries.push((c, entry));
                                cache.counts[c as usize] += 1;
                            }
                            if BWT {
                                if idx != 0 {
                                    *slot = bytes[(idx - 1) as usize] as i32;
                                } else {
                                    cache.sentinel = Some(lo + off);
                                }
                            } else {
                                *slot = idx;
                            }
                        }
                    }
                });
        });
        if BWT {
            for cache in &caches {
                if let Some(k) = cache.sentinel {
                    sentinel = k;
                }
            }
        }

        let stripe = (256 + workers - 1) / workers;
        let bucket = &mut sorter.front_bucket[..];
        pool.install(|| {
            bucket
                .par_chunks_mut(stripe)
                .zip(dest.par_chunks_mut(stripe * workers))
                .enumerate()
                .for_each(|(ci, (cursors, dchunk))| {
                    for (k, cursor) in cursors.iter_mut().enumerate() {
                        let symbol = ci * stripe + k;
                        for (w, cache) in caches.iter().enumerate() {
                            dchunk[k * workers + w] = *cursor;
                            *cursor += cache.counts[symbol];
                        }
                    }
                });
        });

        pool.install(|| {
            caches.par_iter().enumerate().for_each(|(w, cache)| {
                let mut cursors = [0i32; 256];
                for (c, cursor) in cursors.iter_mut().enumerate() {
                    *cursor = dest[c * workers + w];
                }
                for &(c, value) in &cache.entries {
                    let cursor = &mut cursors[c as usize];
                    unsafe { view.set(*cursor as usize, value) };
                    *cursor += 1;
                }
            });
        });

        cur = end;
    }
    sentinel
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::suffix_sort::text::Text;
    use crate::suffix_sort::Sorter;
    use crate::tools::pool::WorkerPool;

    /// Run stage one plus both stage-two variants on every thread count and
    /// require identical results: the windowed passes must reproduce the
    /// serial ones exactly.
    fn build(data: &[u8], threads: usize) -> Vec<i32> {
        let pool = WorkerPool::new(threads).unwrap();
        let mut sorter = Sorter::new(Text::new(data), &pool);
        let mut sa = vec![0i32; data.len() + 1];
        sorter.first_stage(&mut sa);
        sorter.second_stage(&mut sa);
        sa
    }

    fn build_bwt(data: &[u8], threads: usize) -> (Vec<i32>, usize) {
        let pool = WorkerPool::new(threads).unwrap();
        let mut sorter = Sorter::new(Text::new(data), &pool);
        let mut sa = vec![0i32; data.len() + 1];
        sorter.first_stage(&mut sa);
        let sentinel = sorter.second_stage_bwt(&mut sa);
        (sa, sentinel)
    }

    #[test]
    fn windowed_pass_matches_serial() {
        // Long enough that several windows are needed per bucket at 4
        // threads, with heavy repetition to stress the boundary handling.
        let data: Vec<u8> = (0..60_000u32)
            .map(|i| b"abbab"[(i % 5) as usize] ^ (i / 7919) as u8 & 1)
            .collect();
        let serial = build(&data, 1);
        for threads in [2, 3, 4] {
            assert_eq!(build(&data, threads), serial, "{} threads", threads);
        }
    }

    #[test]
    fn windowed_bwt_matches_serial() {
        let data: Vec<u8> = (0..40_000u32).map(|i| (i * 193 % 11) as u8 + b'0').collect();
        let (serial, sentinel) = build_bwt(&data, 1);
        for threads in [2, 4] {
            let (par, s) = build_bwt(&data, threads);
            assert_eq!(par, serial, "{} threads", threads);
            assert_eq!(s, sentinel, "{} threads", threads);
        }
    }

    #[test]
    fn window_is_clamped_to_the_cache_bound() {
        // An ascending ramp has one type-A suffix per 256 positions, so the
        // left-to-right boundary scan almost never finds an unfilled slot
        // and every interior window is clamped to exactly
        // INDUCE_CACHE * workers entries.
        for threads in [2usize, 4] {
            let len = INDUCE_CACHE * threads * 2 + 257;
            let data: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
            let serial = build(&data, 1);
            assert_eq!(build(&data, threads), serial, "{} threads", threads);
            let (serial_bwt, serial_sentinel) = build_bwt(&data, 1);
            let (par_bwt, par_sentinel) = build_bwt(&data, threads);
            assert_eq!(par_bwt, serial_bwt, "{} threads", threads);
            assert_eq!(par_sentinel, serial_sentinel, "{} threads", threads);
        }
    }

    #[test]
    fn sizes_around_the_cache_window() {
        // Input lengths bracketing one window's span per worker and the
        // whole window at four workers.
        let sizes = [
            INDUCE_CACHE - 1,
            INDUCE_CACHE,
            INDUCE_CACHE + 1,
            4 * INDUCE_CACHE - 1,
            4 * INDUCE_CACHE,
            4 * INDUCE_CACHE + 1,
        ];
        for len in sizes {
            let data: Vec<u8> = (0..len).map(|i| (i * 131 % 7) as u8 + b'a').collect();
            let serial = build(&data, 1);
            for threads in [2, 4] {
                assert_eq!(
                    build(&data, threads),
                    serial,
                    "len {} threads {}",
                    len,
                    threads
                );
            }
        }
    }

    #[test]
    fn suffix_zero_entry_does_not_stall_the_window_scan() {
        // Suffix 0 is type B here, so the right-to-left pass writes the
        // entry 0 | PRECEDING_IS_A somewhere inside a B region; the window
        // boundary scan must still make progress past it.
        let mut data = vec![b'a'; 30_000];
        for i in (0..data.len()).step_by(3) {
            data[i] = b'b';
        }
        data[0] = b'a';
        let serial = build(&data, 1);
        assert_eq!(build(&data, 4), serial);
    }
}

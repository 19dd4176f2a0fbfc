//! Reverse BWT: a parallel pointer chase.
//!
//! `next[k]` holds the row of the text-successor of row `k`, so following
//! `next` from row 0 (the sentinel row) visits the rows in text order. A
//! single chase is inherently sequential; instead the row space is seeded
//! with many walkers over disjoint output ranges. A walker stops when it
//! reaches a row another walker started from (the seed rows carry a visited
//! bit) or when its output range fills; finished walkers donate leftover
//! space to stalled ones. The decoded fragments are finally stitched
//! together by matching end row to start row.

use log::trace;
use rayon::prelude::*;

use crate::tools::pool::WorkerPool;
use crate::tools::shared::SharedSlice;

const VISITED: u32 = 0x8000_0000;
const ROW_MASK: u32 = 0x7fff_ffff;
/// Upper bound on chase walkers per worker.
const WALKERS_PER_WORKER: usize = 256;

struct Walker {
    start_row: usize,
    cur_row: u32,
    begin: usize,
    cur: usize,
    end: usize,
}

struct Fragment {
    begin: usize,
    end: usize,
    start_row: usize,
    end_row: usize,
}

pub(crate) fn reverse_transform(buffer: &mut [u8], sentinel: usize, pool: &WorkerPool) {
    let n = buffer.len();
    let workers = pool.workers();
    let per = (n + workers - 1) / workers;

    // Starting rank of each (worker, symbol) pair; rank 0 is the sentinel
    // row, so symbol ranks begin at 1.
    let mut ranks: Vec<[i32; 256]> = vec![[0; 256]; workers];
    pool.install(|| {
        ranks
            .par_iter_mut()
            .zip(buffer.par_chunks(per))
            .for_each(|(rank, chunk)| {
                for &b in chunk {
                    rank[b as usize] += 1;
                }
            });
    });
    let mut base = 1i32;
    for c in 0..256 {
        for rank in ranks.iter_mut() {
            let count = rank[c];
            rank[c] = base;
            base += count;
        }
    }

    // next[k]: row of the text-successor of row k. The successor of the
    // sentinel row is the row holding rotation 0, which is what the
    // sentinel index names. syms[k]: the BWT byte of row k itself.
    let mut next = vec![0u32; n + 1];
    let mut syms = vec![0u8; n + 1];
    next[0] = sentinel as u32;
    syms[0] = buffer[0];
    {
        let next_view = SharedSlice::new(&mut next);
        let data: &[u8] = buffer;
        pool.install(|| {
            ranks.par_iter_mut().enumerate().for_each(|(w, rank)| {
                let start = w * per;
                let end = ((w + 1) * per).min(n);
                if start >= end {
                    return;
                }
                let mut row = start + (start > sentinel) as usize;
                for (i, &b) in data[start..end].iter().enumerate() {
                    let i = start + i;
                    row += (i == sentinel) as usize;
                    let k = rank[b as usize];
                    rank[b as usize] += 1;
                    unsafe { next_view.set(k as usize, row as u32) };
                    row += 1;
                }
            });
        });
        pool.install(|| {
            syms[1..].par_iter_mut().enumerate().for_each(|(k, sym)| {
                let k = k + 1;
                *sym = data[k - (k >= sentinel) as usize];
            });
        });
    }

    // Seed walkers at evenly spaced rows; each seed slot gets the visited
    // bit so other walkers stop there.
    let first_row = next[0] as usize;
    let num_walkers = (workers * WALKERS_PER_WORKER).min(n + 1);
    let span = (2 * (n + 1) - 1) / num_walkers;
    let mut walkers: Vec<Walker> = Vec::with_capacity(num_walkers + 1);
    let mut row_idx = 0usize;
    let mut out = 0usize;
    while row_idx < n + 1 {
        let size = span.min(n + 1 - row_idx);
        walkers.push(Walker {
            start_row: (next[row_idx] & ROW_MASK) as usize,
            cur_row: next[row_idx],
            begin: out,
            cur: out,
            end: out + size,
        });
        next[row_idx] |= VISITED;
        row_idx += size;
        out += size;
    }
    trace!("decoding with {} chase walkers", walkers.len());

    // One slot of slack beyond the n output bytes: the sentinel-row visit
    // writes a placeholder without advancing, and with exactly n slots the
    // decode could exhaust every range with that one visit still pending.
    let mut scratch = vec![0u8; n + 1];
    let mut fragments: Vec<Fragment> = Vec::with_capacity(walkers.len() * 2);
    let mut spare: Vec<(usize, usize)> = Vec::new();
    let next_ref: &[u32] = &next;
    let syms_ref: &[u8] = &syms;
    while !walkers.is_empty() {
        let group = ((walkers.len() * 2 - 1) / workers).max(1);
        let scratch_view = SharedSlice::new(&mut scratch);
        pool.install(|| {
            walkers.par_chunks_mut(group).for_each(|chunk| loop {
                let mut progressed = false;
                for walker in chunk.iter_mut() {
                    if walker.cur_row & VISITED == 0 && walker.cur < walker.end {
                        progressed = true;
                        let row = walker.cur_row as usize;
                        unsafe { scratch_view.set(walker.cur, syms_ref[row]) };
                        // The sentinel row contributes no byte; the slot is
                        // rewritten by the next step.
                        walker.cur += (row != sentinel) as usize;
                        walker.cur_row = next_ref[row];
                    }
                }
                if !progressed {
                    break;
                }
            });
        });

        // Harvest: record decoded fragments, drop finished walkers, and hand
        // their leftover output space to walkers that ran out.
        walkers.retain_mut(|walker| {
            let finished = walker.cur_row & VISITED != 0;
            if finished || walker.cur > walker.begin {
                fragments.push(Fragment {
                    begin: walker.begin,
                    end: walker.cur,
                    start_row: walker.start_row,
                    end_row: (walker.cur_row & ROW_MASK) as usize,
                });
                walker.start_row = (walker.cur_row & ROW_MASK) as usize;
            }
            if finished && walker.cur < walker.end {
                spare.push((walker.cur, walker.end));
            }
            !finished
        });
        for walker in walkers.iter_mut() {
            let (begin, end) = spare.pop().unwrap_or((0, 0));
            walker.begin = begin;
            walker.cur = begin;
            walker.end = end;
        }
    }

    // Stitch the fragments in text order, starting from the successor of
    // the sentinel row.
    let mut pos = 0usize;
    let mut row = first_row;
    while pos < n {
        let fragment = fragments
            .iter()
            .find(|f| f.start_row == row)
            .expect("decoded fragment chain is broken");
        let len = fragment.end - fragment.begin;
        buffer[pos..pos + len].copy_from_slice(&scratch[fragment.begin..fragment.end]);
        pos += len;
        row = fragment.end_row;
    }
}

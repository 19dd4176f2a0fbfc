//! Stage-one bucket accounting: a fused classify-and-count scan over the
//! input, the bucket layout derived from the counts, and the initial
//! two-byte radix scatter that seeds the B* partitions.
//!
//! Both scans run right to left so the type of each position follows from
//! the position after it. Each worker covers a contiguous block and seeds
//! its state by classifying the block's rightmost position directly.

use log::trace;
use rayon::prelude::*;

use crate::tools::pool::WorkerPool;
use crate::tools::shared::SharedSlice;

use super::text::{SuffixType, Text};
use super::{PRECEDING_IS_A, UNSORTED_B};

/// One B* digram group awaiting the stage-one sort.
pub(crate) struct BstarPartition {
    pub start: i32,
    pub size: i32,
    pub digram: u16,
}

/// Per-kind suffix tallies from the counting scan.
pub(crate) struct SuffixCounts {
    pub a_digram: Vec<i32>,
    /// B suffixes that are not B*, per digram.
    pub b_digram: Vec<i32>,
    /// B* tallies per worker, kept separate to derive per-worker scatter
    /// cursors later.
    pub bstar: Vec<Vec<i32>>,
    pub a_byte: Vec<i32>,
    pub b_byte: Vec<i32>,
}

/// Cursor tables and partition list for the rest of the build.
pub(crate) struct BucketLayout {
    pub front_bucket: Vec<i32>,
    /// Tail cursors indexed by `second_byte << 8 | first_byte`.
    pub back_bucket: Vec<i32>,
    pub a_byte: Vec<i32>,
    pub b_byte: Vec<i32>,
    pub a_digram: Vec<i32>,
    /// All B suffixes (B* included) per digram.
    pub b_digram: Vec<i32>,
    pub total_bstar: Vec<i32>,
    /// Per-worker write cursors into the compact B* prefix of the array.
    pub bstar_offset: Vec<Vec<i32>>,
    pub partitions: Vec<BstarPartition>,
    pub num_bstar: i32,
}

struct TypeHistogram {
    a: Vec<i32>,
    b: Vec<i32>,
    bstar: Vec<i32>,
}

impl TypeHistogram {
    fn new() -> Self {
        TypeHistogram {
            a: vec![0; 0x10000],
            b: vec![0; 0x10000],
            bstar: vec![0; 0x10000],
        }
    }
}

/// Contiguous scan blocks covering positions `0 ..= n-2`. The final position
/// is always type A and is accounted separately by the caller.
fn scan_blocks(n: usize, workers: usize) -> Vec<(usize, usize)> {
    let per = (n + workers - 1) / workers;
    let mut blocks = Vec::with_capacity(workers);
    let mut start = 0usize;
    for _ in 0..workers {
        let end = (start + per).min(n.saturating_sub(1));
        blocks.push((start, end));
        start = end;
    }
    blocks
}

pub(crate) fn count_suffix_types(text: &Text<'_>, pool: &WorkerPool) -> SuffixCounts {
    let n = text.len();
    let workers = pool.workers();
    let blocks = scan_blocks(n, workers);
    let mut hists: Vec<TypeHistogram> = (0..workers).map(|_| TypeHistogram::new()).collect();
    pool.install(|| {
        hists
            .par_iter_mut()
            .zip(&blocks)
            .for_each(|(hist, &(start, end))| count_block(text, start, end, hist));
    });

    let mut counts = SuffixCounts {
        a_digram: vec![0; 0x10000],
        b_digram: vec![0; 0x10000],
        bstar: Vec::with_capacity(workers),
        a_byte: vec![0; 256],
        b_byte: vec![0; 256],
    };
    // The final suffix is a lone type A whose digram is terminated by the
    // sentinel.
    let last = text.bytes()[n - 1] as usize;
    counts.a_digram[last << 8] += 1;
    counts.a_byte[last] += 1;
    for hist in hists {
        for d in 0..0x10000 {
            counts.a_digram[d] += hist.a[d];
            counts.b_digram[d] += hist.b[d];
            counts.a_byte[d >> 8] += hist.a[d];
            counts.b_byte[d >> 8] += hist.b[d] + hist.bstar[d];
        }
        counts.bstar.push(hist.bstar);
    }
    counts
}

fn count_block(text: &Text<'_>, start: usize, end: usize, hist: &mut TypeHistogram) {
    if start >= end {
        return;
    }
    let bytes = text.bytes();
    let mut state: u32 = match text.suffix_type(end - 1) {
        SuffixType::B => 0,
        SuffixType::A => 1,
        SuffixType::BStar => 2,
    };
    let mut i = end - 1;
    loop {
        let d = text.digram(i);
        match state & 3 {
            0 => hist.b[d] += 1,
            2 => hist.bstar[d] += 1,
            _ => hist.a[d] += 1,
        }
        if i == start {
            break;
        }
        i -= 1;
        // Shift unless the new position extends an equal run whose right
        // neighbour is type A; the low bit becomes the new position's type.
        state <<= (bytes[i] != bytes[i + 1] || state & 1 == 0) as u32;
        state |= (bytes[i] > bytes[i + 1]) as u32;
    }
}

/// Turn the counts into bucket cursors and the compact B* partition list.
///
/// Within each leading-byte bucket the digram regions are laid out in
/// second-byte order, each as its A slots followed by its B slots with the
/// B* entries at the front of the B region. Slot 0 is the sentinel row.
pub(crate) fn build_bucket_layout(mut counts: SuffixCounts) -> BucketLayout {
    let workers = counts.bstar.len();
    let mut front_bucket = vec![0i32; 256];
    let mut back_bucket = vec![0i32; 0x10000];
    let mut total_bstar = vec![0i32; 0x10000];
    let mut bstar_offset: Vec<Vec<i32>> = (0..workers).map(|_| vec![0i32; 0x10000]).collect();
    let mut partitions = Vec::new();
    let mut total: i32 = 1;
    let mut num_bstar: i32 = 0;
    for first in 0..256usize {
        front_bucket[first] = total;
        for second in 0..256usize {
            let d = first << 8 | second;
            let partition_start = num_bstar;
            for w in 0..workers {
                bstar_offset[w][d] = num_bstar;
                let c = counts.bstar[w][d];
                total_bstar[d] += c;
                num_bstar += c;
                counts.b_digram[d] += c;
            }
            total += counts.b_digram[d] + counts.a_digram[d];
            back_bucket[second << 8 | first] = total;
            if total_bstar[d] > 0 {
                partitions.push(BstarPartition {
                    start: partition_start,
                    size: total_bstar[d],
                    digram: d as u16,
                });
            }
        }
    }
    trace!(
        "{} B* suffixes in {} partitions",
        num_bstar,
        partitions.len()
    );
    BucketLayout {
        front_bucket,
        back_bucket,
        a_byte: counts.a_byte,
        b_byte: counts.b_byte,
        a_digram: counts.a_digram,
        b_digram: counts.b_digram,
        total_bstar,
        bstar_offset,
        partitions,
        num_bstar,
    }
}

/// Re-run the classify scan and scatter every B* position into its reserved
/// slot in the compact prefix, flag precomputed.
pub(crate) fn place_bstar_suffixes(
    text: &Text<'_>,
    pool: &WorkerPool,
    cursors: &mut [Vec<i32>],
    sa: &mut [i32],
) {
    let blocks = scan_blocks(text.len(), pool.workers());
    let view = SharedSlice::new(sa);
    pool.install(|| {
        cursors
            .par_iter_mut()
            .zip(&blocks)
            .for_each(|(cursor, &(start, end))| place_block(text, start, end, cursor, &view));
    });
}

fn place_block(
    text: &Text<'_>,
    start: usize,
    end: usize,
    cursor: &mut [i32],
    sa: &SharedSlice<'_, i32>,
) {
    if start >= end {
        return;
    }
    let bytes = text.bytes();
    let mut state: u32 = match text.suffix_type(end - 1) {
        SuffixType::B => 0,
        SuffixType::A => 1,
        SuffixType::BStar => 2,
    };
    let mut i = end - 1;
    loop {
        if state & 3 == 2 {
            let flag = if i > 0 && bytes[i - 1] <= bytes[i] {
                0
            } else {
                PRECEDING_IS_A
            };
            let d = text.digram(i);
            let slot = cursor[d];
            cursor[d] += 1;
            unsafe { sa.set(slot as usize, i as i32 | flag) };
        }
        if i == start {
            break;
        }
        i -= 1;
        state <<= (bytes[i] != bytes[i + 1] || state & 1 == 0) as u32;
        state |= (bytes[i] > bytes[i + 1]) as u32;
    }
}

/// Move the sorted compact B* prefix out to the final digram positions, mark
/// the remaining B slots unsorted and the A slots with the preceding-A
/// filler, and pin the sentinel row.
pub(crate) fn spread_bstar(sa: &mut [i32], layout: &BucketLayout) {
    let n = sa.len() - 1;
    let mut dst = sa.len();
    let mut src = layout.num_bstar as usize;
    for d in (0..0x10000usize).rev() {
        let b = layout.b_digram[d] as usize;
        let a = layout.a_digram[d] as usize;
        if a == 0 && b == 0 {
            continue;
        }
        dst -= b;
        let stars = layout.total_bstar[d] as usize;
        src -= stars;
        for j in (0..stars).rev() {
            sa[dst + j] = sa[src + j];
        }
        for j in stars..b {
            sa[dst + j] = UNSORTED_B;
        }
        dst -= a;
        for slot in &mut sa[dst..dst + a] {
            *slot = PRECEDING_IS_A;
        }
    }
    sa[0] = n as i32 | PRECEDING_IS_A;
}

//! Burrows-Wheeler transform entry points.
//!
//! The forward transform is the suffix sort with the induce passes emitting
//! preceding bytes instead of indices; the sentinel row (where the rotation
//! starting at position 0 lands) is returned so the transform stays
//! invertible. The reverse transform rebuilds the text with a partitioned
//! parallel pointer chase.

use log::info;

use crate::suffix_sort::text::Text;
use crate::suffix_sort::Sorter;
use crate::tools::pool::WorkerPool;
use crate::Error;

pub(crate) mod reverse;

/// Replace `buffer` with its BWT and return the sentinel row index.
///
/// The output has the same length as the input; the sentinel row's byte (the
/// virtual end-of-input marker) is omitted and its position returned
/// instead, so `reverse_bwt(buffer, sentinel, ..)` restores the input.
pub fn forward_bwt(buffer: &mut [u8], num_threads: usize) -> Result<usize, Error> {
    if buffer.len() >= crate::MAX_INPUT_LEN {
        return Err(Error::InputTooLarge { len: buffer.len() });
    }
    if buffer.is_empty() {
        return Ok(0);
    }
    info!(
        "forward BWT over {} bytes on {} thread(s)",
        buffer.len(),
        num_threads.max(1)
    );
    let pool = WorkerPool::new(num_threads)?;
    let mut sa = vec![0i32; buffer.len() + 1];
    let sentinel = {
        let mut sorter = Sorter::new(Text::new(buffer), &pool);
        sorter.first_stage(&mut sa);
        sorter.second_stage_bwt(&mut sa)
    };
    let mut w = 0usize;
    for (k, &v) in sa.iter().enumerate() {
        if k != sentinel {
            buffer[w] = v as u8;
            w += 1;
        }
    }
    Ok(sentinel)
}

/// Invert [`forward_bwt`]: restore the original bytes of `buffer` given the
/// sentinel row index it returned.
pub fn reverse_bwt(
    buffer: &mut [u8],
    sentinel_index: usize,
    num_threads: usize,
) -> Result<(), Error> {
    if buffer.len() >= crate::MAX_INPUT_LEN {
        return Err(Error::InputTooLarge { len: buffer.len() });
    }
    if sentinel_index > buffer.len() {
        return Err(Error::InvalidSentinelIndex {
            index: sentinel_index,
            len: buffer.len(),
        });
    }
    if buffer.is_empty() {
        return Ok(());
    }
    info!(
        "reverse BWT over {} bytes on {} thread(s)",
        buffer.len(),
        num_threads.max(1)
    );
    let pool = WorkerPool::new(num_threads)?;
    reverse::reverse_transform(buffer, sentinel_index, &pool);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::suffix_sort::make_suffix_array;

    /// BWT derived straight from the definition: last column of the sorted
    /// sentinel-terminated rotations, with the sentinel row removed.
    fn reference_bwt(input: &[u8]) -> (Vec<u8>, usize) {
        let sa = make_suffix_array(input, 1).unwrap();
        let mut out = Vec::with_capacity(input.len());
        let mut sentinel = 0;
        for (k, &v) in sa.iter().enumerate() {
            if v == 0 {
                sentinel = k;
            } else {
                out.push(input[v as usize - 1]);
            }
        }
        (out, sentinel)
    }

    fn roundtrip(input: &[u8], threads: usize) {
        let mut buf = input.to_vec();
        let sentinel = forward_bwt(&mut buf, threads).unwrap();
        let (expect, expect_sentinel) = reference_bwt(input);
        assert_eq!(buf, expect, "forward output for len {}", input.len());
        assert_eq!(sentinel, expect_sentinel);
        reverse_bwt(&mut buf, sentinel, threads).unwrap();
        assert_eq!(buf, input, "roundtrip for len {}", input.len());
    }

    #[test]
    fn empty_and_single_byte() {
        let mut buf: Vec<u8> = vec![];
        assert_eq!(forward_bwt(&mut buf, 1).unwrap(), 0);
        reverse_bwt(&mut buf, 0, 1).unwrap();
        assert!(buf.is_empty());
        roundtrip(b"a", 1);
    }

    #[test]
    fn banana_transform() {
        let mut buf = b"banana".to_vec();
        let sentinel = forward_bwt(&mut buf, 1).unwrap();
        // Last column of the sorted rotations of "banana$" is "annb$aa".
        assert_eq!(buf, b"annbaa");
        assert_eq!(sentinel, 4);
        reverse_bwt(&mut buf, sentinel, 1).unwrap();
        assert_eq!(buf, b"banana");
    }

    #[test]
    fn mississippi_transform() {
        let mut buf = b"mississippi".to_vec();
        let sentinel = forward_bwt(&mut buf, 1).unwrap();
        // "ipssm$pissii" with the sentinel removed.
        assert_eq!(buf, b"ipssmpissii");
        assert_eq!(sentinel, 5);
        reverse_bwt(&mut buf, sentinel, 1).unwrap();
        assert_eq!(buf, b"mississippi");
    }

    #[test]
    fn roundtrips_across_shapes_and_threads() {
        let cases: Vec<Vec<u8>> = vec![
            b"abababab".to_vec(),
            b"aaaaaaaa".to_vec(),
            vec![0u8; 300],
            (0..=255u8).collect(),
            b"If Peter Piper picked a peck of pickled peppers".to_vec(),
            (0..10_000u32).map(|i| (i * 37 % 251) as u8).collect(),
            (0..50_000u32).map(|i| b"acgt"[(i % 4) as usize]).collect(),
        ];
        for input in &cases {
            for threads in [1, 2, 4] {
                roundtrip(input, threads);
            }
        }
    }

    #[test]
    fn single_repeated_byte_large() {
        let input = vec![b'x'; 1_000_000];
        roundtrip(&input, 4);
    }

    #[test]
    fn sentinel_index_is_validated() {
        let mut buf = b"abc".to_vec();
        assert!(matches!(
            reverse_bwt(&mut buf, 4, 1),
            Err(Error::InvalidSentinelIndex { index: 4, len: 3 })
        ));
        assert!(reverse_bwt(&mut buf, 3, 1).is_ok());
    }
}

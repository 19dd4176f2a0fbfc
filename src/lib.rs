//! Parallel suffix array construction and Burrows-Wheeler transforms.
//!
//! The engine sorts with an improved two-stage scheme: only the B* suffixes
//! (positions where a descending run turns ascending) are sorted directly,
//! by a parallel multikey quicksort with tandem-repeat acceleration; the
//! rest of the order is induced by two linear bucket passes. The reverse
//! transform is a partitioned pointer chase with cooperative rebalancing.
//!
//! Three entry points:
//!
//! ```
//! let sa = parbwt::make_suffix_array(b"banana", 2).unwrap();
//! assert_eq!(sa, vec![6, 5, 3, 1, 0, 4, 2]);
//!
//! let mut buf = b"banana".to_vec();
//! let sentinel = parbwt::forward_bwt(&mut buf, 2).unwrap();
//! parbwt::reverse_bwt(&mut buf, sentinel, 2).unwrap();
//! assert_eq!(buf, b"banana");
//! ```
//!
//! Inputs up to 2^30 - 1 bytes are supported; suffix indices are `i32` with
//! the high bits reserved for the engine's transient state.

use std::fmt::{self, Display, Formatter};

pub mod bwt;
pub mod suffix_sort;
pub mod tools;

pub use bwt::{forward_bwt, reverse_bwt};
pub use suffix_sort::make_suffix_array;

/// Inputs at or above this length are refused.
pub const MAX_INPUT_LEN: usize = 1 << 30;

/// The engine's only runtime failures; everything else is a caller-contract
/// violation that panics.
#[derive(Debug)]
pub enum Error {
    /// Input length does not fit the 30-bit suffix index space.
    InputTooLarge { len: usize },
    /// Reverse BWT called with a sentinel row outside `0..=len`.
    InvalidSentinelIndex { index: usize, len: usize },
    /// The worker pool could not be built.
    ThreadPool(rayon::ThreadPoolBuildError),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::InputTooLarge { len } => {
                write!(f, "input of {} bytes exceeds the 2^30 - 1 limit", len)
            }
            Error::InvalidSentinelIndex { index, len } => {
                write!(
                    f,
                    "sentinel index {} is outside 0..={} for this buffer",
                    index, len
                )
            }
            Error::ThreadPool(e) => write!(f, "worker pool construction failed: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ThreadPool(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for Error {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        Error::ThreadPool(e)
    }
}

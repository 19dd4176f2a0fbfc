//! Command line interpretation for the demo binary - uses the external CLAP
//! crate.

use clap::Parser;
use log::LevelFilter;
use std::fmt::{self, Display, Formatter};

/// Transform, invert, or index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Bwt,
    Unbwt,
    SuffixArray,
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about = "Suffix-array and Burrows-Wheeler transform demo driver",
    long_about = None)]
pub struct Args {
    /// File to process
    #[clap()]
    pub filename: String,

    /// Apply the forward transform (default)
    #[clap(short = 'z', long = "bwt")]
    bwt: bool,

    /// Invert a transformed file
    #[clap(short = 'd', long = "unbwt")]
    unbwt: bool,

    /// Build the suffix array and report timings only
    #[clap(short = 's', long = "suffix-array")]
    suffix_array: bool,

    /// Output file; defaults to the input name plus/minus ".bwt"
    #[clap(short = 'o', long = "output")]
    pub output: Option<String>,

    /// Worker threads
    #[clap(short = 't', long = "threads", default_value_t = 1)]
    pub threads: usize,

    /// Sets verbosity. -v shows very little, -vvvv is chatty
    #[clap(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    pub fn mode(&self) -> Mode {
        if self.unbwt {
            Mode::Unbwt
        } else if self.suffix_array {
            Mode::SuffixArray
        } else {
            Mode::Bwt
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

//Enable more cargo lint tests
#![warn(rust_2018_idioms)]

use std::fs;
use std::io::{self, Write};
use std::time::Instant;

use clap::Parser;
use log::{info, warn};
use simplelog::{Config, TermLogger, TerminalMode};

use parbwt::tools::cli::{Args, Mode};
use parbwt::{forward_bwt, make_suffix_array, reverse_bwt};

/// A transformed file is the 4-byte little-endian sentinel row followed by
/// the transformed bytes.
const HEADER_LEN: usize = 4;

fn main() -> io::Result<()> {
    let args = Args::parse();
    TermLogger::init(
        args.log_level(),
        Config::default(),
        TerminalMode::Stdout,
        simplelog::ColorChoice::Auto,
    )
    .unwrap();

    info!("{} {}", args.mode(), args.filename);
    let timer = Instant::now();
    match args.mode() {
        Mode::Bwt => {
            let mut data = fs::read(&args.filename)?;
            let sentinel = forward_bwt(&mut data, args.threads)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
            let out_name = args
                .output
                .clone()
                .unwrap_or_else(|| format!("{}.bwt", args.filename));
            let mut out = fs::File::create(&out_name)?;
            out.write_all(&(sentinel as u32).to_le_bytes())?;
            out.write_all(&data)?;
            info!(
                "wrote {} ({} bytes, sentinel row {})",
                out_name,
                data.len() + HEADER_LEN,
                sentinel
            );
        }
        Mode::Unbwt => {
            let raw = fs::read(&args.filename)?;
            if raw.len() < HEADER_LEN {
                warn!("{} is too short to be a transformed file", args.filename);
                return Err(io::Error::new(io::ErrorKind::InvalidData, "missing header"));
            }
            let sentinel = u32::from_le_bytes(raw[..HEADER_LEN].try_into().unwrap()) as usize;
            let mut data = raw[HEADER_LEN..].to_vec();
            reverse_bwt(&mut data, sentinel, args.threads)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            let out_name = args.output.clone().unwrap_or_else(|| {
                args.filename
                    .strip_suffix(".bwt")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}.out", args.filename))
            });
            fs::write(&out_name, &data)?;
            info!("wrote {} ({} bytes)", out_name, data.len());
        }
        Mode::SuffixArray => {
            let data = fs::read(&args.filename)?;
            let sa = make_suffix_array(&data, args.threads)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
            info!("suffix array of {} entries built", sa.len());
        }
    }
    info!("done in {:?}", timer.elapsed());
    Ok(())
}

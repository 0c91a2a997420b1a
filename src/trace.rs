use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::info;

use crate::commons::{Addr, Instr, Instructions};
use crate::error::{SimError, SimResult};

/// load `<prefix>_proc<id>.trace` for every core
pub fn load_traces(prefix: &str, num_cores: u32) -> SimResult<Vec<Instructions>> {
    let mut traces = Vec::with_capacity(num_cores as usize);
    for id in 0..num_cores {
        let path = PathBuf::from(format!("{prefix}_proc{id}.trace"));
        let file = File::open(&path).map_err(|source| SimError::TraceOpen {
            path: path.clone(),
            source,
        })?;
        let insts = parse_trace(BufReader::new(file), &path)?;
        info!("loaded {} instructions from {}", insts.len(), path.display());
        traces.push(insts);
    }
    Ok(traces)
}

/// one reference per line: `R` or `W`, whitespace, then a 32-bit hex
/// address with or without a `0x` prefix; blank lines are skipped
pub fn parse_trace<R: BufRead>(reader: R, path: &Path) -> SimResult<Instructions> {
    let mut insts = Instructions::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let mut parts = line.split_whitespace();
        let Some(op) = parts.next() else {
            continue;
        };
        let malformed = || SimError::TraceParse {
            path: path.to_path_buf(),
            line_no: i + 1,
            line: line.clone(),
        };
        let Some(addr) = parts.next() else {
            return Err(malformed());
        };
        if parts.next().is_some() {
            return Err(malformed());
        }
        let addr = u32::from_str_radix(addr.trim_start_matches("0x"), 16)
            .map(Addr)
            .map_err(|_| malformed())?;
        insts.push_back(match op {
            "R" => Instr::Read(addr),
            "W" => Instr::Write(addr),
            _ => return Err(malformed()),
        });
    }
    Ok(insts)
}

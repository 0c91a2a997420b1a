use std::io::{self, Write};

use crate::bus::Bus;
use crate::cache::Cache;
use crate::commons::SimConfig;
use crate::processor::Core;

/// write the end-of-simulation report: configuration echo, one block per
/// core, then the overall bus summary
pub fn write_report<W: Write>(
    out: &mut W,
    trace_prefix: &str,
    cfg: &SimConfig,
    cores: &[Core],
    caches: &[Cache],
    bus: &Bus,
) -> io::Result<()> {
    writeln!(out, "Simulation Parameters:")?;
    writeln!(out, "Trace Prefix: {trace_prefix}")?;
    writeln!(out, "Set Index Bits: {}", cfg.set_bits)?;
    writeln!(out, "Associativity: {}", cfg.assoc)?;
    writeln!(out, "Block Bits: {}", cfg.block_bits)?;
    writeln!(out, "Block Size (Bytes): {}", cfg.block_size())?;
    writeln!(out, "Number of Sets: {}", cfg.num_sets())?;
    writeln!(out, "Cache Size (KB per core): {:.2}", cfg.cache_size_kb())?;
    writeln!(out, "MESI Protocol: Enabled")?;
    writeln!(out, "Write Policy: Write-back, Write-allocate")?;
    writeln!(out, "Replacement Policy: LRU")?;
    writeln!(out, "Bus: Central snooping bus")?;
    writeln!(out)?;

    for (core, cache) in cores.iter().zip(caches) {
        let s = &cache.stats;
        let refs = s.reads + s.writes;
        let miss_rate = if refs > 0 {
            100.0 * s.misses as f64 / refs as f64
        } else {
            0.0
        };
        writeln!(out, "Core {} Statistics:", core.id)?;
        writeln!(out, "Total Instructions: {}", core.instructions_run)?;
        writeln!(out, "Total Reads: {}", s.reads)?;
        writeln!(out, "Total Writes: {}", s.writes)?;
        writeln!(out, "Total Execution Cycles: {}", core.active_cycles)?;
        writeln!(out, "Idle Cycles: {}", core.idle_cycles)?;
        writeln!(out, "Cache Misses: {}", s.misses)?;
        writeln!(out, "Cache Miss Rate: {miss_rate:.2}%")?;
        writeln!(out, "Cache Evictions: {}", s.evictions)?;
        writeln!(out, "Writebacks: {}", s.writebacks)?;
        writeln!(out, "Bus Invalidations: {}", s.invalidations)?;
        writeln!(out, "Data Traffic (Bytes): {}", s.traffic_bytes)?;
        writeln!(out)?;
    }

    writeln!(out, "Overall Bus Summary:")?;
    writeln!(out, "Total Bus Transactions: {}", bus.transactions)?;
    writeln!(out, "Total Bus Traffic (Bytes): {}", bus.traffic_bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commons::{Addr, Instr, SimConfig};
    use crate::sim::Simulator;

    #[test]
    fn report_contains_all_sections() {
        let cfg = SimConfig::new(1, 2, 2).unwrap();
        let traces = vec![
            [Instr::Read(Addr(0))].into(),
            Default::default(),
            Default::default(),
            Default::default(),
        ];
        let mut sim = Simulator::new(cfg, traces);
        sim.run();

        let mut buf = Vec::new();
        write_report(&mut buf, "app", &cfg, &sim.cores, &sim.caches, &sim.bus).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.starts_with("Simulation Parameters:\n"));
        assert!(text.contains("Trace Prefix: app\n"));
        assert!(text.contains("Cache Size (KB per core): 0.02\n"));
        assert!(text.contains("Core 0 Statistics:\n"));
        assert!(text.contains("Core 3 Statistics:\n"));
        assert!(text.contains("Cache Miss Rate: 100.00%\n"));
        assert!(text.contains("Overall Bus Summary:\nTotal Bus Transactions: 1\n"));
    }
}

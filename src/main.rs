/*
    A trace-driven simulator for the MESI (Illinois) cache coherence
    protocol on a quad-core system with a central snooping bus.
*/

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use log::info;

use cachesim_mesi::{report, trace, SimConfig, SimResult, Simulator};

#[derive(Parser, Debug)]
#[command(name = "cachesim-mesi", version, about = "MESI cache coherence simulator")]
struct Args {
    /// Common prefix of the per-core trace files (<prefix>_proc<id>.trace)
    #[arg(short = 't', long = "trace")]
    trace_prefix: String,

    /// Number of set index bits (number of sets = 2^s)
    #[arg(short = 's', long = "set-bits")]
    set_bits: u32,

    /// Associativity (number of lines per set)
    #[arg(short = 'E', long = "assoc")]
    assoc: u32,

    /// Number of block offset bits (block size = 2^b bytes)
    #[arg(short = 'b', long = "block-bits")]
    block_bits: u32,

    /// Report output file; written to stdout when empty
    #[arg(short = 'o', long = "out", default_value = "")]
    out_file: String,

    /// Per-cycle debug tracing on stderr
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let default_filter = if args.debug { "debug" } else { "warn" };
    env_logger::init_from_env(Env::default().filter_or("CACHESIM_LOG", default_filter));

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> SimResult<()> {
    let cfg = SimConfig::new(args.set_bits, args.assoc, args.block_bits)?;
    let traces = trace::load_traces(&args.trace_prefix, cfg.num_cores)?;

    let mut sim = Simulator::new(cfg, traces);
    sim.run();

    info!("writing report");
    if args.out_file.is_empty() {
        let stdout = io::stdout();
        report::write_report(
            &mut stdout.lock(),
            &args.trace_prefix,
            &cfg,
            &sim.cores,
            &sim.caches,
            &sim.bus,
        )?;
    } else {
        let mut out = BufWriter::new(File::create(&args.out_file)?);
        report::write_report(
            &mut out,
            &args.trace_prefix,
            &cfg,
            &sim.cores,
            &sim.caches,
            &sim.bus,
        )?;
        out.flush()?;
    }
    Ok(())
}

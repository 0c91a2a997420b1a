/*
    A cycle-accurate, trace-driven simulator of a quad-core shared-memory
    system with MESI-coherent write-back L1 caches on a central snooping bus.
*/

pub mod bus;
pub mod cache;
pub mod commons;
pub mod error;
pub mod processor;
pub mod report;
pub mod sim;
pub mod trace;

pub use bus::{Bus, BusSignal, BusTx};
pub use cache::{Cache, CacheStats, MesiState, RequestOutcome, SnoopOutcome};
pub use commons::{Addr, Instr, Instructions, MemOp, SimConfig, NUM_CORES};
pub use error::{SimError, SimResult};
pub use processor::Core;
pub use sim::Simulator;

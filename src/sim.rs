use log::{debug, info};

use crate::bus::{Bus, BusTx};
use crate::cache::{Cache, RequestOutcome};
use crate::commons::{Instr, Instructions, SimConfig};
use crate::processor::Core;

/// the simulation engine: advances the global clock, arbitrates the bus,
/// routes requests and snoops, and accounts active/idle time
pub struct Simulator {
    pub cfg: SimConfig,
    pub cycle: u64,
    pub cores: Vec<Core>,
    pub caches: Vec<Cache>,
    pub bus: Bus,
    pub invalidations: u64,
}

impl Simulator {
    pub fn new(cfg: SimConfig, traces: Vec<Instructions>) -> Self {
        assert_eq!(
            traces.len(),
            cfg.num_cores as usize,
            "one trace per core expected"
        );
        let cores = traces
            .into_iter()
            .enumerate()
            .map(|(id, insts)| Core::new(id as u32, insts))
            .collect();
        let caches = (0..cfg.num_cores).map(|id| Cache::new(id, cfg)).collect();
        Simulator {
            cfg,
            cycle: 0,
            cores,
            caches,
            bus: Bus::new(),
            invalidations: 0,
        }
    }

    pub fn finished(&self) -> bool {
        self.cores.iter().all(|c| c.finished)
    }

    pub fn run(&mut self) {
        info!(
            "starting simulation: {} cores, {} sets, {}-way, {}-byte blocks",
            self.cfg.num_cores,
            self.cfg.num_sets(),
            self.cfg.assoc,
            self.cfg.block_size()
        );
        while !self.finished() {
            self.step();
        }
        info!("simulation finished at cycle {}", self.cycle);
    }

    /// advance the clock by one cycle
    pub fn step(&mut self) {
        self.cycle += 1;
        let cycle = self.cycle;

        // release the bus once its transaction has drained
        if self.bus.is_busy() && cycle >= self.bus.free_at() {
            self.bus.release();
        }

        // cores whose instruction drained fetch the next one
        for core in &mut self.cores {
            core.refill(cycle);
        }

        // local hits never arbitrate: any number of cores may resolve one
        // this cycle, bus busy or not
        for i in 0..self.cores.len() {
            if !self.cores[i].ready(cycle) {
                continue;
            }
            let instr = self.cores[i].pending.expect("ready implies pending");
            if self.caches[i].needs_bus(instr.op(), instr.addr()) {
                continue;
            }
            let outcome = self.dispatch(i, instr);
            debug_assert!(outcome.bus.is_none(), "local hit issued a bus signal");
            self.cores[i].issue(cycle, outcome.exec_cycles);
        }

        // at most one bus grant per cycle
        if self.bus.is_free(cycle) {
            if let Some(i) = self.arbitrate(cycle) {
                let instr = self.cores[i].pending.expect("winner has a pending instr");
                let outcome = self.dispatch(i, instr);
                if let Some(sig) = outcome.bus {
                    let hold = outcome.exec_cycles;
                    self.bus.acquire(
                        BusTx {
                            origin: i as u32,
                            sig,
                            hold,
                        },
                        cycle + hold - 1,
                    );
                }
                self.bus.add_traffic(outcome.bytes);
                self.invalidations += outcome.invalidations;
                self.cores[i].issue(cycle, outcome.exec_cycles);
            }
        }

        // everyone else with work pending waited this cycle out
        for core in &mut self.cores {
            if !core.finished && core.pending.is_some() && core.blocked_until < cycle {
                core.idle_cycles += 1;
            }
        }
    }

    /// earliest request wins the bus; ties go to the lowest core id
    fn arbitrate(&self, cycle: u64) -> Option<usize> {
        self.cores
            .iter()
            .enumerate()
            .filter(|(_, core)| core.ready(cycle) && core.request_ready <= cycle)
            .filter(|(i, core)| {
                let instr = core.pending.expect("ready implies pending");
                self.caches[*i].needs_bus(instr.op(), instr.addr())
            })
            .min_by_key(|(i, core)| (core.request_ready, *i))
            .map(|(i, _)| i)
    }

    /// run one request against core `i`'s cache, snooping all the others
    fn dispatch(&mut self, i: usize, instr: Instr) -> RequestOutcome {
        let (left, rest) = self.caches.split_at_mut(i);
        let (cache, right) = rest.split_first_mut().expect("core index in range");
        let mut peers: Vec<&mut Cache> = left.iter_mut().chain(right.iter_mut()).collect();
        let outcome = cache.process_request(instr.op(), instr.addr(), &mut peers);
        debug!(
            "cycle {}: core {} {} {} -> {} ({} cycles, {} bytes)",
            self.cycle,
            i,
            instr.op(),
            instr.addr(),
            if outcome.hit { "hit" } else { "miss" },
            outcome.exec_cycles,
            outcome.bytes,
        );
        outcome
    }
}

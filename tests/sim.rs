use cachesim_mesi::commons::{Addr, Instr, Instructions, SimConfig};
use cachesim_mesi::{MesiState, Simulator};

fn cfg() -> SimConfig {
    // block size 4, 2 sets, 2-way
    SimConfig::new(1, 2, 2).unwrap()
}

fn quad(per_core: [&[Instr]; 4]) -> Vec<Instructions> {
    per_core.iter().map(|t| t.iter().copied().collect()).collect()
}

fn run(cfg: SimConfig, traces: Vec<Instructions>) -> Simulator {
    let mut sim = Simulator::new(cfg, traces);
    sim.run();
    check_invariants(&sim);
    sim
}

/// coherence and accounting invariants that must hold at termination
fn check_invariants(sim: &Simulator) {
    // a Modified or Exclusive copy is the only valid copy of its block
    for (i, cache) in sim.caches.iter().enumerate() {
        for addr in interesting_addrs() {
            let state = cache.state_of(addr);
            if state == MesiState::Modified || state == MesiState::Exclusive {
                for (j, other) in sim.caches.iter().enumerate() {
                    if i != j {
                        assert_eq!(
                            other.state_of(addr),
                            MesiState::Invalid,
                            "block {addr} duplicated while core {i} holds {state}"
                        );
                    }
                }
            }
        }
    }
    for (core, cache) in sim.cores.iter().zip(&sim.caches) {
        let s = cache.stats;
        assert_eq!(s.hits + s.misses, s.reads + s.writes, "core {}", core.id);
        assert_eq!(
            core.active_cycles + core.idle_cycles,
            core.finish_cycle,
            "core {}",
            core.id
        );
    }
    let per_core: u64 = sim.caches.iter().map(|c| c.stats.traffic_bytes).sum();
    assert_eq!(sim.bus.traffic_bytes, per_core);
}

fn interesting_addrs() -> Vec<Addr> {
    [0x00u32, 0x04, 0x10, 0x20, 0x40, 0xDEAD0000]
        .iter()
        .map(|&a| Addr(a))
        .collect()
}

#[test]
fn cold_read_fetches_exclusive_from_memory() {
    let t0 = [Instr::Read(Addr(0))];
    let sim = run(cfg(), quad([&t0, &[], &[], &[]]));

    assert_eq!(sim.caches[0].state_of(Addr(0)), MesiState::Exclusive);
    assert_eq!(sim.caches[0].stats.misses, 1);
    assert_eq!(sim.cores[0].active_cycles, 101);
    assert_eq!(sim.cores[0].finish_cycle, 101);
    assert_eq!(sim.bus.transactions, 1);
    assert_eq!(sim.bus.traffic_bytes, 4);
    assert_eq!(sim.invalidations, 0);
}

#[test]
fn second_reader_is_served_cache_to_cache() {
    let t0 = [Instr::Read(Addr(0))];
    let t1 = [Instr::Read(Addr(0))];
    let sim = run(cfg(), quad([&t0, &t1, &[], &[]]));

    assert_eq!(sim.caches[0].state_of(Addr(0)), MesiState::Shared);
    assert_eq!(sim.caches[1].state_of(Addr(0)), MesiState::Shared);
    // 2 * (block/4) + 1 execute
    assert_eq!(sim.cores[1].active_cycles, 3);
    assert_eq!(sim.bus.transactions, 2);
    assert_eq!(sim.bus.traffic_bytes, 8);
    assert_eq!(sim.invalidations, 0);
    assert_eq!(sim.caches[0].stats.writebacks, 0);
}

#[test]
fn write_on_shared_upgrades_and_invalidates_the_other_holder() {
    let t0 = [Instr::Read(Addr(0)), Instr::Write(Addr(0))];
    let t1 = [Instr::Read(Addr(0))];
    let sim = run(cfg(), quad([&t0, &t1, &[], &[]]));

    assert_eq!(sim.caches[0].state_of(Addr(0)), MesiState::Modified);
    assert_eq!(sim.caches[1].state_of(Addr(0)), MesiState::Invalid);
    assert_eq!(sim.invalidations, 1);
    assert_eq!(sim.caches[1].stats.invalidations, 1);
    // 101 for the cold read + 1 for the transfer-free upgrade
    assert_eq!(sim.cores[0].active_cycles, 102);
    // read 4 + c2c 4 + invalidation message 4
    assert_eq!(sim.bus.traffic_bytes, 12);
    assert_eq!(sim.bus.transactions, 3);
}

#[test]
fn write_miss_on_remote_modified_costs_a_flush() {
    let t0 = [Instr::Write(Addr(0))];
    let t2 = [Instr::Write(Addr(0))];
    let sim = run(cfg(), quad([&t0, &[], &t2, &[]]));

    // core 0 wins arbitration, so core 2 finds its dirty copy
    assert_eq!(sim.caches[0].state_of(Addr(0)), MesiState::Invalid);
    assert_eq!(sim.caches[2].state_of(Addr(0)), MesiState::Modified);
    assert_eq!(sim.caches[0].stats.writebacks, 1);
    assert_eq!(sim.invalidations, 1);
    // 100 fetch + 1 execute + 100 dirty flush
    assert_eq!(sim.cores[2].active_cycles, 201);
    // 4 fill; then 4 fill + 4 invalidation message + 4 flush
    assert_eq!(sim.bus.traffic_bytes, 16);
}

#[test]
fn lru_eviction_of_modified_victim_writes_back() {
    // tags 0, 2 and 4 all land in set 0; the third write displaces the
    // Modified line for 0x00
    let t0 = [
        Instr::Write(Addr(0x00)),
        Instr::Write(Addr(0x10)),
        Instr::Write(Addr(0x20)),
    ];
    let sim = run(cfg(), quad([&t0, &[], &[], &[]]));

    let s = sim.caches[0].stats;
    assert_eq!(s.evictions, 1);
    assert_eq!(s.writebacks, 1);
    assert_eq!(sim.caches[0].state_of(Addr(0x00)), MesiState::Invalid);
    assert_eq!(sim.caches[0].state_of(Addr(0x20)), MesiState::Modified);
    // 101 + 101 + (101 + 100 writeback penalty)
    assert_eq!(sim.cores[0].active_cycles, 403);
    assert_eq!(sim.cores[0].idle_cycles, 0);
}

#[test]
fn bus_contention_serializes_and_charges_idle_time() {
    let shared = Addr(0xDEAD0000);
    let t0 = [Instr::Read(shared)];
    let t1 = [Instr::Read(shared)];
    let sim = run(cfg(), quad([&t0, &t1, &[], &[]]));

    // arbitration picks the lower id; core 1 waits out the memory fetch
    assert_eq!(sim.cores[0].active_cycles, 101);
    assert_eq!(sim.cores[0].idle_cycles, 0);
    assert_eq!(sim.cores[0].finish_cycle, 101);
    assert_eq!(sim.cores[1].active_cycles, 3);
    assert_eq!(sim.cores[1].idle_cycles, 100);
    assert_eq!(sim.cores[1].finish_cycle, 103);
}

#[test]
fn repeated_reads_cost_one_bus_transaction_and_one_cycle_each() {
    let t0 = [Instr::Read(Addr(0)); 5];
    let sim = run(cfg(), quad([&t0, &[], &[], &[]]));

    assert_eq!(sim.bus.transactions, 1);
    assert_eq!(sim.cores[0].active_cycles, 101 + 4);
    assert_eq!(sim.cores[0].idle_cycles, 0);
    assert_eq!(sim.caches[0].stats.hits, 4);
}

#[test]
fn disjoint_working_sets_never_invalidate() {
    // different blocks, and the read hit on core 0 resolves while core 1
    // still holds the bus for its own fetch
    let t0 = [Instr::Read(Addr(0x00)), Instr::Read(Addr(0x00))];
    let t1 = [Instr::Read(Addr(0x40)), Instr::Read(Addr(0x40))];
    let sim = run(cfg(), quad([&t0, &t1, &[], &[]]));

    assert_eq!(sim.invalidations, 0);
    for cache in &sim.caches {
        assert_eq!(cache.stats.writebacks, 0);
    }
    // 100 per compulsory miss + 1 per reference
    assert_eq!(sim.cores[0].active_cycles, 102);
    assert_eq!(sim.cores[1].active_cycles, 102);
    // core 0's second read is a local hit in the shadow of core 1's fetch
    assert_eq!(sim.cores[0].finish_cycle, 102);
}

#[test]
fn empty_trace_contributes_zeroes() {
    let t1 = [Instr::Read(Addr(0))];
    let sim = run(cfg(), quad([&[], &t1, &[], &[]]));

    let core = &sim.cores[0];
    assert!(core.finished);
    assert_eq!(core.finish_cycle, 0);
    assert_eq!(core.active_cycles, 0);
    assert_eq!(core.idle_cycles, 0);
    assert_eq!(sim.caches[0].stats.reads + sim.caches[0].stats.writes, 0);
    // the other core is unaffected by the idle one
    assert_eq!(sim.cores[1].active_cycles, 101);
}

#[test]
fn single_byte_blocks_still_charge_the_execution_cycle() {
    let cfg = SimConfig::new(1, 2, 0).unwrap();
    let t0 = [Instr::Read(Addr(0))];
    let t1 = [Instr::Read(Addr(0))];
    let sim = run(cfg, quad([&t0, &t1, &[], &[]]));

    // c2c transfer degenerates to 0 cycles, execution still costs 1
    assert_eq!(sim.cores[1].active_cycles, 1);
    assert_eq!(sim.bus.traffic_bytes, 2);
}

#[test]
fn fully_associative_cache_degrades_gracefully() {
    let cfg = SimConfig::new(0, 4, 2).unwrap();
    let t0 = [
        Instr::Read(Addr(0x00)),
        Instr::Read(Addr(0x04)),
        Instr::Read(Addr(0x08)),
        Instr::Read(Addr(0x0C)),
        Instr::Read(Addr(0x10)), // evicts 0x00, the LRU line
        Instr::Read(Addr(0x00)), // misses again, evicts 0x04
    ];
    let sim = run(cfg, quad([&t0, &[], &[], &[]]));

    let s = sim.caches[0].stats;
    assert_eq!(s.misses, 6);
    assert_eq!(s.hits, 0);
    assert_eq!(s.evictions, 2);
    assert_eq!(s.writebacks, 0);
    assert_eq!(sim.caches[0].state_of(Addr(0x04)), MesiState::Invalid);
    assert_eq!(sim.caches[0].state_of(Addr(0x08)), MesiState::Exclusive);
}

#[test]
fn identical_runs_produce_identical_reports() {
    let shared = Addr(0xDEAD0000);
    let t0 = [Instr::Read(shared), Instr::Write(shared), Instr::Read(Addr(0x10))];
    let t1 = [Instr::Read(shared), Instr::Read(shared)];
    let t2 = [Instr::Write(Addr(0x20)), Instr::Read(shared)];
    let t3 = [Instr::Write(shared)];

    let render = || {
        let sim = run(cfg(), quad([&t0, &t1, &t2, &t3]));
        let mut buf = Vec::new();
        cachesim_mesi::report::write_report(
            &mut buf,
            "app",
            &sim.cfg,
            &sim.cores,
            &sim.caches,
            &sim.bus,
        )
        .unwrap();
        String::from_utf8(buf).unwrap()
    };

    assert_eq!(render(), render());
}

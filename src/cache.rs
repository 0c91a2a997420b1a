use std::fmt;

use log::debug;

use crate::bus::BusSignal;
use crate::commons::{timing, Addr, MemOp, SimConfig};

// cache lines and sets

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum MesiState {
    #[default]
    Invalid,
    Shared,
    Exclusive,
    Modified,
}

impl fmt::Display for MesiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MesiState::Invalid => write!(f, "I"),
            MesiState::Shared => write!(f, "S"),
            MesiState::Exclusive => write!(f, "E"),
            MesiState::Modified => write!(f, "M"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CacheLine {
    pub valid: bool,
    pub tag: u32,
    pub state: MesiState,
    pub lru_stamp: u64,
}

#[derive(Clone, Debug)]
pub struct CacheSet {
    lines: Vec<CacheLine>,
}

impl CacheSet {
    fn new(assoc: u32) -> Self {
        CacheSet {
            lines: vec![CacheLine::default(); assoc as usize],
        }
    }

    pub fn find(&self, tag: u32) -> Option<usize> {
        self.lines.iter().position(|l| l.valid && l.tag == tag)
    }

    /// lowest invalid index, else the line with the smallest stamp
    pub fn pick_victim(&self) -> usize {
        if let Some(i) = self.lines.iter().position(|l| !l.valid) {
            return i;
        }
        self.lines
            .iter()
            .enumerate()
            .min_by_key(|(_, l)| l.lru_stamp)
            .map(|(i, _)| i)
            .expect("a cache set is never empty")
    }

    pub fn touch(&mut self, index: usize, stamp: u64) {
        self.lines[index].lru_stamp = stamp;
    }

    pub fn line(&self, index: usize) -> &CacheLine {
        &self.lines[index]
    }
}

// statistics

#[derive(Clone, Copy, Debug, Default)]
pub struct CacheStats {
    pub reads: u64,
    pub writes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub writebacks: u64,
    /// own lines invalidated by another core's bus transaction
    pub invalidations: u64,
    /// bytes moved by transactions this core issued
    pub traffic_bytes: u64,
}

// request and snoop results

#[derive(Clone, Copy, Debug)]
pub struct RequestOutcome {
    pub hit: bool,
    pub exec_cycles: u64,
    pub bus: Option<BusSignal>,
    pub bytes: u64,
    pub invalidations: u64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SnoopOutcome {
    pub supplied: bool,
    pub cycles: u64,
    pub bytes: u64,
    pub invalidated: bool,
}

// per-core cache

pub struct Cache {
    pub core_id: u32,
    cfg: SimConfig,
    sets: Vec<CacheSet>,
    stamp: u64,
    pub stats: CacheStats,
}

impl Cache {
    pub fn new(core_id: u32, cfg: SimConfig) -> Self {
        Cache {
            core_id,
            cfg,
            sets: (0..cfg.num_sets()).map(|_| CacheSet::new(cfg.assoc)).collect(),
            stamp: 0,
            stats: CacheStats::default(),
        }
    }

    // helper functions

    pub fn state_of(&self, addr: Addr) -> MesiState {
        let (index, tag) = addr.pos(&self.cfg);
        let set = &self.sets[index as usize];
        set.find(tag)
            .map(|i| set.line(i).state)
            .unwrap_or(MesiState::Invalid)
    }

    /// whether the pending request has to go through bus arbitration;
    /// read hits and write hits on M/E resolve locally
    pub fn needs_bus(&self, op: MemOp, addr: Addr) -> bool {
        match (self.state_of(addr), op) {
            (MesiState::Invalid, _) => true,
            (MesiState::Shared, MemOp::Write) => true,
            _ => false,
        }
    }

    fn next_stamp(&mut self) -> u64 {
        self.stamp += 1;
        self.stamp
    }

    fn block_bytes(&self) -> u64 {
        u64::from(self.cfg.block_size())
    }

    fn invalidate_line(&mut self, index: usize, line_idx: usize) {
        let line = &mut self.sets[index].lines[line_idx];
        line.valid = false;
        line.state = MesiState::Invalid;
        self.stats.invalidations += 1;
    }

    // core requests

    pub fn process_request(
        &mut self,
        op: MemOp,
        addr: Addr,
        peers: &mut [&mut Cache],
    ) -> RequestOutcome {
        match op {
            MemOp::Read => self.stats.reads += 1,
            MemOp::Write => self.stats.writes += 1,
        }
        let (index, tag) = addr.pos(&self.cfg);
        match self.sets[index as usize].find(tag) {
            Some(line_idx) => self.hit(op, addr, index as usize, line_idx, peers),
            None => self.miss(op, addr, index as usize, tag, peers),
        }
    }

    fn hit(
        &mut self,
        op: MemOp,
        addr: Addr,
        index: usize,
        line_idx: usize,
        peers: &mut [&mut Cache],
    ) -> RequestOutcome {
        self.stats.hits += 1;
        let stamp = self.next_stamp();
        self.sets[index].touch(line_idx, stamp);

        let local = RequestOutcome {
            hit: true,
            exec_cycles: timing::EXEC,
            bus: None,
            bytes: 0,
            invalidations: 0,
        };
        match (op, self.sets[index].line(line_idx).state) {
            (MemOp::Read, _) => local,
            (MemOp::Write, MesiState::Modified) => local,
            (MemOp::Write, MesiState::Exclusive) => {
                // silent upgrade
                self.sets[index].lines[line_idx].state = MesiState::Modified;
                local
            }
            (MemOp::Write, MesiState::Shared) => {
                // transfer-free upgrade; every other holder drops its copy
                let sig = BusSignal::BusUpgr(addr);
                let mut bytes = 0;
                let mut invalidations = 0;
                for peer in peers.iter_mut() {
                    let resp = peer.snoop(&sig);
                    bytes += resp.bytes;
                    invalidations += u64::from(resp.invalidated);
                }
                self.sets[index].lines[line_idx].state = MesiState::Modified;
                self.stats.traffic_bytes += bytes;
                RequestOutcome {
                    hit: true,
                    exec_cycles: timing::EXEC,
                    bus: Some(sig),
                    bytes,
                    invalidations,
                }
            }
            (_, MesiState::Invalid) => unreachable!("hit on an invalid line"),
        }
    }

    fn miss(
        &mut self,
        op: MemOp,
        addr: Addr,
        index: usize,
        tag: u32,
        peers: &mut [&mut Cache],
    ) -> RequestOutcome {
        self.stats.misses += 1;

        let sig = match op {
            MemOp::Read => BusSignal::BusRd(addr),
            MemOp::Write => BusSignal::BusRdX(addr),
        };
        let mut supplied = false;
        let mut snoop_cycles = 0;
        let mut bytes = 0;
        let mut invalidations = 0;
        for peer in peers.iter_mut() {
            let resp = peer.snoop(&sig);
            supplied |= resp.supplied;
            snoop_cycles += resp.cycles;
            bytes += resp.bytes;
            invalidations += u64::from(resp.invalidated);
        }

        let (fetch_cycles, new_state) = match op {
            MemOp::Read if supplied => (timing::c2c_transfer(&self.cfg), MesiState::Shared),
            MemOp::Read => (timing::MEM_FETCH, MesiState::Exclusive),
            MemOp::Write => (timing::MEM_FETCH, MesiState::Modified),
        };
        // the fill itself, from a peer cache or from memory
        bytes += self.block_bytes();

        let (evict_cycles, evict_bytes) = self.allocate(index, tag, new_state, peers);
        bytes += evict_bytes;

        self.stats.traffic_bytes += bytes;
        RequestOutcome {
            hit: false,
            exec_cycles: timing::EXEC + fetch_cycles + snoop_cycles + evict_cycles,
            bus: Some(sig),
            bytes,
            invalidations,
        }
    }

    /// install `tag` in `index`, evicting the LRU victim if the set is full
    fn allocate(
        &mut self,
        index: usize,
        tag: u32,
        state: MesiState,
        peers: &mut [&mut Cache],
    ) -> (u64, u64) {
        let victim_idx = self.sets[index].pick_victim();
        let victim = *self.sets[index].line(victim_idx);
        let mut cycles = 0;
        let mut bytes = 0;
        if victim.valid {
            self.stats.evictions += 1;
            match victim.state {
                MesiState::Modified => {
                    // dirty victim goes back to memory before the fill
                    self.stats.writebacks += 1;
                    cycles += timing::DIRTY_FLUSH;
                    bytes += self.block_bytes();
                    debug!(
                        "core {}: {} for evicted victim tag {:#x} in set {}",
                        self.core_id,
                        BusSignal::BusWb(victim.rebuild_addr(index, &self.cfg)),
                        victim.tag,
                        index
                    );
                }
                MesiState::Shared => self.promote_lone_sharer(index, victim.tag, peers),
                MesiState::Exclusive => {}
                MesiState::Invalid => unreachable!("valid line in Invalid state"),
            }
        }
        let stamp = self.next_stamp();
        self.sets[index].lines[victim_idx] = CacheLine {
            valid: true,
            tag,
            state,
            lru_stamp: stamp,
        };
        (cycles, bytes)
    }

    /// dropping a Shared copy may leave a single sharer behind; that copy
    /// becomes Exclusive so a Shared line always implies company
    fn promote_lone_sharer(&self, index: usize, tag: u32, peers: &mut [&mut Cache]) {
        let mut last: Option<(usize, usize)> = None;
        let mut holders = 0;
        for (p, peer) in peers.iter().enumerate() {
            if let Some(line_idx) = peer.sets[index].find(tag) {
                holders += 1;
                last = Some((p, line_idx));
            }
        }
        if holders == 1 {
            let (p, line_idx) = last.expect("holder recorded");
            let line = &mut peers[p].sets[index].lines[line_idx];
            if line.state == MesiState::Shared {
                line.state = MesiState::Exclusive;
            }
        }
    }

    // snooping

    /// apply another core's bus transaction to this cache
    pub fn snoop(&mut self, sig: &BusSignal) -> SnoopOutcome {
        let (index, tag) = sig.addr().pos(&self.cfg);
        let index = index as usize;
        let Some(line_idx) = self.sets[index].find(tag) else {
            return SnoopOutcome::default();
        };
        let state = self.sets[index].line(line_idx).state;
        match sig {
            BusSignal::BusRd(_) => {
                // supply the block; a Modified holder updates memory as it does
                let mut out = SnoopOutcome {
                    supplied: true,
                    ..SnoopOutcome::default()
                };
                if state == MesiState::Modified {
                    self.stats.writebacks += 1;
                    out.bytes += self.block_bytes();
                }
                self.sets[index].lines[line_idx].state = MesiState::Shared;
                out
            }
            BusSignal::BusRdX(_) => {
                let mut out = SnoopOutcome {
                    // coherence message for the drop
                    bytes: self.block_bytes(),
                    invalidated: true,
                    ..SnoopOutcome::default()
                };
                if state == MesiState::Modified {
                    // dirty copy must reach memory before the requester's fetch
                    self.stats.writebacks += 1;
                    out.cycles += timing::DIRTY_FLUSH;
                    out.bytes += self.block_bytes();
                }
                self.invalidate_line(index, line_idx);
                out
            }
            BusSignal::BusUpgr(_) => {
                match state {
                    MesiState::Shared => {
                        self.invalidate_line(index, line_idx);
                        SnoopOutcome {
                            bytes: self.block_bytes(),
                            invalidated: true,
                            ..SnoopOutcome::default()
                        }
                    }
                    // an upgrade means the requester holds Shared, so nobody
                    // can hold M or E
                    MesiState::Modified | MesiState::Exclusive => panic!(
                        "cache in invalid state: core {} holds {} against a BusUpgr",
                        self.core_id, state
                    ),
                    MesiState::Invalid => unreachable!("found line is valid"),
                }
            }
            BusSignal::BusWb(_) => SnoopOutcome::default(),
        }
    }
}

impl CacheLine {
    fn rebuild_addr(&self, index: usize, cfg: &SimConfig) -> Addr {
        let base = (u64::from(self.tag) << (cfg.block_bits + cfg.set_bits))
            | ((index as u64) << cfg.block_bits);
        Addr(base as u32)
    }
}

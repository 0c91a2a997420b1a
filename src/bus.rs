use std::fmt;

use log::debug;

use crate::commons::Addr;

// the bus signals that caches can observe, as defined by the protocol

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BusSignal {
    BusRd(Addr),
    BusRdX(Addr),
    BusUpgr(Addr),
    BusWb(Addr),
}

impl BusSignal {
    pub fn addr(self) -> Addr {
        match self {
            BusSignal::BusRd(addr)
            | BusSignal::BusRdX(addr)
            | BusSignal::BusUpgr(addr)
            | BusSignal::BusWb(addr) => addr,
        }
    }
}

impl fmt::Display for BusSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusSignal::BusRd(addr) => write!(f, "BusRd {addr}"),
            BusSignal::BusRdX(addr) => write!(f, "BusRdX {addr}"),
            BusSignal::BusUpgr(addr) => write!(f, "BusUpgr {addr}"),
            BusSignal::BusWb(addr) => write!(f, "BusWb {addr}"),
        }
    }
}

/// a transaction admitted onto the bus
#[derive(Clone, Copy, Debug)]
pub struct BusTx {
    pub origin: u32,
    pub sig: BusSignal,
    /// cycles the bus stays held
    pub hold: u64,
}

// central snooping bus: one transaction in flight at a time

#[derive(Debug, Default)]
pub struct Bus {
    owner: Option<BusTx>,
    free_at: u64,
    pub transactions: u64,
    pub traffic_bytes: u64,
}

impl Bus {
    pub fn new() -> Self {
        Bus::default()
    }

    /// logically free once the in-flight transaction has drained
    pub fn is_free(&self, at_cycle: u64) -> bool {
        match self.owner {
            None => true,
            Some(_) => at_cycle >= self.free_at,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.owner.is_some()
    }

    pub fn free_at(&self) -> u64 {
        self.free_at
    }

    pub fn acquire(&mut self, tx: BusTx, free_at: u64) {
        debug_assert!(self.owner.is_none(), "bus acquired while owned");
        debug!(
            "bus: core {} acquired for {} ({} cycles, free at {})",
            tx.origin, tx.sig, tx.hold, free_at
        );
        self.owner = Some(tx);
        self.free_at = free_at;
        self.transactions += 1;
    }

    pub fn release(&mut self) -> Option<BusTx> {
        let tx = self.owner.take();
        if let Some(tx) = &tx {
            debug!("bus: released by core {}", tx.origin);
        }
        tx
    }

    pub fn add_traffic(&mut self, bytes: u64) {
        self.traffic_bytes += bytes;
    }
}

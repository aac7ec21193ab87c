//! Test harness: several engines over one in-memory hub with
//! deterministic, explicit packet delivery.

use std::collections::HashMap;
use std::sync::Arc;
use veilmesh_core::{
    Config, MemoryHub, MemoryTransport, MeshAddress, MeshCrypto, SqliteBlobStore, SqliteItemStore,
    Transport,
};
use veilmesh_mesh::MeshEngine;

/// Chunk size used by test nodes so modest payloads span many chunks.
pub const TEST_CHUNK_SIZE: usize = 1024;

/// A set of nodes wired through one hub, with a manual clock.
pub struct TestNet {
    pub hub: MemoryHub,
    pub now: u64,
    engines: HashMap<MeshAddress, MeshEngine>,
    transports: HashMap<MeshAddress, MemoryTransport>,
    /// Addresses whose outbound and inbound traffic is discarded.
    dead: Vec<MeshAddress>,
}

impl TestNet {
    pub fn new() -> Self {
        Self {
            hub: MemoryHub::new(),
            now: 1_000_000,
            engines: HashMap::new(),
            transports: HashMap::new(),
            dead: Vec::new(),
        }
    }

    /// Spin up a loaded node and return its address.
    pub fn add_node(&mut self, label: &str) -> MeshAddress {
        let transport = self.hub.register(label);
        let address = MeshAddress(format!("mem-{label}"));

        let mut config = Config::default_config();
        config.transfer.chunk_size = TEST_CHUNK_SIZE;

        let mut engine = MeshEngine::new(
            config,
            label.to_string(),
            Arc::new(MeshCrypto::generate()),
            Arc::new(transport.clone()),
            Box::new(SqliteItemStore::in_memory().unwrap()),
            Box::new(SqliteBlobStore::in_memory().unwrap()),
        );
        engine.seed_rng(label.bytes().map(u64::from).sum());
        engine.load(self.now).unwrap();

        self.transports.insert(address.clone(), transport);
        self.engines.insert(address.clone(), engine);
        address
    }

    pub fn engine(&mut self, address: &MeshAddress) -> &mut MeshEngine {
        self.engines.get_mut(address).expect("node exists")
    }

    pub fn engine_ref(&self, address: &MeshAddress) -> &MeshEngine {
        self.engines.get(address).expect("node exists")
    }

    /// Grant mutual trust between two addresses (contacts added on both
    /// sides, the way manual contact exchange works).
    pub fn trust_both(&mut self, a: &MeshAddress, b: &MeshAddress) {
        let now = self.now;
        self.engine(a).add_contact(b.clone(), String::new(), now);
        self.engine(b).add_contact(a.clone(), String::new(), now);
    }

    /// Take a node off the network: sends to it fail, its queued
    /// traffic is discarded.
    pub fn kill(&mut self, address: &MeshAddress) {
        self.hub.disconnect(address);
        self.dead.push(address.clone());
    }

    /// Advance the manual clock.
    pub fn advance(&mut self, ms: u64) {
        self.now += ms;
    }

    /// Discard everything a node has queued for sending.
    pub fn drop_outbox(&mut self, address: &MeshAddress) {
        self.engine(address).drain_outbox();
    }

    /// One delivery round: flush every outbox onto the hub, then hand
    /// every mailbox to its engine. Returns how many packets moved.
    pub fn pump_round(&mut self) -> usize {
        let mut moved = 0;
        let addresses: Vec<MeshAddress> = self.engines.keys().cloned().collect();

        for address in &addresses {
            let departures = self.engines.get_mut(address).unwrap().drain_outbox();
            if self.dead.contains(address) {
                continue;
            }
            let transport = self.transports.get(address).unwrap().clone();
            for departure in departures {
                let bytes = departure.packet.to_bytes().unwrap();
                if transport.send(&departure.target, &bytes) {
                    moved += 1;
                }
            }
        }

        for address in &addresses {
            if self.dead.contains(address) {
                continue;
            }
            let deliveries = self.hub.drain(address);
            moved += deliveries.len();
            let now = self.now;
            let engine = self.engines.get_mut(address).unwrap();
            for (sender, bytes) in deliveries {
                engine.handle_raw(&bytes, sender, now);
            }
        }
        moved
    }

    /// Pump rounds until the network goes quiet (bounded).
    pub fn pump(&mut self) {
        for _ in 0..256 {
            if self.pump_round() == 0 && self.hub.is_idle() {
                break;
            }
        }
    }

    /// Run a bounded number of rounds (partial delivery).
    pub fn pump_rounds(&mut self, rounds: usize) {
        for _ in 0..rounds {
            self.pump_round();
        }
    }
}

impl Default for TestNet {
    fn default() -> Self {
        Self::new()
    }
}

//! Per-content transfer session: chunk bookkeeping and AIMD pacing.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use veilmesh_core::{ContentId, MeshAddress};
use veilmesh_domain::MediaMeta;

/// Congestion window floor and starting value.
pub const WINDOW_START: f64 = 1.0;

/// Congestion window ceiling: never more concurrent chunk requests.
pub const WINDOW_MAX: f64 = 6.0;

/// Additive increase applied per fast chunk response.
pub const WINDOW_STEP: f64 = 0.1;

/// A response faster than this counts as a fast round trip (ms).
pub const FAST_RTT_MS: u64 = 2_000;

/// Floor of the dynamic per-chunk timeout (ms).
pub const BASE_CHUNK_TIMEOUT_MS: u64 = 60_000;

/// The dynamic timeout is this multiple of the average RTT.
pub const TIMEOUT_RTT_FACTOR: u64 = 4;

/// Retries on a single chunk before the session escalates to recovery.
pub const MAX_CHUNK_RETRIES: u32 = 10;

/// A recovering session with no viable source after this long fails (ms).
pub const RECOVERY_TIMEOUT_MS: u64 = 10 * 60 * 1000;

/// Bounded RTT sample window.
const RTT_SAMPLE_WINDOW: usize = 16;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Actively requesting chunks from a source
    Active,
    /// Source lost; waiting for mesh recovery to offer a new one
    Recovering,
    /// Held by the caller; no requests issued
    Paused,
    /// All chunks received and assembled
    Completed,
    /// Terminal failure
    Error,
}

/// A party waiting on the session's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listener {
    /// Local caller identified by a ticket the engine resolves.
    Local(u64),
    /// Remote requester we are proxying for; gets a recovery-found offer
    /// once the bytes are held locally.
    RelayServe { requester: MeshAddress },
}

/// What a maintenance tick did to one session.
#[derive(Debug, Default)]
pub struct SessionTick {
    /// Chunk indices returned to the pending queue.
    pub requeued: usize,
    /// Session just escalated to Recovering.
    pub escalated: bool,
    /// Recovering session exceeded its total recovery window.
    pub expired: bool,
}

/// Chunk-level state for one in-progress media download.
#[derive(Debug)]
pub struct TransferSession {
    pub content_id: ContentId,
    pub meta: MediaMeta,
    pub source: Option<MeshAddress>,
    pub status: SessionStatus,
    pub listeners: Vec<Listener>,
    /// Session started for proxy duty: chunk responses from the
    /// (untrusted) origin are acceptable.
    pub allow_untrusted: bool,
    chunk_size: usize,
    total_chunks: u32,
    received: Vec<Option<Vec<u8>>>,
    in_flight: HashMap<u32, u64>,
    retries: Vec<u32>,
    pending: VecDeque<u32>,
    window: f64,
    rtt_samples: VecDeque<u64>,
    recovering_since: Option<u64>,
}

impl TransferSession {
    /// Create a session covering every chunk of the described object.
    pub fn new(
        meta: MediaMeta,
        source: Option<MeshAddress>,
        chunk_size: usize,
        status: SessionStatus,
        now: u64,
    ) -> Self {
        let total_chunks = ((meta.size_bytes as usize + chunk_size - 1) / chunk_size).max(1) as u32;
        Self {
            content_id: meta.id.clone(),
            meta,
            source,
            status,
            listeners: Vec::new(),
            allow_untrusted: false,
            chunk_size,
            total_chunks,
            received: vec![None; total_chunks as usize],
            in_flight: HashMap::new(),
            retries: vec![0; total_chunks as usize],
            pending: (0..total_chunks).collect(),
            window: WINDOW_START,
            rtt_samples: VecDeque::new(),
            recovering_since: if status == SessionStatus::Recovering {
                Some(now)
            } else {
                None
            },
        }
    }

    /// Fixed chunk size for this session.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Total number of chunks.
    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    /// Current congestion window (for assertions and status reports).
    pub fn window(&self) -> f64 {
        self.window
    }

    /// Fraction of chunks received, in [0, 1].
    pub fn progress(&self) -> f32 {
        let have = self.received.iter().filter(|c| c.is_some()).count();
        have as f32 / self.total_chunks as f32
    }

    /// Pull the next chunk indices to request, bounded by the window.
    /// The returned indices are marked in flight as of `now`.
    pub fn next_requests(&mut self, now: u64) -> Vec<u32> {
        let mut requests = Vec::new();
        if self.status != SessionStatus::Active {
            return requests;
        }
        while self.in_flight.len() < self.window as usize {
            let Some(index) = self.pending.pop_front() else {
                break;
            };
            self.in_flight.insert(index, now);
            requests.push(index);
        }
        requests
    }

    /// Record a received chunk. Returns true when the chunk was new.
    pub fn record_chunk(&mut self, index: u32, bytes: Vec<u8>, now: u64) -> bool {
        if index >= self.total_chunks {
            return false;
        }
        if self.received[index as usize].is_some() {
            self.in_flight.remove(&index);
            return false;
        }

        if let Some(sent_at) = self.in_flight.remove(&index) {
            let rtt = now.saturating_sub(sent_at);
            self.rtt_samples.push_back(rtt);
            if self.rtt_samples.len() > RTT_SAMPLE_WINDOW {
                self.rtt_samples.pop_front();
            }
            // Additive increase under fast responses, capped
            if rtt < FAST_RTT_MS && self.window < WINDOW_MAX {
                self.window = (self.window + WINDOW_STEP).min(WINDOW_MAX);
            }
        }

        self.received[index as usize] = Some(bytes);
        true
    }

    /// Average observed round trip, if any samples exist.
    pub fn avg_rtt_ms(&self) -> Option<u64> {
        if self.rtt_samples.is_empty() {
            return None;
        }
        Some(self.rtt_samples.iter().sum::<u64>() / self.rtt_samples.len() as u64)
    }

    /// Dynamic per-chunk timeout: max(60 s, 4 × average RTT).
    pub fn timeout_ms(&self) -> u64 {
        match self.avg_rtt_ms() {
            Some(avg) => BASE_CHUNK_TIMEOUT_MS.max(TIMEOUT_RTT_FACTOR * avg),
            None => BASE_CHUNK_TIMEOUT_MS,
        }
    }

    /// Maintenance pass: requeue stale in-flight requests, collapse the
    /// window on any timeout, escalate after too many retries on one
    /// chunk, and expire a recovery that ran out its window.
    pub fn tick(&mut self, now: u64) -> SessionTick {
        let mut outcome = SessionTick::default();

        match self.status {
            SessionStatus::Recovering => {
                if let Some(since) = self.recovering_since {
                    if now.saturating_sub(since) >= RECOVERY_TIMEOUT_MS {
                        self.status = SessionStatus::Error;
                        outcome.expired = true;
                    }
                }
            }
            SessionStatus::Active => {
                let timeout = self.timeout_ms();
                let stale: Vec<u32> = self
                    .in_flight
                    .iter()
                    .filter(|(_, sent_at)| now.saturating_sub(**sent_at) >= timeout)
                    .map(|(index, _)| *index)
                    .collect();

                for index in stale {
                    self.in_flight.remove(&index);
                    self.retries[index as usize] += 1;
                    outcome.requeued += 1;

                    if self.retries[index as usize] >= MAX_CHUNK_RETRIES {
                        self.enter_recovery(now);
                        outcome.escalated = true;
                        return outcome;
                    }
                    self.pending.push_back(index);
                }

                // Multiplicative decrease: one timeout sheds all optimism
                if outcome.requeued > 0 {
                    self.window = WINDOW_START;
                }
            }
            _ => {}
        }

        outcome
    }

    /// Drop the current source and wait for the mesh to offer another.
    pub fn enter_recovery(&mut self, now: u64) {
        self.status = SessionStatus::Recovering;
        self.recovering_since = Some(now);
        self.window = WINDOW_START;
        // In-flight requests are abandoned; their answers, if any, are
        // still accepted by record_chunk
        for (index, _) in self.in_flight.drain() {
            self.pending.push_back(index);
        }
    }

    /// Resume against a freshly discovered source.
    pub fn resume_with_source(&mut self, source: MeshAddress, now: u64) {
        self.source = Some(source);
        self.status = SessionStatus::Active;
        self.recovering_since = None;
        self.window = WINDOW_START;
        self.in_flight.clear();
        self.pending = (0..self.total_chunks)
            .filter(|i| self.received[*i as usize].is_none())
            .collect();
        for r in self.retries.iter_mut() {
            *r = 0;
        }
        let _ = now;
    }

    /// Whether every chunk has arrived.
    pub fn is_complete(&self) -> bool {
        self.received.iter().all(|c| c.is_some())
    }

    /// Concatenate the received chunks. Call only when complete.
    pub fn assemble(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.meta.size_bytes as usize);
        for chunk in self.received.iter().flatten() {
            bytes.extend_from_slice(chunk);
        }
        bytes
    }
}

//! Transfer manager: at most one session per content id.
//!
//! The manager owns every live [`TransferSession`] and turns protocol
//! stimuli (download requests, chunk responses, maintenance ticks,
//! recovery offers) into [`TransferEvent`]s for the engine to execute.
//! It performs no I/O itself.

use crate::session::{Listener, SessionStatus, TransferSession};
use std::collections::HashMap;
use tracing::debug;
use veilmesh_core::{ContentId, MeshAddress};
use veilmesh_domain::MediaMeta;

/// A chunk request the engine should put on the wire.
///
/// Carries the session's fixed chunk size so the serving peer slices the
/// object exactly as the session expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRequest {
    pub target: MeshAddress,
    pub content_id: ContentId,
    pub index: u32,
    pub chunk_size: u32,
    pub access_key: String,
}

/// Outcome of starting a download.
#[derive(Debug)]
pub enum DownloadStart {
    /// A session already existed; the caller was attached as a listener.
    Attached,
    /// New session, actively requesting from a source.
    Started { requests: Vec<ChunkRequest> },
    /// New session with no acceptable source: recovery starts now.
    Recovering,
}

/// Side effects the engine must carry out after a manager call.
#[derive(Debug)]
pub enum TransferEvent {
    /// Send a chunk request.
    Request(ChunkRequest),
    /// A session finished; bytes are assembled, listeners must be told.
    Completed {
        content_id: ContentId,
        meta: MediaMeta,
        bytes: Vec<u8>,
        listeners: Vec<Listener>,
    },
    /// A session failed terminally.
    Failed {
        content_id: ContentId,
        reason: String,
        listeners: Vec<Listener>,
    },
    /// A session escalated: flood a relay request through the mesh.
    RecoveryNeeded {
        content_id: ContentId,
        meta: MediaMeta,
        /// The source that stopped answering, excluded from the flood
        /// but offered as an origin hint for peers with a better route.
        dead_source: Option<MeshAddress>,
    },
}

/// Chunk-level scheduler for every in-progress media download.
#[derive(Debug, Default)]
pub struct TransferManager {
    sessions: HashMap<ContentId, TransferSession>,
}

impl TransferManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or join) a download.
    ///
    /// Trust policy: a trusted source starts active; `allow_untrusted`
    /// (proxy duty) starts active regardless; anything else refuses the
    /// direct connection and starts in recovery, so the content can only
    /// arrive through trusted relays.
    pub fn begin(
        &mut self,
        meta: MediaMeta,
        source: Option<MeshAddress>,
        source_trusted: bool,
        allow_untrusted: bool,
        listener: Listener,
        chunk_size: usize,
        now: u64,
    ) -> DownloadStart {
        if let Some(session) = self.sessions.get_mut(&meta.id) {
            if !session.listeners.contains(&listener) {
                session.listeners.push(listener);
            }
            return DownloadStart::Attached;
        }

        let direct_ok = source.is_some() && (source_trusted || allow_untrusted);
        let status = if direct_ok {
            SessionStatus::Active
        } else {
            SessionStatus::Recovering
        };

        let mut session = TransferSession::new(meta.clone(), source, chunk_size, status, now);
        session.allow_untrusted = allow_untrusted;
        session.listeners.push(listener);

        if direct_ok {
            let requests = Self::issue_requests(&mut session, now);
            self.sessions.insert(meta.id.clone(), session);
            DownloadStart::Started { requests }
        } else {
            debug!(content = %meta.id, "no trusted source, starting in recovery");
            self.sessions.insert(meta.id.clone(), session);
            DownloadStart::Recovering
        }
    }

    /// Handle a chunk response from the wire.
    ///
    /// Responses are only accepted from the session's current source;
    /// anything else is discarded before touching session state.
    pub fn on_chunk(
        &mut self,
        content_id: &ContentId,
        index: u32,
        bytes: Vec<u8>,
        from: &MeshAddress,
        now: u64,
    ) -> Vec<TransferEvent> {
        let Some(session) = self.sessions.get_mut(content_id) else {
            return Vec::new();
        };
        if session.source.as_ref() != Some(from) {
            debug!(content = %content_id, from = %from.short(), "chunk from non-source dropped");
            return Vec::new();
        }

        session.record_chunk(index, bytes, now);

        if !session.is_complete() {
            return Self::issue_requests(session, now)
                .into_iter()
                .map(TransferEvent::Request)
                .collect();
        }

        let session = self.sessions.remove(content_id).expect("session exists");
        vec![TransferEvent::Completed {
            content_id: content_id.clone(),
            meta: session.meta.clone(),
            bytes: session.assemble(),
            listeners: session.listeners,
        }]
    }

    /// Maintenance tick across every session (1 s period).
    pub fn tick(&mut self, now: u64) -> Vec<TransferEvent> {
        let mut events = Vec::new();
        let ids: Vec<ContentId> = self.sessions.keys().cloned().collect();

        for id in ids {
            let session = self.sessions.get_mut(&id).expect("session exists");
            let outcome = session.tick(now);

            if outcome.expired {
                let session = self.sessions.remove(&id).expect("session exists");
                events.push(TransferEvent::Failed {
                    content_id: id,
                    reason: "recovery window elapsed with no viable source".to_string(),
                    listeners: session.listeners,
                });
                continue;
            }

            if outcome.escalated {
                events.push(TransferEvent::RecoveryNeeded {
                    content_id: id.clone(),
                    meta: session.meta.clone(),
                    dead_source: session.source.clone(),
                });
                continue;
            }

            if outcome.requeued > 0 {
                for request in Self::issue_requests(session, now) {
                    events.push(TransferEvent::Request(request));
                }
            }
        }
        events
    }

    /// A recovery offer arrived: resume the session against the new source.
    pub fn on_source_found(
        &mut self,
        content_id: &ContentId,
        source: MeshAddress,
        now: u64,
    ) -> Vec<TransferEvent> {
        let Some(session) = self.sessions.get_mut(content_id) else {
            return Vec::new();
        };
        if session.status != SessionStatus::Recovering {
            return Vec::new();
        }
        session.resume_with_source(source.clone(), now);

        Self::issue_requests(session, now)
            .into_iter()
            .map(TransferEvent::Request)
            .collect()
    }

    /// Attach a listener to an existing session.
    pub fn attach(&mut self, content_id: &ContentId, listener: Listener) -> bool {
        match self.sessions.get_mut(content_id) {
            Some(session) => {
                if !session.listeners.contains(&listener) {
                    session.listeners.push(listener);
                }
                true
            }
            None => false,
        }
    }

    /// Remove a listener; a listener-less session dies by recovery timeout.
    pub fn detach(&mut self, content_id: &ContentId, listener: &Listener) {
        if let Some(session) = self.sessions.get_mut(content_id) {
            session.listeners.retain(|l| l != listener);
        }
    }

    /// Whether a session exists for the content id.
    pub fn has_session(&self, content_id: &ContentId) -> bool {
        self.sessions.contains_key(content_id)
    }

    /// Progress of a session, if one exists.
    pub fn progress(&self, content_id: &ContentId) -> Option<f32> {
        self.sessions.get(content_id).map(|s| s.progress())
    }

    /// Average observed round trip for a session's source.
    pub fn avg_rtt(&self, content_id: &ContentId) -> Option<u64> {
        self.sessions.get(content_id).and_then(|s| s.avg_rtt_ms())
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn issue_requests(session: &mut TransferSession, now: u64) -> Vec<ChunkRequest> {
        let Some(target) = session.source.clone() else {
            return Vec::new();
        };
        let access_key = session.meta.access_key.clone();
        let content_id = session.content_id.clone();
        let chunk_size = session.chunk_size() as u32;
        session
            .next_requests(now)
            .into_iter()
            .map(|index| ChunkRequest {
                target: target.clone(),
                content_id: content_id.clone(),
                index,
                chunk_size,
                access_key: access_key.clone(),
            })
            .collect()
    }
}

//! # Call Session State
//!
//! Per-call-leg state and the registry of live calls. One `CallSession`
//! exists per bridge instance, so "one instance = one call leg" holds by
//! construction instead of by convention.
//!
//! ## Session Lifecycle:
//! 1. **Idle**: connection accepted, no transmitter running
//! 2. **Running**: bridge started, transmitter draining the output queue
//! 3. back to **Idle** on stop or transport closure
//!
//! The stream SID has a single writer (the inbound dispatcher, on a start
//! event); everything else only reads it to address outgoing frames.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde_json::json;

/// Lifecycle state of one call leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No transmitter running.
    Idle,
    /// Transmitter spawned, relay active.
    Running,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Running => "running",
        }
    }
}

/// Counters for one call leg.
#[derive(Debug, Default, Clone)]
pub struct CallStats {
    /// Inbound media frames delivered to the input callback
    pub frames_in: u64,
    /// Raw bytes delivered to the input callback
    pub bytes_in: u64,
    /// Media frames handed to the transport
    pub frames_out: u64,
    /// Barge-in interrupts served
    pub interrupts: u64,
    /// Chunks discarded by interrupts
    pub chunks_discarded: u64,
}

/// State of a single call leg.
///
/// ## Thread Safety:
/// Shared between the WebSocket actor, the transmitter task, and engine
/// callbacks via `Arc`; interior fields use `RwLock` so readers (outbound
/// frame addressing, HTTP inspection) never serialize behind each other.
pub struct CallSession {
    /// Local identifier for this connection, assigned before any start event
    /// arrives (the stream SID is only known after `start`).
    pub connection_id: String,

    stream_sid: RwLock<Option<String>>,
    state: RwLock<LifecycleState>,
    stats: RwLock<CallStats>,

    pub created_at: DateTime<Utc>,
}

impl CallSession {
    pub fn new(connection_id: String) -> Self {
        Self {
            connection_id,
            stream_sid: RwLock::new(None),
            state: RwLock::new(LifecycleState::Idle),
            stats: RwLock::new(CallStats::default()),
            created_at: Utc::now(),
        }
    }

    /// Bind the stream SID delivered by a start event. Sole writer during
    /// normal operation is the inbound dispatcher.
    pub fn bind_stream(&self, stream_sid: String) {
        *self.stream_sid.write().unwrap() = Some(stream_sid);
    }

    /// Clear the binding on stop or transport closure.
    pub fn clear_stream(&self) {
        *self.stream_sid.write().unwrap() = None;
    }

    /// The currently bound stream SID, if a start event has arrived.
    pub fn stream_sid(&self) -> Option<String> {
        self.stream_sid.read().unwrap().clone()
    }

    /// A session is active once a start event has bound its SID.
    pub fn is_active(&self) -> bool {
        self.stream_sid.read().unwrap().is_some()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read().unwrap()
    }

    pub fn set_state(&self, state: LifecycleState) {
        *self.state.write().unwrap() = state;
    }

    pub fn record_inbound(&self, bytes: usize) {
        let mut stats = self.stats.write().unwrap();
        stats.frames_in += 1;
        stats.bytes_in += bytes as u64;
    }

    pub fn record_outbound(&self) {
        self.stats.write().unwrap().frames_out += 1;
    }

    pub fn record_interrupt(&self, chunks_discarded: usize) {
        let mut stats = self.stats.write().unwrap();
        stats.interrupts += 1;
        stats.chunks_discarded += chunks_discarded as u64;
    }

    pub fn stats(&self) -> CallStats {
        self.stats.read().unwrap().clone()
    }

    /// JSON summary for the call inspection endpoints.
    pub fn summary(&self) -> serde_json::Value {
        let stats = self.stats();
        json!({
            "connection_id": self.connection_id,
            "stream_sid": self.stream_sid(),
            "state": self.state().as_str(),
            "created_at": self.created_at.to_rfc3339(),
            "frames_in": stats.frames_in,
            "bytes_in": stats.bytes_in,
            "frames_out": stats.frames_out,
            "interrupts": stats.interrupts,
            "chunks_discarded": stats.chunks_discarded,
        })
    }
}

/// Registry of live call legs, keyed by connection id.
///
/// ## Resource Management:
/// Enforces the configured concurrent-call ceiling; sessions are registered
/// when the WebSocket upgrades and removed when the actor stops.
pub struct CallRegistry {
    sessions: RwLock<HashMap<String, Arc<CallSession>>>,
    max_concurrent_calls: usize,
}

impl CallRegistry {
    pub fn new(max_concurrent_calls: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_concurrent_calls,
        }
    }

    /// Register a new call leg. Fails when the instance is at capacity.
    pub fn register(&self, session: Arc<CallSession>) -> Result<(), String> {
        let mut sessions = self.sessions.write().unwrap();

        if sessions.len() >= self.max_concurrent_calls {
            return Err(format!(
                "Maximum concurrent calls ({}) reached",
                self.max_concurrent_calls
            ));
        }

        sessions.insert(session.connection_id.clone(), session);
        Ok(())
    }

    pub fn get(&self, connection_id: &str) -> Option<Arc<CallSession>> {
        self.sessions.read().unwrap().get(connection_id).cloned()
    }

    pub fn remove(&self, connection_id: &str) -> bool {
        self.sessions
            .write()
            .unwrap()
            .remove(connection_id)
            .is_some()
    }

    pub fn active_call_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Summaries of every live call, for the HTTP surface.
    pub fn summaries(&self) -> Vec<serde_json::Value> {
        self.sessions
            .read()
            .unwrap()
            .values()
            .map(|session| session.summary())
            .collect()
    }
}

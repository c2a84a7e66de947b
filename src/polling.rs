//! Polling Session Manager
//!
//! At most one live polling task per panel. A session is started when a panel
//! is bound and torn down when the binding is cleared or changed, or when a
//! status fetch fails. Teardown aborts the task; any result it already queued
//! carries the old session id and is discarded by the controller.

use crate::backend::Backend;
use crate::instrument::InstrumentType;
use crate::messages::ControllerEvent;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Public view of a live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollingInfo {
    /// Address being polled
    pub address: String,
    /// Id results of this session carry
    pub session_id: u64,
}

#[derive(Debug)]
struct PollingSession {
    address: String,
    session_id: u64,
    handle: JoinHandle<()>,
}

impl Drop for PollingSession {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Owns the polling task of every panel.
#[derive(Debug)]
pub struct PollingManager {
    sessions: HashMap<InstrumentType, PollingSession>,
    period: Duration,
    next_session_id: u64,
}

impl PollingManager {
    /// Manager polling every `period`.
    pub fn new(period: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            period,
            next_session_id: 0,
        }
    }

    /// Start polling `address` for `panel`, tearing down any existing session
    /// first. Returns the new session id.
    pub fn start(
        &mut self,
        panel: InstrumentType,
        address: &str,
        backend: Arc<dyn Backend>,
        events: mpsc::UnboundedSender<ControllerEvent>,
    ) -> u64 {
        self.stop(panel);

        self.next_session_id += 1;
        let session_id = self.next_session_id;
        let handle = tokio::spawn(poll_loop(
            panel,
            address.to_string(),
            session_id,
            self.period,
            backend,
            events,
        ));
        tracing::debug!(%panel, address, session_id, "Polling started");

        self.sessions.insert(
            panel,
            PollingSession {
                address: address.to_string(),
                session_id,
                handle,
            },
        );
        session_id
    }

    /// Tear down the session of `panel`, if any. Returns whether one existed.
    pub fn stop(&mut self, panel: InstrumentType) -> bool {
        match self.sessions.remove(&panel) {
            Some(session) => {
                tracing::debug!(%panel, address = %session.address, session_id = session.session_id, "Polling stopped");
                true
            }
            None => false,
        }
    }

    /// Tear down the session of `panel` only if it is still `session_id`.
    pub fn finish(&mut self, panel: InstrumentType, session_id: u64) -> bool {
        if self.is_current(panel, session_id) {
            self.stop(panel)
        } else {
            false
        }
    }

    /// Tear down every session.
    pub fn stop_all(&mut self) {
        self.sessions.clear();
    }

    /// True if `session_id` is the live session of `panel`.
    #[must_use]
    pub fn is_current(&self, panel: InstrumentType, session_id: u64) -> bool {
        self.sessions
            .get(&panel)
            .is_some_and(|s| s.session_id == session_id)
    }

    /// Live session of `panel`.
    #[must_use]
    pub fn info(&self, panel: InstrumentType) -> Option<PollingInfo> {
        self.sessions.get(&panel).map(|s| PollingInfo {
            address: s.address.clone(),
            session_id: s.session_id,
        })
    }
}

async fn poll_loop(
    panel: InstrumentType,
    address: String,
    session_id: u64,
    period: Duration,
    backend: Arc<dyn Backend>,
    events: mpsc::UnboundedSender<ControllerEvent>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let outcome = backend.instrument_status(panel, &address).await;
        let terminal = outcome.is_err();
        if events
            .send(ControllerEvent::PollResult {
                panel,
                session_id,
                outcome,
            })
            .is_err()
        {
            break;
        }
        // a failed fetch ends the session; no retry
        if terminal {
            break;
        }
    }
}

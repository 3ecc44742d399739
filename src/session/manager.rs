//! Session lifecycle state machine
//!
//! The manager moves between three named states:
//!
//! ```text
//! NoHandle --acquire/connect--> Healthy
//! Healthy  --acquire/probe ok--> Healthy   (same handle, no side effects)
//! Healthy  --acquire/probe err--> Broken --close--> NoHandle --connect--> Healthy
//! Healthy  --release--> NoHandle
//! ```
//!
//! `Broken` only exists inside `acquire`; callers never observe it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{Connector, SessionRef, SessionUnavailable};

/// Observable lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NoHandle,
    Healthy,
    Broken,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::NoHandle => write!(f, "no_handle"),
            SessionState::Healthy => write!(f, "healthy"),
            SessionState::Broken => write!(f, "broken"),
        }
    }
}

enum HandleState {
    NoHandle,
    Healthy(SessionRef),
    Broken(SessionRef),
}

impl HandleState {
    fn state(&self) -> SessionState {
        match self {
            HandleState::NoHandle => SessionState::NoHandle,
            HandleState::Healthy(_) => SessionState::Healthy,
            HandleState::Broken(_) => SessionState::Broken,
        }
    }
}

/// Snapshot of the manager for status reports
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub endpoint: String,
    /// Successful connects since start
    pub connects: u64,
    /// Connects that replaced a handle whose probe failed
    pub reconnects: u64,
    pub connected_at: Option<DateTime<Utc>>,
}

/// Owns zero or one live session handle
pub struct SessionManager {
    connector: Box<dyn Connector>,
    state: HandleState,
    connects: u64,
    reconnects: u64,
    connected_at: Option<DateTime<Utc>>,
}

impl SessionManager {
    pub fn new(connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            state: HandleState::NoHandle,
            connects: 0,
            reconnects: 0,
            connected_at: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.state()
    }

    pub fn endpoint(&self) -> String {
        self.connector.endpoint()
    }

    /// Return a handle that just passed a probe or was freshly constructed.
    ///
    /// On failure the manager is left in `NoHandle`, so the next call starts
    /// over with a fresh connect.
    pub fn acquire(&mut self) -> Result<SessionRef, SessionUnavailable> {
        let probe = match &self.state {
            HandleState::Healthy(handle) => Some(handle.probe().map(|()| handle.clone())),
            _ => None,
        };

        match probe {
            Some(Ok(handle)) => return Ok(handle),
            Some(Err(err)) => {
                warn!(endpoint = %self.connector.endpoint(), error = %err, "session probe failed, reconnecting");
                self.mark_broken();
            }
            None => {}
        }

        if matches!(self.state, HandleState::Broken(_)) {
            self.discard_current();
            self.reconnects += 1;
        }

        self.construct()
    }

    /// Close the current handle, if any, and return to `NoHandle`
    pub fn release(&mut self) {
        if matches!(self.state, HandleState::NoHandle) {
            return;
        }
        self.discard_current();
        info!(endpoint = %self.connector.endpoint(), "session released");
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state(),
            endpoint: self.connector.endpoint(),
            connects: self.connects,
            reconnects: self.reconnects,
            connected_at: self.connected_at,
        }
    }

    fn mark_broken(&mut self) {
        self.state = match std::mem::replace(&mut self.state, HandleState::NoHandle) {
            HandleState::Healthy(handle) => HandleState::Broken(handle),
            other => other,
        };
    }

    fn discard_current(&mut self) {
        match std::mem::replace(&mut self.state, HandleState::NoHandle) {
            HandleState::Healthy(handle) | HandleState::Broken(handle) => discard(&handle),
            HandleState::NoHandle => {}
        }
        self.connected_at = None;
    }

    fn construct(&mut self) -> Result<SessionRef, SessionUnavailable> {
        let endpoint = self.connector.endpoint();
        match self.connector.connect() {
            Ok(handle) => {
                let handle = SessionRef::new(handle);
                self.state = HandleState::Healthy(handle.clone());
                self.connects += 1;
                self.connected_at = Some(Utc::now());
                info!(endpoint = %endpoint, connects = self.connects, "session connected");
                Ok(handle)
            }
            Err(source) => {
                self.state = HandleState::NoHandle;
                warn!(endpoint = %endpoint, error = %source, "session connect failed");
                Err(SessionUnavailable { endpoint, source })
            }
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.release();
    }
}

/// Best-effort close; the result is intentionally dropped
fn discard(handle: &SessionRef) {
    if let Err(err) = handle.close() {
        debug!(error = %err, "ignoring error while closing session");
    }
}

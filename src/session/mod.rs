//! External automation session management
//!
//! A session is one connection to a stateful automation endpoint. The
//! [`SessionManager`] owns at most one live handle and hands out shared
//! references to it; scripts reach the endpoint through the `srv` binding.
//!
//! Two endpoint implementations are provided:
//! - [`TcpConnector`]: line protocol over TCP
//! - [`InMemoryConnector`]: an in-process endpoint with a tag store

mod manager;
pub mod memory;
pub mod tcp;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use manager::{SessionManager, SessionState, SessionStatus};
pub use memory::InMemoryConnector;
pub use tcp::TcpConnector;

/// Requests understood by an automation endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Hello,
    Ping,
    Get,
    Set,
    Cmd,
    Quit,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Hello => "HELLO",
            Verb::Ping => "PING",
            Verb::Get => "GET",
            Verb::Set => "SET",
            Verb::Cmd => "CMD",
            Verb::Quit => "QUIT",
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("cannot connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("endpoint error: {0}")]
    Remote(String),

    #[error("session is closed")]
    Closed,
}

/// Raised by [`SessionManager::acquire`] when no healthy handle can be produced
#[derive(Error, Debug)]
#[error("session unavailable at {endpoint}: {source}")]
pub struct SessionUnavailable {
    pub endpoint: String,
    pub source: SessionError,
}

/// A live connection to the automation endpoint
pub trait SessionHandle: Send + Sync {
    /// Cheap liveness check; any error means the handle is broken
    fn probe(&self) -> Result<(), SessionError>;

    /// Send one request and return the endpoint's payload
    fn request(&self, verb: Verb, args: &[&str]) -> Result<String, SessionError>;

    /// Close the connection. Callers may always ignore the result.
    fn close(&self) -> Result<(), SessionError>;

    /// Short description used for variable previews; fails once closed
    fn describe(&self) -> Result<String, SessionError>;

    /// Address of the endpoint this handle talks to
    fn endpoint(&self) -> String;
}

/// Constructs connected session handles
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Arc<dyn SessionHandle>, SessionError>;

    /// Human-readable endpoint address for logs and status reports
    fn endpoint(&self) -> String;
}

/// Shared reference to a session handle owned by a [`SessionManager`]
#[derive(Clone)]
pub struct SessionRef(Arc<dyn SessionHandle>);

impl SessionRef {
    pub fn new(handle: Arc<dyn SessionHandle>) -> Self {
        Self(handle)
    }

    /// Whether both references point at the same underlying handle
    pub fn same_handle(&self, other: &SessionRef) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }
}

impl std::ops::Deref for SessionRef {
    type Target = dyn SessionHandle;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl std::fmt::Debug for SessionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.describe() {
            Ok(description) => write!(f, "SessionRef({})", description),
            Err(_) => write!(f, "SessionRef(<closed>)"),
        }
    }
}

/// How long a session handle lives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SessionPolicy {
    /// Keep one handle alive across requests, probing before each reuse
    #[default]
    Persistent,
    /// Connect for each request and release the handle when it finishes
    PerRequest,
}

impl std::fmt::Display for SessionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPolicy::Persistent => write!(f, "persistent"),
            SessionPolicy::PerRequest => write!(f, "per-request"),
        }
    }
}

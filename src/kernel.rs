//! The service instance: one context, at most one session manager
//!
//! Every operation goes through the context lock. Execution requests keep it
//! for their whole window (acquire, bind, evaluate, snapshot), which makes
//! requests run one at a time and keeps the session handle single-user. The
//! manager has its own lock so status reports never wait on a running cell.
//! Lock order is always context, then manager.

use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use tracing::{debug, info};

use crate::context::{Context, ConversionError, EvalStatus, OutputSink, Snapshot};
use crate::engine::Value;
use crate::session::{
    Connector, InMemoryConnector, SessionManager, SessionPolicy, SessionStatus, SessionUnavailable,
    TcpConnector,
};

/// Holds the context for one execution request
///
/// With `release` set, the session is unbound and released when the request
/// ends, including when the cell body unwinds.
struct RequestScope<'a> {
    context: MutexGuard<'a, Context>,
    release: Option<&'a Mutex<SessionManager>>,
}

impl RequestScope<'_> {
    fn finish(&mut self) {
        if let Some(sessions) = self.release.take() {
            self.context.unbind_session();
            sessions.lock().release();
        }
    }
}

impl Drop for RequestScope<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Endpoint value that selects the in-process endpoint instead of TCP
pub const MEMORY_ENDPOINT: &str = "memory";

/// How a kernel reaches its automation endpoint
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// `host:port`, `memory`, or `None` to run without a session
    pub endpoint: Option<String>,
    pub policy: SessionPolicy,
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            policy: SessionPolicy::default(),
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(30),
        }
    }
}

impl KernelConfig {
    fn connector(&self) -> Option<Box<dyn Connector>> {
        let endpoint = self.endpoint.as_deref()?;
        if endpoint == MEMORY_ENDPOINT {
            return Some(Box::new(InMemoryConnector::new()));
        }
        Some(Box::new(
            TcpConnector::new(endpoint)
                .with_connect_timeout(self.connect_timeout)
                .with_io_timeout(self.io_timeout),
        ))
    }
}

/// Captured output of one execution request plus the resulting variables
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub stdout: String,
    pub stderr: String,
    pub variables: Snapshot,
    #[serde(skip)]
    pub status: EvalStatus,
}

pub struct Kernel {
    context: Mutex<Context>,
    sessions: Option<Mutex<SessionManager>>,
    policy: SessionPolicy,
}

impl Kernel {
    pub fn new(config: &KernelConfig) -> Self {
        Self::with_parts(Context::new(), config.connector(), config.policy)
    }

    /// A kernel with no automation session; `srv` is never bound
    pub fn detached() -> Self {
        Self::with_parts(Context::new(), None, SessionPolicy::default())
    }

    pub fn with_parts(context: Context, connector: Option<Box<dyn Connector>>, policy: SessionPolicy) -> Self {
        Self {
            context: Mutex::new(context),
            sessions: connector.map(|c| Mutex::new(SessionManager::new(c))),
            policy,
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    pub fn is_detached(&self) -> bool {
        self.sessions.is_none()
    }

    /// Run one cell
    pub fn run_cell(&self, code: &str) -> Result<RunOutcome, SessionUnavailable> {
        self.execute(|context, sink| context.evaluate(code, sink))
    }

    /// Run cells in order, stopping at the first failure
    pub fn run_cells<S: AsRef<str>>(&self, cells: &[S]) -> Result<RunOutcome, SessionUnavailable> {
        self.execute(|context, sink| context.evaluate_sequence(cells, sink))
    }

    fn execute(
        &self,
        body: impl FnOnce(&mut Context, &mut OutputSink) -> EvalStatus,
    ) -> Result<RunOutcome, SessionUnavailable> {
        let mut scope = RequestScope {
            context: self.context.lock(),
            release: None,
        };

        if let Some(sessions) = &self.sessions {
            match sessions.lock().acquire() {
                Ok(handle) => scope.context.bind_session(handle),
                Err(err) => {
                    scope.context.unbind_session();
                    return Err(err);
                }
            }
            if self.policy == SessionPolicy::PerRequest {
                scope.release = Some(sessions);
            }
        }

        let mut sink = OutputSink::new();
        let status = body(&mut *scope.context, &mut sink);
        scope.finish();

        let variables = scope.context.snapshot();
        let (stdout, stderr) = sink.into_parts();
        debug!(?status, stdout_bytes = stdout.len(), stderr_bytes = stderr.len(), "request finished");

        Ok(RunOutcome {
            stdout,
            stderr,
            variables,
            status,
        })
    }

    pub fn variables(&self) -> Snapshot {
        self.context.lock().snapshot()
    }

    pub fn reset(&self) {
        self.context.lock().reset();
    }

    pub fn delete_variable(&self, name: &str) -> String {
        self.context.lock().delete_binding(name)
    }

    pub fn set_variable(&self, name: &str, raw: &str, kind: &str) -> Result<Value, ConversionError> {
        self.context.lock().set_binding(name, raw, kind)
    }

    /// Manager status, or `None` when detached
    pub fn session_status(&self) -> Option<SessionStatus> {
        self.sessions.as_ref().map(|s| s.lock().status())
    }

    /// Drop the `srv` binding and close the session handle
    pub fn shutdown(&self) {
        let mut context = self.context.lock();
        context.unbind_session();
        if let Some(sessions) = &self.sessions {
            sessions.lock().release();
        }
        info!("kernel shut down");
    }
}

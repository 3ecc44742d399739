//! In-process automation endpoint
//!
//! Behaves like a remote endpoint with a tag store: `GET` reads a tag, `SET`
//! writes one, `CMD` appends to a command log. Tags survive reconnects because
//! they belong to the endpoint, not to a handle. [`InMemoryConnector::sever`]
//! silently breaks every open handle, the way a dropped remote connection
//! would.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Connector, SessionError, SessionHandle, Verb};

#[derive(Default)]
struct Endpoint {
    tags: Mutex<BTreeMap<String, String>>,
    commands: Mutex<Vec<String>>,
    generation: AtomicU64,
    next_id: AtomicU64,
    connects: AtomicU64,
    closes: AtomicU64,
    unreachable: AtomicBool,
}

/// Connector for the in-process endpoint; clones share the same endpoint
#[derive(Clone, Default)]
pub struct InMemoryConnector {
    endpoint: Arc<Endpoint>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Break every currently open handle; their next probe fails
    pub fn sever(&self) {
        self.endpoint.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Make subsequent connects fail (or succeed again)
    pub fn set_unreachable(&self, unreachable: bool) {
        self.endpoint.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn connects(&self) -> u64 {
        self.endpoint.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u64 {
        self.endpoint.closes.load(Ordering::SeqCst)
    }

    pub fn tag(&self, name: &str) -> Option<String> {
        self.endpoint.tags.lock().get(name).cloned()
    }

    pub fn set_tag(&self, name: &str, value: &str) {
        self.endpoint
            .tags
            .lock()
            .insert(name.to_string(), value.to_string());
    }

    /// Commands received through `CMD`, oldest first
    pub fn commands(&self) -> Vec<String> {
        self.endpoint.commands.lock().clone()
    }
}

impl Connector for InMemoryConnector {
    fn connect(&self) -> Result<Arc<dyn SessionHandle>, SessionError> {
        if self.endpoint.unreachable.load(Ordering::SeqCst) {
            return Err(SessionError::Connect {
                endpoint: self.endpoint(),
                source: std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "endpoint is unreachable",
                ),
            });
        }

        self.endpoint.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(InMemorySession {
            id: self.endpoint.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            generation: self.endpoint.generation.load(Ordering::SeqCst),
            endpoint: Arc::clone(&self.endpoint),
            closed: AtomicBool::new(false),
        }))
    }

    fn endpoint(&self) -> String {
        "memory".to_string()
    }
}

struct InMemorySession {
    id: u64,
    generation: u64,
    endpoint: Arc<Endpoint>,
    closed: AtomicBool,
}

impl InMemorySession {
    fn check_open(&self) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        if self.endpoint.generation.load(Ordering::SeqCst) != self.generation {
            return Err(SessionError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by endpoint",
            )));
        }
        Ok(())
    }
}

impl SessionHandle for InMemorySession {
    fn probe(&self) -> Result<(), SessionError> {
        self.check_open()
    }

    fn request(&self, verb: Verb, args: &[&str]) -> Result<String, SessionError> {
        self.check_open()?;

        match verb {
            Verb::Get => {
                let tag = args
                    .first()
                    .ok_or_else(|| SessionError::Protocol("GET needs a tag".to_string()))?;
                self.endpoint
                    .tags
                    .lock()
                    .get(*tag)
                    .cloned()
                    .ok_or_else(|| SessionError::Remote(format!("unknown tag '{}'", tag)))
            }
            Verb::Set => match args {
                [tag, value] => {
                    self.endpoint
                        .tags
                        .lock()
                        .insert(tag.to_string(), value.to_string());
                    Ok(String::new())
                }
                _ => Err(SessionError::Protocol("SET needs a tag and a value".to_string())),
            },
            Verb::Cmd => {
                self.endpoint.commands.lock().push(args.join(" "));
                Ok(String::new())
            }
            Verb::Ping => Ok("PONG".to_string()),
            Verb::Hello | Verb::Quit => Ok(String::new()),
        }
    }

    fn close(&self) -> Result<(), SessionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.endpoint.closes.fetch_add(1, Ordering::SeqCst);

        if self.endpoint.generation.load(Ordering::SeqCst) != self.generation {
            return Err(SessionError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "connection already gone",
            )));
        }
        Ok(())
    }

    fn describe(&self) -> Result<String, SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        Ok(format!("Session(memory#{})", self.id))
    }

    fn endpoint(&self) -> String {
        "memory".to_string()
    }
}

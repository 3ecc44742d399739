//! TCP line-protocol endpoint
//!
//! Each request is one line, `VERB[ arg1[\targ2...]]`, answered by one line:
//! `OK[ payload]` or `ERR message`. A connection starts with `HELLO` and ends
//! with `QUIT`; `PING` is the liveness probe.

use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use super::{Connector, SessionError, SessionHandle, Verb};

/// Longest wait for the reply to `QUIT`
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Connects to an endpoint at `host:port`
#[derive(Debug, Clone)]
pub struct TcpConnector {
    endpoint: String,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl TcpConnector {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    fn open_stream(&self) -> Result<TcpStream, SessionError> {
        let connect_error = |source: std::io::Error| SessionError::Connect {
            endpoint: self.endpoint.clone(),
            source,
        };

        let addr = self
            .endpoint
            .to_socket_addrs()
            .map_err(connect_error)?
            .next()
            .ok_or_else(|| {
                connect_error(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "address did not resolve",
                ))
            })?;

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(connect_error)?;
        stream.set_read_timeout(Some(self.io_timeout))?;
        stream.set_write_timeout(Some(self.io_timeout))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> Result<Arc<dyn SessionHandle>, SessionError> {
        let stream = self.open_stream()?;
        let mut connection = Connection {
            writer: stream.try_clone()?,
            reader: BufReader::new(stream),
            failed: false,
        };

        let greeting = format!("workcell/{}", env!("CARGO_PKG_VERSION"));
        connection.roundtrip(Verb::Hello, &[greeting.as_str()])?;
        debug!(endpoint = %self.endpoint, "handshake complete");

        Ok(Arc::new(TcpSession {
            endpoint: self.endpoint.clone(),
            connection: Mutex::new(Some(connection)),
        }))
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    /// Set once the stream timed out, dropped or fell out of step
    failed: bool,
}

impl Connection {
    fn roundtrip(&mut self, verb: Verb, args: &[&str]) -> Result<String, SessionError> {
        let line = encode_request(verb, args)?;
        let result = self.exchange(&line);
        if matches!(result, Err(SessionError::Io(_) | SessionError::Protocol(_))) {
            self.failed = true;
        }
        result
    }

    fn exchange(&mut self, line: &str) -> Result<String, SessionError> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;

        let mut response = String::new();
        if self.reader.read_line(&mut response)? == 0 {
            return Err(SessionError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "endpoint closed the connection",
            )));
        }
        parse_response(response.trim_end_matches(['\r', '\n']))
    }
}

/// One open connection; the mutex keeps requests from interleaving
struct TcpSession {
    endpoint: String,
    connection: Mutex<Option<Connection>>,
}

impl SessionHandle for TcpSession {
    fn probe(&self) -> Result<(), SessionError> {
        self.request(Verb::Ping, &[]).map(|_| ())
    }

    fn request(&self, verb: Verb, args: &[&str]) -> Result<String, SessionError> {
        let mut guard = self.connection.lock();
        let connection = guard.as_mut().ok_or(SessionError::Closed)?;
        connection.roundtrip(verb, args)
    }

    fn close(&self) -> Result<(), SessionError> {
        let Some(mut connection) = self.connection.lock().take() else {
            return Ok(());
        };
        if connection.failed {
            debug!(endpoint = %self.endpoint, "dropping failed connection without QUIT");
            connection.writer.shutdown(Shutdown::Both)?;
            return Ok(());
        }

        connection.writer.set_read_timeout(Some(CLOSE_TIMEOUT))?;
        let farewell = connection.roundtrip(Verb::Quit, &[]).map(|_| ());
        let shutdown = connection.writer.shutdown(Shutdown::Both);
        farewell?;
        shutdown?;
        Ok(())
    }

    fn describe(&self) -> Result<String, SessionError> {
        if self.connection.lock().is_none() {
            return Err(SessionError::Closed);
        }
        Ok(format!("Session({})", self.endpoint))
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

fn encode_request(verb: Verb, args: &[&str]) -> Result<String, SessionError> {
    if args.iter().any(|arg| arg.contains(['\n', '\r'])) {
        return Err(SessionError::Protocol(format!(
            "{} argument contains a line break",
            verb.as_str()
        )));
    }

    let mut line = verb.as_str().to_string();
    if !args.is_empty() {
        line.push(' ');
        line.push_str(&args.join("\t"));
    }
    line.push('\n');
    Ok(line)
}

fn parse_response(line: &str) -> Result<String, SessionError> {
    if line == "OK" {
        return Ok(String::new());
    }
    if let Some(payload) = line.strip_prefix("OK ") {
        return Ok(payload.to_string());
    }
    if let Some(message) = line.strip_prefix("ERR") {
        return Err(SessionError::Remote(message.trim().to_string()));
    }
    Err(SessionError::Protocol(format!("unexpected response '{}'", line)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::TcpListener;
    use std::thread;

    /// Serve one connection with a tiny tag store, then stop
    fn spawn_endpoint() -> (String, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let reader = BufReader::new(stream);
            let mut tags: HashMap<String, String> = HashMap::new();
            let mut seen = Vec::new();

            for line in reader.lines() {
                let line = line.unwrap();
                seen.push(line.clone());
                let (verb, rest) = line.split_once(' ').unwrap_or((line.as_str(), ""));
                let reply = match verb {
                    "HELLO" => "OK hello".to_string(),
                    "PING" => "OK PONG".to_string(),
                    "GET" => match tags.get(rest) {
                        Some(v) => format!("OK {}", v),
                        None => format!("ERR unknown tag {}", rest),
                    },
                    "SET" => {
                        let (tag, value) = rest.split_once('\t').unwrap();
                        tags.insert(tag.to_string(), value.to_string());
                        "OK".to_string()
                    }
                    "QUIT" => {
                        writeln!(writer, "OK bye").unwrap();
                        break;
                    }
                    _ => "garbage".to_string(),
                };
                writeln!(writer, "{}", reply).unwrap();
            }
            seen
        });

        (addr, handle)
    }

    #[test]
    fn test_encode_request() {
        assert_eq!(encode_request(Verb::Ping, &[]).unwrap(), "PING\n");
        assert_eq!(
            encode_request(Verb::Set, &["Tag", "1.5"]).unwrap(),
            "SET Tag\t1.5\n"
        );
        assert!(encode_request(Verb::Cmd, &["a\nb"]).is_err());
    }

    #[test]
    fn test_parse_response() {
        assert_eq!(parse_response("OK").unwrap(), "");
        assert_eq!(parse_response("OK 42").unwrap(), "42");
        assert!(matches!(parse_response("ERR nope"), Err(SessionError::Remote(m)) if m == "nope"));
        assert!(matches!(parse_response("???"), Err(SessionError::Protocol(_))));
    }

    #[test]
    fn test_session_roundtrip() {
        let (addr, server) = spawn_endpoint();
        let session = TcpConnector::new(addr.clone()).connect().unwrap();

        session.probe().unwrap();
        session.request(Verb::Set, &["Rate", "12.5"]).unwrap();
        assert_eq!(session.request(Verb::Get, &["Rate"]).unwrap(), "12.5");
        assert!(matches!(
            session.request(Verb::Get, &["Other"]),
            Err(SessionError::Remote(_))
        ));
        assert_eq!(session.describe().unwrap(), format!("Session({})", addr));

        session.close().unwrap();
        assert!(matches!(session.probe(), Err(SessionError::Closed)));
        assert!(session.describe().is_err());

        let seen = server.join().unwrap();
        assert!(seen[0].starts_with("HELLO workcell/"));
        assert_eq!(seen.last().map(String::as_str), Some("QUIT"));
    }

    #[test]
    fn test_unexpected_reply_is_protocol_error() {
        let (addr, _server) = spawn_endpoint();
        let session = TcpConnector::new(addr).connect().unwrap();
        assert!(matches!(
            session.request(Verb::Cmd, &["RUN"]),
            Err(SessionError::Protocol(_))
        ));
    }

    #[test]
    fn test_connect_refused() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let result = TcpConnector::new(addr)
            .with_connect_timeout(Duration::from_millis(500))
            .connect();
        assert!(matches!(result, Err(SessionError::Connect { .. })));
    }

    #[test]
    fn test_probe_fails_after_endpoint_goes_away() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            writeln!(writer, "OK hello").unwrap();
        });

        let session = TcpConnector::new(addr)
            .with_io_timeout(Duration::from_secs(2))
            .connect()
            .unwrap();
        server.join().unwrap();

        assert!(session.probe().is_err());
        assert!(session.close().is_err() || session.describe().is_err());
    }

    #[test]
    fn test_close_skips_quit_on_failed_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            let mut seen = Vec::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    break;
                }
                let line = line.trim_end().to_string();
                if line.starts_with("HELLO") {
                    writeln!(writer, "OK hello").unwrap();
                }
                seen.push(line);
            }
            seen
        });

        let session = TcpConnector::new(addr)
            .with_io_timeout(Duration::from_millis(300))
            .connect()
            .unwrap();

        assert!(matches!(session.probe(), Err(SessionError::Io(_))));
        session.close().unwrap();
        assert!(matches!(session.probe(), Err(SessionError::Closed)));

        let seen = server.join().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], "PING");
    }
}

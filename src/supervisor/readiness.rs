//! Classifies `mongod` log output into a readiness outcome.
//!
//! Every output stream of the child feeds one shared handshake. The first
//! conclusive line settles it; later lines are still relayed to the log but no
//! longer classified.

use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use super::LOG_TARGET;

/// Fatal startup conditions recognised in server output.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum StartupFailureReason {
    /// The requested port is already bound.
    AddressInUse,
    /// Another server already holds the data directory.
    AlreadyRunning,
    /// The server could not access a required path.
    PermissionDenied,
    /// The data directory does not exist.
    DataDirectoryNotFound,
    /// The server shut itself down during startup.
    ShutDown,
    /// Every output stream closed before a conclusive line.
    ExitedBeforeStartup,
    /// The readiness line carried a port that is not a valid TCP port.
    InvalidPort,
}

impl fmt::Display for StartupFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AddressInUse => "address in use",
            Self::AlreadyRunning => "already running",
            Self::PermissionDenied => "permission denied",
            Self::DataDirectoryNotFound => "data directory not found",
            Self::ShutDown => "server shut down",
            Self::ExitedBeforeStartup => "exited before startup completed",
            Self::InvalidPort => "could not parse port from log line",
        })
    }
}

/// Terminal result of watching the server's startup output.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ReadinessOutcome {
    /// The server accepts connections on this port.
    Ready(u16),
    /// The server reported, or exhibited, a fatal condition.
    Failed(StartupFailureReason),
}

/// How server log lines are interpreted.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum LogFormat {
    /// Structured JSON when a line parses as an object, plain text otherwise.
    #[default]
    Auto,
    /// Plain-text log lines only.
    Text,
    /// Structured JSON log lines only; other lines are ignored.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "unknown log format {other:?}; expected auto, text, or json"
            )),
        }
    }
}

static READY: LazyLock<Regex> = LazyLock::new(|| compile(r"waiting for connections.*port\D*(\d+)"));

static FATAL: LazyLock<Vec<(Regex, StartupFailureReason)>> = LazyLock::new(|| {
    [
        (r"addr(ess)? already in use", StartupFailureReason::AddressInUse),
        (r"mongod already running", StartupFailureReason::AlreadyRunning),
        (r"mongod permission denied", StartupFailureReason::PermissionDenied),
        (r"data directory .*not found", StartupFailureReason::DataDirectoryNotFound),
        (r"shutting down with code", StartupFailureReason::ShutDown),
    ]
    .into_iter()
    .map(|(pattern, reason)| (compile(pattern), reason))
    .collect()
});

#[expect(clippy::expect_used, reason = "patterns are compile-time literals")]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("readiness pattern must compile")
}

/// Classifies one log line, returning `None` when it is inconclusive.
///
/// Recognisers are tried in order against the lower-cased line; the ready
/// pattern comes first.
#[must_use]
pub fn classify_line(format: LogFormat, line: &str) -> Option<ReadinessOutcome> {
    match format {
        LogFormat::Text => classify_text(line),
        LogFormat::Json => parse_object(line).and_then(|entry| classify_json(&entry, line)),
        LogFormat::Auto => match parse_object(line) {
            Some(entry) => classify_json(&entry, line),
            None => classify_text(line),
        },
    }
}

fn classify_text(line: &str) -> Option<ReadinessOutcome> {
    let lower = line.to_lowercase();
    if let Some(captures) = READY.captures(&lower) {
        let port = captures.get(1).map_or("", |found| found.as_str());
        return Some(port_outcome(port.parse::<u16>().ok()));
    }
    FATAL
        .iter()
        .find(|(pattern, _)| pattern.is_match(&lower))
        .map(|(_, reason)| ReadinessOutcome::Failed(*reason))
}

fn classify_json(entry: &Value, raw: &str) -> Option<ReadinessOutcome> {
    let msg = entry
        .get("msg")
        .and_then(Value::as_str)
        .map(str::to_lowercase)
        .unwrap_or_default();
    if msg.starts_with("waiting for connections") {
        let port = entry
            .pointer("/attr/port")
            .and_then(Value::as_u64)
            .and_then(|port| u16::try_from(port).ok());
        return Some(port_outcome(port));
    }
    if msg == "shutting down" || msg == "now exiting" {
        return Some(ReadinessOutcome::Failed(StartupFailureReason::ShutDown));
    }
    // Error details live in attributes, so fatal patterns scan the whole entry.
    classify_text(raw)
}

fn parse_object(line: &str) -> Option<Value> {
    serde_json::from_str::<Value>(line.trim())
        .ok()
        .filter(Value::is_object)
}

const fn port_outcome(port: Option<u16>) -> ReadinessOutcome {
    match port {
        Some(found) => ReadinessOutcome::Ready(found),
        None => ReadinessOutcome::Failed(StartupFailureReason::InvalidPort),
    }
}

/// Single-fulfilment rendezvous between output readers and the supervisor.
///
/// The outcome slot is taken exactly once, whether by a conclusive line or by
/// the last stream reaching end of file.
pub(crate) struct Handshake {
    sender: Mutex<Option<SyncSender<ReadinessOutcome>>>,
    open_streams: AtomicUsize,
    format: LogFormat,
}

impl Handshake {
    /// Creates a handshake expecting `streams` readers.
    pub(crate) fn new(streams: usize, format: LogFormat) -> (Arc<Self>, Receiver<ReadinessOutcome>) {
        let (sender, receiver) = sync_channel(1);
        let handshake = Self {
            sender: Mutex::new(Some(sender)),
            open_streams: AtomicUsize::new(streams),
            format,
        };
        (Arc::new(handshake), receiver)
    }

    fn is_settled(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Delivers `outcome` unless another outcome already was.
    fn fulfil(&self, outcome: ReadinessOutcome) -> bool {
        let taken = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(sender) = taken else {
            return false;
        };
        if sender.send(outcome).is_err() {
            debug!(target: LOG_TARGET, ?outcome, "supervisor stopped waiting before outcome");
        }
        true
    }

    fn observe(&self, line: &str) {
        if self.is_settled() {
            return;
        }
        if let Some(outcome) = classify_line(self.format, line) {
            self.fulfil(outcome);
        }
    }

    fn stream_closed(&self) {
        if self.open_streams.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.fulfil(ReadinessOutcome::Failed(
                StartupFailureReason::ExitedBeforeStartup,
            ));
        }
    }
}

/// Relays every line of `stream` to the log at DEBUG and feeds the handshake.
pub(crate) fn spawn_reader<R>(
    name: &'static str,
    stream: R,
    handshake: Arc<Handshake>,
) -> std::io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name(format!("mongod-{name}"))
        .spawn(move || {
            relay_lines(name, stream, &handshake);
            handshake.stream_closed();
        })
}

fn relay_lines(name: &'static str, stream: impl Read, handshake: &Handshake) {
    let mut reader = BufReader::new(stream);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => return,
            Ok(_) => {
                let decoded = String::from_utf8_lossy(&buffer);
                let line = decoded.trim_end_matches(['\r', '\n']);
                debug!(target: LOG_TARGET, stream = name, line, "mongod output");
                handshake.observe(line);
            }
            Err(err) => {
                warn!(target: LOG_TARGET, stream = name, error = %err, "reading mongod output failed");
                return;
            }
        }
    }
}

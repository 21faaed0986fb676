//! Scripted in-memory transport for exercising drivers without hardware.
//!
//! `MockTransport` is handed to the controller under test, `MockHandle` stays in the test
//! to script replies and inspect traffic. Both share one state behind a mutex, so the
//! handle keeps working after the transport has been moved into a controller.
//!
//! Replies are scripted per command line. Each query pops the next scripted reply; the
//! last reply of a script repeats forever, so `reply("!:1S", &["B", "B", "R"])` models an
//! axis that becomes ready on the third poll and stays ready afterwards.
//!
//! # Example
//!
//! ```rust,ignore
//! use stage_core::mock::MockTransport;
//! use stage_core::LineTransport;
//!
//! let (mut transport, handle) = MockTransport::new();
//! handle.reply("!:1S", &["B", "R"]);
//!
//! transport.write_line("G:").unwrap();
//! assert_eq!(transport.query_line("!:1S").unwrap(), "B");
//! assert_eq!(transport.query_line("!:1S").unwrap(), "R");
//! assert_eq!(transport.query_line("!:1S").unwrap(), "R");
//! assert_eq!(handle.writes(), vec!["G:"]);
//! assert_eq!(handle.query_count("!:1S"), 3);
//! ```

use crate::error::TransportError;
use crate::transport::{LineTransport, ResourceManager, SerialSettings};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;

/// One line exchanged with the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    /// Line written without expecting a reply.
    Write(String),
    /// Line written as a query.
    Query(String),
}

impl Exchange {
    /// The command line.
    pub fn line(&self) -> &str {
        match self {
            Exchange::Write(line) | Exchange::Query(line) => line,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    scripts: HashMap<String, VecDeque<String>>,
    log: Vec<Exchange>,
    closes: u32,
    fail_on: Option<String>,
    opened: Vec<(String, SerialSettings)>,
    refuse_open: bool,
}

/// Client-facing side of the mock: implements [`LineTransport`].
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

/// Test-facing side: scripts replies and inspects traffic.
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a connected transport/handle pair.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (MockTransport, MockHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            MockTransport {
                state: state.clone(),
            },
            MockHandle { state },
        )
    }

    fn check_failure(state: &MockState, line: &str) -> Result<(), TransportError> {
        match &state.fail_on {
            Some(target) if target == line => Err(TransportError::io(
                "mock",
                io::Error::new(io::ErrorKind::BrokenPipe, format!("injected failure on '{line}'")),
            )),
            _ => Ok(()),
        }
    }
}

impl LineTransport for MockTransport {
    fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        Self::check_failure(&state, line)?;
        state.log.push(Exchange::Write(line.to_string()));
        Ok(())
    }

    fn query_line(&mut self, line: &str) -> Result<String, TransportError> {
        let mut state = self.state.lock();
        Self::check_failure(&state, line)?;
        state.log.push(Exchange::Query(line.to_string()));

        let script = state.scripts.get_mut(line).ok_or_else(|| {
            TransportError::io(
                "mock",
                io::Error::new(io::ErrorKind::TimedOut, format!("no reply scripted for '{line}'")),
            )
        })?;
        let reply = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        reply.ok_or_else(|| {
            TransportError::io(
                "mock",
                io::Error::new(io::ErrorKind::TimedOut, format!("empty script for '{line}'")),
            )
        })
    }

    fn close(&mut self) {
        self.state.lock().closes += 1;
    }
}

impl MockHandle {
    /// Script the replies for `command`, replacing any previous script.
    pub fn reply(&self, command: &str, replies: &[&str]) -> &Self {
        self.state.lock().scripts.insert(
            command.to_string(),
            replies.iter().map(|r| r.to_string()).collect(),
        );
        self
    }

    /// Make every write or query of `command` fail with an I/O error.
    pub fn fail_on(&self, command: &str) -> &Self {
        self.state.lock().fail_on = Some(command.to_string());
        self
    }

    /// Stop injecting failures.
    pub fn clear_failure(&self) -> &Self {
        self.state.lock().fail_on = None;
        self
    }

    /// Make [`MockResourceManager::open`] fail.
    pub fn refuse_open(&self) -> &Self {
        self.state.lock().refuse_open = true;
        self
    }

    /// Every exchange in order.
    pub fn exchanges(&self) -> Vec<Exchange> {
        self.state.lock().log.clone()
    }

    /// Lines written without a reply, in order.
    pub fn writes(&self) -> Vec<String> {
        self.state
            .lock()
            .log
            .iter()
            .filter_map(|e| match e {
                Exchange::Write(line) => Some(line.clone()),
                Exchange::Query(_) => None,
            })
            .collect()
    }

    /// Every line sent to the controller, writes and queries alike.
    pub fn lines(&self) -> Vec<String> {
        self.state
            .lock()
            .log
            .iter()
            .map(|e| e.line().to_string())
            .collect()
    }

    /// Number of times `command` was sent as a query.
    pub fn query_count(&self, command: &str) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|e| matches!(e, Exchange::Query(line) if line == command))
            .count()
    }

    /// Forget the traffic log (scripts are kept).
    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    /// Number of `close` calls received.
    pub fn close_count(&self) -> u32 {
        self.state.lock().closes
    }

    /// Resources opened through [`MockResourceManager`], with their settings.
    pub fn opened(&self) -> Vec<(String, SerialSettings)> {
        self.state.lock().opened.clone()
    }
}

/// Resource manager that hands out the mock transport for any resource.
#[derive(Debug, Clone)]
pub struct MockResourceManager {
    transport: MockTransport,
}

impl MockResourceManager {
    /// Create a manager and the handle scripting its transport.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (MockResourceManager, MockHandle) {
        let (transport, handle) = MockTransport::new();
        (MockResourceManager { transport }, handle)
    }
}

impl ResourceManager for MockResourceManager {
    fn open(
        &self,
        resource: &str,
        settings: &SerialSettings,
    ) -> Result<Box<dyn LineTransport>, TransportError> {
        let mut state = self.transport.state.lock();
        if state.refuse_open {
            return Err(TransportError::io(
                resource,
                io::Error::new(io::ErrorKind::NotFound, "mock refused to open"),
            ));
        }
        state.opened.push((resource.to_string(), settings.clone()));
        Ok(Box::new(self.transport.clone()))
    }
}

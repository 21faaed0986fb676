//! Line-oriented serial transport.
//!
//! OptoSigma controllers speak a request/reply ASCII protocol: every command is one line,
//! and queries are answered with exactly one line. This module provides:
//!
//! # Types
//!
//! - [`LineTransport`]: trait for a session that writes lines and reads single-line replies
//! - [`LineChannel`]: buffered implementation over any `Read + Write` port
//! - [`SerialTransport`]: [`LineChannel`] over a `serialport::SerialPort`
//! - [`ResourceManager`]: opens a transport from a resource identifier
//! - [`SerialResourceManager`]: the default manager for local serial ports
//!
//! # Resource identifiers
//!
//! VISA-style serial resources (`ASRL3::INSTR`) and OS port paths (`/dev/ttyUSB0`, `COM3`)
//! are accepted. See [`resolve_port_path`].
//!
//! # Example
//!
//! ```rust,no_run
//! use stage_core::{LineTransport, ResourceManager, SerialResourceManager, SerialSettings};
//!
//! # fn main() -> Result<(), stage_core::TransportError> {
//! let manager = SerialResourceManager;
//! let mut session = manager.open("ASRL3::INSTR", &SerialSettings::new(9600))?;
//! let status = session.query_line("!:1S")?;
//! session.close();
//! # Ok(())
//! # }
//! ```

use crate::error::TransportError;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{BufRead, BufReader, Read, Write};
use std::time::Duration;
use tracing::{debug, info, trace};

// =============================================================================
// Session Trait
// =============================================================================

/// A line-oriented session with one controller.
///
/// Implementations append the write terminator to every line and strip the read
/// terminator from every reply. `query_line` takes `&mut self`, so a write and its reply
/// are never interleaved with another request on the same session.
pub trait LineTransport: Send {
    /// Write one command line.
    fn write_line(&mut self, line: &str) -> Result<(), TransportError>;

    /// Write one command line and read the single-line reply.
    fn query_line(&mut self, line: &str) -> Result<String, TransportError>;

    /// Release the underlying port. Must tolerate repeated calls.
    fn close(&mut self);
}

// =============================================================================
// Serial Settings
// =============================================================================

/// Fixed serial settings of a controller family.
///
/// All OptoSigma controllers use 8 data bits, no parity, one stop bit and `\r\n`
/// terminators; only the baud rate differs between families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Baud rate.
    pub baud_rate: u32,
    /// Data bits.
    pub data_bits: DataBits,
    /// Parity.
    pub parity: Parity,
    /// Stop bits.
    pub stop_bits: StopBits,
    /// Appended to every written line.
    pub write_terminator: &'static str,
    /// Terminates every reply.
    pub read_terminator: &'static str,
    /// Per-line I/O timeout.
    pub timeout: Duration,
}

impl SerialSettings {
    /// 8N1 with CRLF terminators and a 1 s I/O timeout.
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            write_terminator: "\r\n",
            read_terminator: "\r\n",
            timeout: Duration::from_secs(1),
        }
    }

    /// Override the per-line I/O timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// =============================================================================
// Buffered Line Channel
// =============================================================================

/// Buffered line session over any byte port.
///
/// Generic over the port so it can run against `serialport` handles and in-memory ports
/// alike.
pub struct LineChannel<P: Read + Write + Send> {
    resource: String,
    port: BufReader<P>,
    write_terminator: &'static str,
    read_terminator: &'static str,
    closed: bool,
}

/// [`LineChannel`] over an OS serial port.
pub type SerialTransport = LineChannel<Box<dyn SerialPort>>;

impl<P: Read + Write + Send> LineChannel<P> {
    /// Wrap an already opened port.
    pub fn new(resource: impl Into<String>, port: P, settings: &SerialSettings) -> Self {
        Self {
            resource: resource.into(),
            port: BufReader::new(port),
            write_terminator: settings.write_terminator,
            read_terminator: settings.read_terminator,
            closed: false,
        }
    }

    /// Resource identifier of this session.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            Err(TransportError::NotConnected)
        } else {
            Ok(())
        }
    }

    fn send(&mut self, line: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        let framed = format!("{line}{}", self.write_terminator);
        let writer = self.port.get_mut();
        writer
            .write_all(framed.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| TransportError::io(&self.resource, e))?;
        trace!(resource = %self.resource, line, "-> wire");
        Ok(())
    }

    fn read_reply(&mut self) -> Result<String, TransportError> {
        let delimiter = self.read_terminator.bytes().last().unwrap_or(b'\n');
        let mut buf = Vec::with_capacity(64);
        let n = self
            .port
            .read_until(delimiter, &mut buf)
            .map_err(|e| TransportError::io(&self.resource, e))?;
        if n == 0 {
            return Err(TransportError::UnexpectedEof(self.resource.clone()));
        }

        let text = String::from_utf8_lossy(&buf);
        let reply = text
            .trim_end_matches(|c: char| self.read_terminator.contains(c))
            .trim()
            .to_string();
        trace!(resource = %self.resource, reply = %reply, "<- wire");
        Ok(reply)
    }
}

impl<P: Read + Write + Send> LineTransport for LineChannel<P> {
    fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.send(line)
    }

    fn query_line(&mut self, line: &str) -> Result<String, TransportError> {
        self.send(line)?;
        self.read_reply()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            debug!(resource = %self.resource, "Serial session closed");
        }
    }
}

impl SerialTransport {
    /// Open an OS serial port with the given settings.
    ///
    /// Stale bytes left in the driver buffers from a previous session are discarded.
    pub fn open(resource: &str, settings: &SerialSettings) -> Result<Self, TransportError> {
        let path = resolve_port_path(resource)?;
        let port = serialport::new(&path, settings.baud_rate)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .flow_control(FlowControl::None)
            .timeout(settings.timeout)
            .open()
            .map_err(|source| TransportError::Open {
                resource: resource.to_string(),
                source,
            })?;

        if let Err(e) = port.clear(ClearBuffer::All) {
            debug!(resource, error = %e, "Could not clear serial buffers");
        }

        info!(resource, path = %path, baud = settings.baud_rate, "Serial port opened");
        Ok(LineChannel::new(resource, port, settings))
    }
}

// =============================================================================
// Resource Management
// =============================================================================

/// Opens line transports from resource identifiers.
pub trait ResourceManager: Send + Sync {
    /// Open a session on `resource` with the family's serial settings.
    fn open(
        &self,
        resource: &str,
        settings: &SerialSettings,
    ) -> Result<Box<dyn LineTransport>, TransportError>;
}

/// Resource manager for local serial ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialResourceManager;

impl ResourceManager for SerialResourceManager {
    fn open(
        &self,
        resource: &str,
        settings: &SerialSettings,
    ) -> Result<Box<dyn LineTransport>, TransportError> {
        Ok(Box::new(SerialTransport::open(resource, settings)?))
    }
}

/// Map a resource identifier to an OS serial port path.
///
/// - `ASRL<n>::INSTR` becomes `COM<n>` on Windows and `/dev/ttyS<n-1>` elsewhere.
/// - `ASRL<path>::INSTR` (e.g. `ASRL/dev/ttyUSB0::INSTR`) becomes `<path>`.
/// - Other VISA resource classes (`GPIB0::1::INSTR`, `USB0::...`) are rejected.
/// - Anything else is taken as an OS port path.
pub fn resolve_port_path(resource: &str) -> Result<String, TransportError> {
    let trimmed = resource.trim();
    let unknown = || TransportError::UnknownResource(resource.to_string());
    if trimmed.is_empty() {
        return Err(unknown());
    }

    let upper = trimmed.to_ascii_uppercase();
    if upper.starts_with("ASRL") && upper.ends_with("::INSTR") {
        let board = &trimmed[4..trimmed.len() - "::INSTR".len()];
        if board.is_empty() {
            return Err(unknown());
        }
        return match board.parse::<u32>() {
            Ok(n) => port_for_board(n).ok_or_else(unknown),
            Err(_) => Ok(board.to_string()),
        };
    }

    if trimmed.contains("::") {
        return Err(unknown());
    }
    Ok(trimmed.to_string())
}

#[cfg(windows)]
fn port_for_board(n: u32) -> Option<String> {
    Some(format!("COM{n}"))
}

#[cfg(not(windows))]
fn port_for_board(n: u32) -> Option<String> {
    n.checked_sub(1).map(|index| format!("/dev/ttyS{index}"))
}

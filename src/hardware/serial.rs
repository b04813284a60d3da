//! Serial-port target link.
//!
//! Blocking line reader over `serialport`. A line read never blocks longer than the
//! configured timeout: when it expires the partial input is kept for the next call and
//! an empty line is returned, which the command channel counts as one spent attempt.
use anyhow::{Context, Result};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use tracing::{info, trace};

use crate::hardware::capabilities::{DoneSignal, TargetLink};

/// Target console on a serial port.
pub struct SerialTarget {
    port: Box<dyn SerialPort>,
    port_name: String,
    line_timeout: Duration,
    done_signal: DoneSignal,
    pending: Vec<u8>,
}

impl SerialTarget {
    /// Open `port_name` at `baud_rate` (8N1, no flow control).
    ///
    /// # Errors
    /// Returns error if the port cannot be opened.
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        line_timeout: Duration,
        done_signal: DoneSignal,
    ) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(10))
            .open()
            .with_context(|| format!("Failed to open target serial port '{}'", port_name))?;

        info!(port = port_name, baud_rate, "Opened target serial port");

        Ok(Self {
            port,
            port_name: port_name.to_string(),
            line_timeout,
            done_signal,
            pending: Vec::new(),
        })
    }

    /// Name of the underlying port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn take_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

impl TargetLink for SerialTarget {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        trace!(port = %self.port_name, frame = %String::from_utf8_lossy(bytes).escape_default(), "tx");
        self.port
            .write_all(bytes)
            .with_context(|| format!("Failed to write to '{}'", self.port_name))?;
        self.port
            .flush()
            .with_context(|| format!("Failed to flush '{}'", self.port_name))
    }

    fn read_line(&mut self) -> Result<String> {
        let start = Instant::now();
        let mut buffer = [0u8; 256];

        loop {
            if let Some(line) = self.take_line() {
                trace!(port = %self.port_name, line = %line.escape_default(), "rx");
                return Ok(line);
            }
            if start.elapsed() >= self.line_timeout {
                return Ok(String::new());
            }
            match self.port.read(&mut buffer) {
                Ok(n) => self.pending.extend_from_slice(&buffer[..n]),
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to read from '{}'", self.port_name))
                }
            }
        }
    }

    fn is_done(&mut self) -> Result<bool> {
        let level = match self.done_signal {
            DoneSignal::Cts => self.port.read_clear_to_send(),
            DoneSignal::Dsr => self.port.read_data_set_ready(),
            DoneSignal::Always => return Ok(true),
        };
        level.with_context(|| format!("Failed to read modem status on '{}'", self.port_name))
    }
}

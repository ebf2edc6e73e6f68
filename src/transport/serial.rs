//! Serial transport for the Arduino sketch
//!
//! Owns the OS serial handle:
//! - Reader: a cloned handle on a dedicated thread (see `reader`)
//! - Writer: the primary handle behind a mutex, shared by the drain task
//!   and reader-thread resends
//!
//! Stop order on close: stop flag, bounded join of the reader, then release
//! the handle, so the reader never touches a closed port.

use super::reader::ReaderHandle;
use super::{LineWriter, Link};
use crate::config::SerialConfig;
use crate::constants::ARDUINO_VIDS;
use crate::error::{ArmlError, Result};
use parking_lot::Mutex;
use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Parameters of one serial link
#[derive(Debug, Clone, PartialEq)]
pub struct PortSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl PortSettings {
    pub fn from_config(port_name: impl Into<String>, config: &SerialConfig) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate: config.baud_rate,
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
        }
    }
}

/// An open serial link
pub struct Connection {
    settings: PortSettings,
    port: Box<dyn SerialPort>,
}

impl Connection {
    /// Open the port and raise DTR/RTS (the sketch waits for both)
    pub fn open(settings: PortSettings) -> Result<Self> {
        let unavailable = |e: serialport::Error| ArmlError::PortUnavailable {
            port: settings.port_name.clone(),
            source: e,
        };

        let mut port = serialport::new(&settings.port_name, settings.baud_rate)
            .timeout(settings.write_timeout)
            .open()
            .map_err(unavailable)?;
        port.write_data_terminal_ready(true).map_err(unavailable)?;
        port.write_request_to_send(true).map_err(unavailable)?;

        Ok(Self { settings, port })
    }

    pub fn settings(&self) -> &PortSettings {
        &self.settings
    }

    /// Second handle for the reader thread, with the read timeout applied
    ///
    /// Timeouts are per handle on Unix; on Windows both handles share the
    /// last value set.
    fn reader_handle(&self) -> Result<Box<dyn SerialPort>> {
        let unavailable = |e: serialport::Error| ArmlError::PortUnavailable {
            port: self.settings.port_name.clone(),
            source: e,
        };
        let mut reader = self.port.try_clone().map_err(unavailable)?;
        reader
            .set_timeout(self.settings.read_timeout)
            .map_err(unavailable)?;
        Ok(reader)
    }
}

/// Serial transport: open/close, background reader, blocking line writes
///
/// # Example
///
/// ```ignore
/// let transport = Arc::new(SerialTransport::new());
/// transport.open(PortSettings::from_config("COM7", &config.serial))?;
/// transport.start_reader_loop(|line| println!("{line}"))?;
/// transport.write_line("ARML_DEFAULT")?;
/// transport.close(Duration::from_secs(1));
/// ```
pub struct SerialTransport {
    connection: Mutex<Option<Connection>>,
    reader: Mutex<Option<ReaderHandle>>,
    link_lost: Arc<AtomicBool>,
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialTransport {
    pub fn new() -> Self {
        Self {
            connection: Mutex::new(None),
            reader: Mutex::new(None),
            link_lost: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open the port; a second open while connected is a no-op
    pub fn open(&self, settings: PortSettings) -> Result<()> {
        let mut connection = self.connection.lock();
        if connection.is_some() {
            debug!("Serial port already open");
            return Ok(());
        }

        let opened = Connection::open(settings)?;
        info!(
            "Opened {} at {} baud",
            opened.settings.port_name, opened.settings.baud_rate
        );
        *connection = Some(opened);
        self.link_lost.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.connection.lock().is_some()
    }

    /// Port name of the current connection
    pub fn port_name(&self) -> Option<String> {
        self.connection
            .lock()
            .as_ref()
            .map(|c| c.settings.port_name.clone())
    }

    /// Raised by the reader after repeated failed reads
    pub fn link_lost(&self) -> bool {
        self.link_lost.load(Ordering::SeqCst)
    }

    /// Spawn the background reader; `on_line` runs on the reader thread
    pub fn start_reader_loop<F>(&self, on_line: F) -> Result<()>
    where
        F: FnMut(&str) + Send + 'static,
    {
        let mut reader = self.reader.lock();
        if reader.as_ref().is_some_and(ReaderHandle::is_running) {
            debug!("Reader thread already running");
            return Ok(());
        }

        let handle = {
            let connection = self.connection.lock();
            let connection = connection.as_ref().ok_or(ArmlError::PortNotOpen)?;
            connection.reader_handle()?
        };
        *reader = Some(ReaderHandle::spawn(handle, self.link_lost.clone(), on_line)?);
        info!("Reader thread running");
        Ok(())
    }

    /// Stop the reader (bounded by `join_timeout`) and release the port
    ///
    /// Idempotent and best-effort: problems are logged, never returned.
    pub fn close(&self, join_timeout: Duration) {
        // Reader first, without holding the connection lock: a resend from
        // the reader thread needs that lock to finish.
        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            if let Err(e) = reader.stop(join_timeout) {
                warn!("{}", e);
            }
        }

        if let Some(connection) = self.connection.lock().take() {
            info!("Closed {}", connection.settings.port_name);
        }
    }

    // =========================================================================
    // Detection
    // =========================================================================

    /// Names of all serial ports the OS reports
    pub fn list_ports() -> Vec<SerialPortInfo> {
        serialport::available_ports().unwrap_or_default()
    }

    /// Find the single attached Arduino-like board
    pub fn detect() -> Result<String> {
        select_arduino(&Self::list_ports())
    }
}

impl Link for SerialTransport {
    fn open(&self, settings: PortSettings) -> Result<()> {
        SerialTransport::open(self, settings)
    }

    fn start_reader_loop<F>(&self, on_line: F) -> Result<()>
    where
        F: FnMut(&str) + Send + 'static,
    {
        SerialTransport::start_reader_loop(self, on_line)
    }

    fn close(&self, join_timeout: Duration) {
        SerialTransport::close(self, join_timeout)
    }

    fn is_open(&self) -> bool {
        SerialTransport::is_open(self)
    }

    fn link_lost(&self) -> bool {
        SerialTransport::link_lost(self)
    }
}

impl LineWriter for SerialTransport {
    fn write_line(&self, line: &str) -> Result<()> {
        let mut connection = self.connection.lock();
        let Connection { settings, port } =
            connection.as_mut().ok_or(ArmlError::PortNotOpen)?;

        let write_err = |e: std::io::Error| ArmlError::Write {
            port: settings.port_name.clone(),
            source: e,
        };

        let mut framed = Vec::with_capacity(line.len() + 1);
        framed.extend_from_slice(line.as_bytes());
        framed.push(b'\n');
        port.write_all(&framed).map_err(write_err)?;
        port.flush().map_err(write_err)
    }
}

/// Is this port a USB board from one of the known vendors?
pub fn is_arduino(port: &SerialPortInfo) -> bool {
    matches!(
        &port.port_type,
        SerialPortType::UsbPort(usb) if ARDUINO_VIDS.contains(&usb.vid)
    )
}

fn select_arduino(ports: &[SerialPortInfo]) -> Result<String> {
    let matching: Vec<_> = ports.iter().filter(|p| is_arduino(p)).collect();

    match matching.len() {
        0 => Err(ArmlError::NoDeviceFound),
        1 => Ok(matching[0].port_name.clone()),
        _ => Err(ArmlError::MultipleDevicesFound {
            ports: matching.iter().map(|p| p.port_name.clone()).collect(),
        }),
    }
}

//! Transport layer for the Arduino link
//!
//! Separates I/O concerns from protocol logic:
//! - **Transport**: how lines reach the device (serial port, test doubles)
//! - **Codec**: what the lines mean (handled in `codec`)
//!
//! The queue only ever sees the `LineWriter` seam, so it can be driven
//! without hardware.

pub mod reader;
pub mod serial;

pub use reader::ReaderHandle;
pub use serial::{Connection, PortSettings, SerialTransport};

use crate::error::Result;
use std::time::Duration;

/// Blocking, line-oriented writer shared by the drain task and the reader thread
///
/// Implementations must be safe to call from both concurrently; each call
/// writes one complete line (the terminator is appended by the writer).
pub trait LineWriter: Send + Sync {
    fn write_line(&self, line: &str) -> Result<()>;
}

/// A reconnectable device link, as driven by `Session`
///
/// `SerialTransport` is the production implementation; tests substitute a
/// simulated device.
pub trait Link: LineWriter + 'static {
    /// Open the link; a second open while connected is a no-op
    fn open(&self, settings: PortSettings) -> Result<()>;

    /// Start delivering inbound lines to `on_line` on a background thread
    fn start_reader_loop<F>(&self, on_line: F) -> Result<()>
    where
        F: FnMut(&str) + Send + 'static;

    /// Stop the reader (bounded by `join_timeout`) and release the link
    fn close(&self, join_timeout: Duration);

    fn is_open(&self) -> bool;

    /// The link went away underneath an open connection
    fn link_lost(&self) -> bool;
}

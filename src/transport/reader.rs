//! Background line reader
//!
//! One dedicated OS thread performs blocking line reads. Read timeouts are
//! the steady state while the device is quiet and are not reported; other
//! errors are logged and the loop keeps going until it is stopped.

use crate::constants::{
    JOIN_POLL_INTERVAL_MS, MAX_LINE_BYTES, READ_ERROR_BACKOFF_MS, SERIAL_ERROR_THRESHOLD,
};
use crate::error::{ArmlError, Result};
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Handle to a running reader thread
pub struct ReaderHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ReaderHandle {
    /// Spawn the reader thread
    ///
    /// `on_line` receives each complete line with `\n` / `\r\n` stripped.
    /// `link_lost` is raised after repeated failing reads or EOF.
    pub fn spawn<R, F>(reader: R, link_lost: Arc<AtomicBool>, on_line: F) -> Result<Self>
    where
        R: Read + Send + 'static,
        F: FnMut(&str) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_reader = stop.clone();

        let thread = std::thread::Builder::new()
            .name("arml-serial-reader".into())
            .spawn(move || read_loop(reader, &stop_reader, &link_lost, on_line))
            .map_err(|e| ArmlError::Runtime { source: e })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signal the thread and wait for it, at most `timeout`
    ///
    /// On timeout the thread is detached; it exits after its current blocking
    /// read returns.
    pub fn stop(mut self, timeout: Duration) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        let deadline = Instant::now() + timeout;
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                warn!("Reader thread still blocked after {:?}, detaching", timeout);
                return Err(ArmlError::ReaderJoinTimeout { timeout });
            }
            std::thread::sleep(Duration::from_millis(JOIN_POLL_INTERVAL_MS));
        }

        if thread.join().is_err() {
            error!("Reader thread panicked");
        }
        debug!("Reader thread stopped");
        Ok(())
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn read_loop<R: Read, F: FnMut(&str)>(
    reader: R,
    stop: &AtomicBool,
    link_lost: &AtomicBool,
    mut on_line: F,
) {
    let mut reader = BufReader::new(reader);
    // Survives timeouts so a line split across reads is not lost
    let mut buf: Vec<u8> = Vec::with_capacity(256);
    // Set after an overlong line was cut; the rest of it is dropped too
    let mut discarding = false;
    let mut consecutive_errors = 0u32;

    while !stop.load(Ordering::Relaxed) {
        let room = (MAX_LINE_BYTES - buf.len()) as u64;
        match (&mut reader).take(room).read_until(b'\n', &mut buf) {
            Ok(0) => {
                // EOF: the device node went away
                consecutive_errors += 1;
                std::thread::sleep(Duration::from_millis(READ_ERROR_BACKOFF_MS));
            }
            Ok(_) => {
                consecutive_errors = 0;
                if buf.last() == Some(&b'\n') {
                    if discarding {
                        discarding = false;
                        buf.clear();
                    } else {
                        dispatch_line(&mut buf, &mut on_line);
                    }
                } else if buf.len() >= MAX_LINE_BYTES {
                    if !discarding {
                        warn!("Dropping inbound line longer than {} bytes", MAX_LINE_BYTES);
                    }
                    discarding = true;
                    buf.clear();
                }
            }
            Err(ref e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                consecutive_errors = 0;
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                error!("Error reading serial data: {}", e);
                consecutive_errors += 1;
                std::thread::sleep(Duration::from_millis(READ_ERROR_BACKOFF_MS));
            }
        }

        if consecutive_errors >= SERIAL_ERROR_THRESHOLD && !link_lost.swap(true, Ordering::SeqCst)
        {
            warn!("Serial link lost after {} failed reads", consecutive_errors);
        }
    }
}

fn dispatch_line<F: FnMut(&str)>(buf: &mut Vec<u8>, on_line: &mut F) {
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    let line = String::from_utf8_lossy(buf);
    on_line(&line);
    buf.clear();
}

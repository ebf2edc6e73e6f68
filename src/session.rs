//! Connection supervisor
//!
//! Owns the transport and the controller for the lifetime of the process.
//! Per connection:
//! 1. Resolve the port (configured or auto-detected) and open it
//! 2. Reset the queue, start the reader, force the startup sequence
//! 3. Drain the queue until shutdown or link loss
//! 4. Stop draining, release the port, reconnect if enabled

use crate::config::Config;
use crate::constants::{ONE_SHOT_DRAIN_TIMEOUT_SECS, SUPERVISOR_POLL_MS};
use crate::controller::LedController;
use crate::error::Result;
use crate::imu::Orientation;
use crate::queue::run_drain_loop;
use crate::transport::{Link, PortSettings, SerialTransport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// One Arduino, supervised across reconnects
pub struct Session<T: Link = SerialTransport> {
    config: Config,
    transport: Arc<T>,
    controller: Arc<LedController>,
}

impl Session<SerialTransport> {
    pub fn new(config: Config) -> Self {
        Self::with_transport(config, Arc::new(SerialTransport::new()))
    }
}

impl<T: Link> Session<T> {
    pub fn with_transport(config: Config, transport: Arc<T>) -> Self {
        let controller = Arc::new(LedController::new(transport.clone(), &config));
        Self {
            config,
            transport,
            controller,
        }
    }

    pub fn controller(&self) -> &Arc<LedController> {
        &self.controller
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    fn resolve_port(&self) -> Result<String> {
        if !self.config.serial.port.is_empty() {
            return Ok(self.config.serial.port.clone());
        }
        let port = SerialTransport::detect()?;
        info!("Found Arduino on {}", port);
        Ok(port)
    }

    /// Open the port and bring the strip into its startup state
    pub fn connect(&self) -> Result<String> {
        let port = self.resolve_port()?;
        self.transport
            .open(PortSettings::from_config(port.clone(), &self.config.serial))?;

        self.controller.queue().reset();
        if let Err(e) = self
            .transport
            .start_reader_loop(self.controller.line_handler())
        {
            self.transport.close(self.config.serial.reader_join_timeout());
            return Err(e);
        }
        self.controller.startup_sequence();
        Ok(port)
    }

    /// Release the port; `blackout` turns the strip off first
    pub async fn disconnect(&self, blackout: bool) {
        let controller = self.controller.clone();
        let transport = self.transport.clone();
        let join_timeout = self.config.serial.reader_join_timeout();

        let result = tokio::task::spawn_blocking(move || {
            if blackout && transport.is_open() {
                controller.blackout();
            }
            transport.close(join_timeout);
        })
        .await;
        if let Err(e) = result {
            warn!("Disconnect task failed: {}", e);
        }
    }

    /// Drain queued commands until `shutdown`, reconnecting on link loss
    ///
    /// Returns the connection error when the first open fails and
    /// reconnection is disabled.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) -> Result<()> {
        while !shutdown.load(Ordering::Relaxed) {
            let port = match self.connect() {
                Ok(port) => port,
                Err(e) => {
                    if !self.config.serial.reconnect {
                        return Err(e);
                    }
                    warn!("{}", e);
                    sleep_unless(&shutdown, self.config.serial.reconnect_delay()).await;
                    continue;
                }
            };
            info!("Connected to {}", port);

            let drain_stop = Arc::new(AtomicBool::new(false));
            let drain = tokio::spawn(run_drain_loop(
                self.controller.queue().clone(),
                self.config.serial.write_interval(),
                drain_stop.clone(),
            ));

            while !shutdown.load(Ordering::Relaxed) && !self.transport.link_lost() {
                tokio::time::sleep(Duration::from_millis(SUPERVISOR_POLL_MS)).await;
            }

            drain_stop.store(true, Ordering::SeqCst);
            if let Err(e) = drain.await {
                warn!("Drain task failed: {}", e);
            }

            let shutting_down = shutdown.load(Ordering::Relaxed);
            self.disconnect(shutting_down).await;
            debug!("Link stats: {:?}", self.controller.stats());

            if shutting_down {
                break;
            }
            if !self.config.serial.reconnect {
                warn!("Connection to {} lost", port);
                break;
            }
            warn!("Connection lost, reconnecting...");
            sleep_unless(&shutdown, self.config.serial.post_disconnect_delay()).await;
        }

        Ok(())
    }

    /// Connect, apply `issue`, and wait until the queue is idle
    ///
    /// Used by one-shot CLI commands; the strip keeps the new state on exit.
    pub async fn run_once<F>(&self, shutdown: Arc<AtomicBool>, issue: F) -> Result<bool>
    where
        F: FnOnce(&LedController),
    {
        let port = self.connect()?;
        info!("Connected to {}", port);
        issue(&self.controller);

        let drain_stop = Arc::new(AtomicBool::new(false));
        let drain = tokio::spawn(run_drain_loop(
            self.controller.queue().clone(),
            self.config.serial.write_interval(),
            drain_stop.clone(),
        ));

        let idle = wait_until_idle(
            &self.controller,
            &shutdown,
            Duration::from_secs(ONE_SHOT_DRAIN_TIMEOUT_SECS),
        )
        .await;
        if !idle {
            warn!(
                "Queue not drained: {} pending, state {:?}",
                self.controller.queue().pending_len(),
                self.controller.queue_state()
            );
        }

        drain_stop.store(true, Ordering::SeqCst);
        if let Err(e) = drain.await {
            warn!("Drain task failed: {}", e);
        }
        self.disconnect(false).await;
        Ok(idle)
    }

    /// Enable the IMU and hand each orientation to `on_sample` every `interval`
    ///
    /// Runs until `shutdown`, link loss, or `limit` elapses.
    pub async fn watch_imu<F>(
        &self,
        shutdown: Arc<AtomicBool>,
        limit: Option<Duration>,
        interval: Duration,
        mut on_sample: F,
    ) -> Result<()>
    where
        F: FnMut(&Orientation),
    {
        let port = self.connect()?;
        info!("Connected to {}, waiting for IMU samples", port);
        self.controller.activate_imu();

        let deadline = limit.map(|limit| Instant::now() + limit);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while !shutdown.load(Ordering::Relaxed) && !self.transport.link_lost() {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break;
            }
            ticker.tick().await;
            if let Some(orientation) = self.controller.orientation() {
                on_sample(&orientation);
            }
        }

        self.disconnect(false).await;
        Ok(())
    }
}

async fn wait_until_idle(controller: &LedController, shutdown: &AtomicBool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if controller.queue().is_idle() {
            return true;
        }
        if shutdown.load(Ordering::Relaxed) || Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(SUPERVISOR_POLL_MS)).await;
    }
}

/// Sleep for `duration`, waking early when `shutdown` is set
async fn sleep_unless(shutdown: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while !shutdown.load(Ordering::Relaxed) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(SUPERVISOR_POLL_MS)).await;
    }
}

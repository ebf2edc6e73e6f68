//! Caller-facing LED/IMU API
//!
//! Interaction code calls these methods to express intents; each one is
//! encoded and either queued (paced by acknowledgements) or force-sent.
//! Failures are logged and swallowed: a lost LED update is never an error
//! the caller has to handle.

use crate::codec::command::{self, AnimationOverrides};
use crate::codec::OutboundMessage;
use crate::color::Color;
use crate::config::{AnimationConfig, Config, LedConfig};
use crate::imu::{ImuTracker, Orientation};
use crate::queue::{CommandQueue, LineOutcome, QueueState};
use crate::stats::{Stats, StatsSnapshot};
use crate::transport::LineWriter;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// LED strip and IMU controller for one Arduino
pub struct LedController {
    queue: Arc<CommandQueue>,
    imu: Mutex<ImuTracker>,
    led: LedConfig,
    animation: AnimationConfig,
    print_all_messages: bool,
}

impl LedController {
    pub fn new(writer: Arc<dyn LineWriter>, config: &Config) -> Self {
        let queue = CommandQueue::new(writer, config.serial.max_ack_retries, Arc::new(Stats::new()));
        Self {
            queue: Arc::new(queue),
            imu: Mutex::new(ImuTracker::new()),
            led: config.led.clone(),
            animation: config.animation.clone(),
            print_all_messages: config.serial.print_all_messages,
        }
    }

    fn submit(&self, msg: OutboundMessage, force: bool) {
        if force {
            // Already logged by the queue
            let _ = self.queue.force_send(&msg);
        } else {
            self.queue.enqueue(msg);
        }
    }

    // =========================================================================
    // LED commands
    // =========================================================================

    pub fn set_color(&self, color: Color, force: bool) {
        self.submit(command::solid_color(color, self.led.white_brightness), force);
    }

    pub fn set_brightness(&self, level: u8, force: bool) {
        self.submit(command::brightness(level), force);
    }

    /// `true` shows the ready state, `false` the loading state
    pub fn set_ready(&self, ready: bool, force: bool) {
        self.submit(command::ready(ready), force);
    }

    pub fn set_default(&self, force: bool) {
        self.submit(command::default_lights(), force);
    }

    /// Queue an animation; parameters left as `None` use the configured defaults
    pub fn set_animation(&self, background: Color, foreground: Color, overrides: AnimationOverrides) {
        self.queue.enqueue(command::animation(
            background,
            foreground,
            self.led.white_brightness,
            overrides,
            &self.animation,
        ));
    }

    /// Queue a host-side fade as a series of solid colours
    pub fn set_fade(&self, from: Color, to: Color, duration_secs: f32) {
        let steps = command::fade(from, to, duration_secs, self.led.white_brightness);
        debug!("Fade over {}s as {} steps", duration_secs, steps.len());
        for step in steps {
            self.queue.enqueue(step);
        }
    }

    /// Turn the BNO055 broadcast on
    pub fn activate_imu(&self) {
        self.submit(command::imu_enable(), true);
    }

    /// Forced on every (re)connect, before periodic draining starts
    pub fn startup_sequence(&self) {
        self.set_brightness(self.led.overall_brightness, true);
        self.set_ready(self.led.startup_ready, true);
        self.set_default(true);
    }

    /// Strip off; forced right before the port is released
    pub fn blackout(&self) {
        self.submit(command::blackout(), true);
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Reader-thread entry point for each raw line
    pub fn handle_line(&self, line: &str) {
        if self.print_all_messages {
            info!("<- {}", line);
        }
        if let LineOutcome::Imu(sample) = self.queue.on_device_line(line) {
            self.imu.lock().update(sample);
        }
    }

    /// Callback suitable for `SerialTransport::start_reader_loop`
    pub fn line_handler(self: &Arc<Self>) -> impl FnMut(&str) + Send + 'static {
        let controller = Arc::clone(self);
        move |line: &str| controller.handle_line(line)
    }

    /// Orientation from the latest IMU sample
    pub fn orientation(&self) -> Option<Orientation> {
        self.imu.lock().orientation()
    }

    pub fn recalibrate_imu(&self) {
        self.imu.lock().recalibrate();
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn queue(&self) -> &Arc<CommandQueue> {
        &self.queue
    }

    pub fn queue_state(&self) -> QueueState {
        self.queue.state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.queue.stats().snapshot()
    }
}

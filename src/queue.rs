//! Outbound command queue with acknowledgement pacing
//!
//! At most one drained message is unacknowledged at any time:
//!
//! ```text
//!            drain_tick: pop + write
//!  ReadyToSend ─────────────────────> AwaitingAck
//!       ^                                 │   │
//!       │        echo == last_sent        │   │ echo != last_sent
//!       └─────────────────────────────────┘   └──> resend last_sent
//! ```
//!
//! With a retry cap configured, a message that keeps getting mismatched
//! echoes is abandoned and the queue moves on in the `Degraded` state until
//! the next clean acknowledgement.
//!
//! The pending list and the ack state each sit behind their own mutex:
//! callers enqueue from any thread, the drain task pops, and the serial
//! reader thread resolves acknowledgements.

use crate::codec::{self, DeviceLine, OutboundMessage};
use crate::error::ArmlError;
use crate::imu::Quaternion;
use crate::stats::Stats;
use crate::transport::LineWriter;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Observable queue state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Nothing in flight
    ReadyToSend,
    /// A drained message awaits its echo
    AwaitingAck,
    /// Nothing in flight, but the last message was abandoned after too many
    /// mismatched echoes
    Degraded,
}

/// Result of one drain tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// A message is still in flight
    AwaitingAck,
    /// Nothing pending
    Empty,
    /// Head repeated the last sent message and was dropped
    SkippedRepeat(OutboundMessage),
    /// Head was written and is now in flight
    Sent(OutboundMessage),
    /// No port attached; the head was dropped and the queue stays ready
    PortClosed(OutboundMessage),
    /// Write failed; the message stays in flight until an echo or a reset
    WriteFailed(OutboundMessage),
}

/// What an inbound line did to the queue
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Echo matched the in-flight message
    Acked,
    /// Echo mismatched; the in-flight message was written again
    Resent,
    /// Echo mismatched and the resend failed
    ResendFailed,
    /// Retry cap reached; the in-flight message was given up
    Abandoned,
    /// Echo arrived with nothing in flight (e.g. of a force-sent command)
    UnexpectedEcho,
    /// IMU sample for the orientation tracker
    Imu(Quaternion),
    /// Not protocol traffic
    Ignored,
}

#[derive(Debug)]
struct AckState {
    ready_to_send: bool,
    last_sent: Option<OutboundMessage>,
    /// Last line written by any path (drain, resend, force); `None` once the
    /// strip state is unknown
    last_written: Option<OutboundMessage>,
    retries: u32,
    degraded: bool,
}

impl Default for AckState {
    fn default() -> Self {
        Self {
            ready_to_send: true,
            last_sent: None,
            last_written: None,
            retries: 0,
            degraded: false,
        }
    }
}

/// Single-flight command queue
pub struct CommandQueue {
    pending: Mutex<VecDeque<OutboundMessage>>,
    ack: Mutex<AckState>,
    writer: Arc<dyn LineWriter>,
    max_ack_retries: Option<u32>,
    stats: Arc<Stats>,
}

impl CommandQueue {
    pub fn new(writer: Arc<dyn LineWriter>, max_ack_retries: Option<u32>, stats: Arc<Stats>) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            ack: Mutex::new(AckState::default()),
            writer,
            max_ack_retries,
            stats,
        }
    }

    /// Append `msg` unless it equals the current tail
    ///
    /// Returns `false` when the message was suppressed as a duplicate.
    pub fn enqueue(&self, msg: OutboundMessage) -> bool {
        let mut pending = self.pending.lock();
        if pending.back() == Some(&msg) {
            self.stats.record_duplicate();
            return false;
        }
        pending.push_back(msg);
        self.stats.record_queued();
        true
    }

    /// Write immediately, bypassing the queue and the ack gate
    ///
    /// The ack lock is held so the write is ordered against drain writes.
    pub fn force_send(&self, msg: &OutboundMessage) -> crate::error::Result<()> {
        let mut ack = self.ack.lock();
        match self.writer.write_line(msg.as_str()) {
            Ok(()) => {
                ack.last_written = Some(msg.clone());
                self.stats.record_forced();
                debug!("Force sent {}", msg);
                Ok(())
            }
            Err(e) => {
                ack.last_written = None;
                self.stats.record_write_failure();
                error!("Failed to force send {}: {}", msg, e);
                Err(e)
            }
        }
    }

    /// One periodic opportunity to send the next pending message
    pub fn drain_tick(&self) -> DrainOutcome {
        // Held across the write so an echo cannot race the bookkeeping
        let mut ack = self.ack.lock();
        if !ack.ready_to_send {
            return DrainOutcome::AwaitingAck;
        }

        let Some(msg) = self.pending.lock().pop_front() else {
            return DrainOutcome::Empty;
        };

        if ack.last_written.as_ref() == Some(&msg) {
            debug!("Skipping {}, already shown", msg);
            return DrainOutcome::SkippedRepeat(msg);
        }

        match self.writer.write_line(msg.as_str()) {
            Ok(()) => {
                self.stats.record_sent();
                debug!("Sent {}", msg);
                ack.last_sent = Some(msg.clone());
                ack.last_written = Some(msg.clone());
                ack.ready_to_send = false;
                ack.retries = 0;
                DrainOutcome::Sent(msg)
            }
            Err(ArmlError::PortNotOpen) => {
                debug!("Dropping {}, port not open", msg);
                DrainOutcome::PortClosed(msg)
            }
            Err(e) => {
                self.stats.record_write_failure();
                error!("Failed to send {}: {}", msg, e);
                // Not requeued; the gate stays closed until an echo or reset
                ack.last_sent = Some(msg.clone());
                ack.last_written = None;
                ack.ready_to_send = false;
                ack.retries = 0;
                DrainOutcome::WriteFailed(msg)
            }
        }
    }

    /// Handle one raw line from the reader thread
    pub fn on_device_line(&self, line: &str) -> LineOutcome {
        self.stats.record_line();
        match codec::decode_line(line) {
            DeviceLine::Ack { echo } => self.on_echo(echo),
            DeviceLine::Imu(sample) => {
                self.stats.record_imu_sample();
                LineOutcome::Imu(sample)
            }
            DeviceLine::Other => LineOutcome::Ignored,
        }
    }

    /// Only an in-flight drained message is checked against the echo.
    ///
    /// The device echoes every command, including force-sent ones. An echo of
    /// a force-send that arrives while a drained message is in flight cannot
    /// be told apart from corruption: it counts as a mismatch, triggers a
    /// resend and uses up one of `max_ack_retries`.
    fn on_echo(&self, echo: &str) -> LineOutcome {
        let mut ack = self.ack.lock();
        let last = match (&ack.last_sent, ack.ready_to_send) {
            (Some(last), false) => last.clone(),
            _ => {
                debug!("Echo {:?} with nothing in flight", echo);
                return LineOutcome::UnexpectedEcho;
            }
        };

        if last == *echo {
            debug!("{} acknowledged, can send next message", last);
            self.stats.record_acked();
            ack.ready_to_send = true;
            ack.retries = 0;
            ack.degraded = false;
            return LineOutcome::Acked;
        }

        if let Some(max) = self.max_ack_retries {
            if ack.retries >= max {
                warn!(
                    "Giving up on {} after {} mismatched echoes (last: {:?})",
                    last, ack.retries, echo
                );
                self.stats.record_abandoned();
                ack.ready_to_send = true;
                ack.degraded = true;
                ack.retries = 0;
                ack.last_sent = None;
                ack.last_written = None;
                return LineOutcome::Abandoned;
            }
        }

        ack.retries += 1;
        debug!("Echo {:?} does not match {}, sending again", echo, last);
        match self.writer.write_line(last.as_str()) {
            Ok(()) => {
                ack.last_written = Some(last);
                self.stats.record_resent();
                LineOutcome::Resent
            }
            Err(e) => {
                ack.last_written = None;
                self.stats.record_write_failure();
                error!("Failed to resend {}: {}", last, e);
                LineOutcome::ResendFailed
            }
        }
    }

    /// Start a fresh connection lifetime: empty queue, nothing in flight
    pub fn reset(&self) {
        let mut ack = self.ack.lock();
        *ack = AckState::default();
        self.pending.lock().clear();
    }

    pub fn state(&self) -> QueueState {
        let ack = self.ack.lock();
        match (ack.ready_to_send, ack.degraded) {
            (false, _) => QueueState::AwaitingAck,
            (true, true) => QueueState::Degraded,
            (true, false) => QueueState::ReadyToSend,
        }
    }

    pub fn last_sent(&self) -> Option<OutboundMessage> {
        self.ack.lock().last_sent.clone()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Copy of the pending messages, head first
    pub fn pending(&self) -> Vec<OutboundMessage> {
        self.pending.lock().iter().cloned().collect()
    }

    /// Nothing pending and nothing in flight
    pub fn is_idle(&self) -> bool {
        self.state() != QueueState::AwaitingAck && self.pending_len() == 0
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }
}

/// Drive `drain_tick` every `interval` until `shutdown` is set
///
/// The first tick fires one interval after start. Writes block for at most
/// the port's write timeout, so each tick runs on the blocking pool.
pub async fn run_drain_loop(queue: Arc<CommandQueue>, interval: Duration, shutdown: Arc<AtomicBool>) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let queue = queue.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || queue.drain_tick()).await {
            error!("Drain tick panicked: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::command;
    use crate::color::Color;
    use proptest::prelude::*;

    /// Records every line; can be switched to fail
    #[derive(Default)]
    struct RecordingWriter {
        lines: Mutex<Vec<String>>,
        fail_with: Mutex<Option<fn() -> ArmlError>>,
    }

    impl RecordingWriter {
        fn lines(&self) -> Vec<String> {
            self.lines.lock().clone()
        }

        fn fail(&self, make: fn() -> ArmlError) {
            *self.fail_with.lock() = Some(make);
        }
    }

    impl LineWriter for RecordingWriter {
        fn write_line(&self, line: &str) -> crate::error::Result<()> {
            if let Some(make) = *self.fail_with.lock() {
                return Err(make());
            }
            self.lines.lock().push(line.to_string());
            Ok(())
        }
    }

    fn io_failure() -> ArmlError {
        ArmlError::Write {
            port: "COM7".into(),
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, "write timeout"),
        }
    }

    fn queue_with(max_retries: Option<u32>) -> (CommandQueue, Arc<RecordingWriter>) {
        let writer = Arc::new(RecordingWriter::default());
        let queue = CommandQueue::new(writer.clone(), max_retries, Arc::new(Stats::new()));
        (queue, writer)
    }

    fn msg(s: &str) -> OutboundMessage {
        OutboundMessage::from(s)
    }

    // =========================================================================
    // Enqueue
    // =========================================================================

    #[test]
    fn test_enqueue_suppresses_tail_duplicate() {
        let (queue, _) = queue_with(None);

        assert!(queue.enqueue(msg("ARML_B50")));
        assert!(!queue.enqueue(msg("ARML_B50")));
        assert!(queue.enqueue(msg("ARML_DEFAULT")));
        assert!(queue.enqueue(msg("ARML_B50")));

        assert_eq!(queue.pending_len(), 3);
        assert_eq!(queue.stats().snapshot().duplicates, 1);
    }

    proptest! {
        #[test]
        fn prop_duplicate_of_tail_never_grows_queue(
            cmds in proptest::collection::vec(0u8..4, 0..40)
        ) {
            let (queue, _) = queue_with(None);
            for c in cmds {
                let m = msg(&format!("ARML_B{}", c));
                let before = queue.pending();
                let appended = queue.enqueue(m.clone());
                let after = queue.pending_len();

                if before.last() == Some(&m) {
                    prop_assert!(!appended);
                    prop_assert_eq!(after, before.len());
                } else {
                    prop_assert!(appended);
                    prop_assert_eq!(after, before.len() + 1);
                }
            }
        }
    }

    // =========================================================================
    // Drain
    // =========================================================================

    #[test]
    fn test_drain_empty_queue_is_noop() {
        let (queue, writer) = queue_with(None);
        assert_eq!(queue.drain_tick(), DrainOutcome::Empty);
        assert!(writer.lines().is_empty());
        assert_eq!(queue.state(), QueueState::ReadyToSend);
    }

    #[test]
    fn test_at_most_one_in_flight() {
        let (queue, writer) = queue_with(None);
        queue.enqueue(msg("ARML_READY"));
        queue.enqueue(msg("ARML_DEFAULT"));

        assert_eq!(queue.drain_tick(), DrainOutcome::Sent(msg("ARML_READY")));
        assert_eq!(queue.state(), QueueState::AwaitingAck);

        for _ in 0..5 {
            assert_eq!(queue.drain_tick(), DrainOutcome::AwaitingAck);
        }
        assert_eq!(writer.lines(), vec!["ARML_READY"]);
        assert_eq!(queue.pending_len(), 1);
    }

    #[test]
    fn test_drain_skips_repeat_of_last_sent() {
        let (queue, writer) = queue_with(None);
        queue.enqueue(msg("ARML_B50"));
        queue.drain_tick();
        queue.on_device_line("CMD: ARML_B50");

        queue.enqueue(msg("ARML_B50"));
        assert_eq!(queue.drain_tick(), DrainOutcome::SkippedRepeat(msg("ARML_B50")));
        assert_eq!(queue.state(), QueueState::ReadyToSend);
        assert_eq!(writer.lines(), vec!["ARML_B50"]);
    }

    #[test]
    fn test_force_send_in_between_defeats_repeat_skip() {
        let (queue, writer) = queue_with(None);
        queue.enqueue(msg("R255G0B0W0A255E"));
        queue.drain_tick();
        queue.on_device_line("DEV CMD: R255G0B0W0A255E");

        queue.force_send(&msg("ARML_DEFAULT")).unwrap();
        queue.enqueue(msg("R255G0B0W0A255E"));

        assert_eq!(
            queue.drain_tick(),
            DrainOutcome::Sent(msg("R255G0B0W0A255E"))
        );
        assert_eq!(
            writer.lines(),
            vec!["R255G0B0W0A255E", "ARML_DEFAULT", "R255G0B0W0A255E"]
        );
    }

    #[test]
    fn test_write_failure_stalls_without_requeue() {
        let (queue, writer) = queue_with(None);
        writer.fail(io_failure);
        queue.enqueue(msg("ARML_READY"));
        queue.enqueue(msg("ARML_DEFAULT"));

        assert_eq!(queue.drain_tick(), DrainOutcome::WriteFailed(msg("ARML_READY")));
        assert_eq!(queue.state(), QueueState::AwaitingAck);
        assert_eq!(queue.pending(), vec![msg("ARML_DEFAULT")]);
        assert_eq!(queue.drain_tick(), DrainOutcome::AwaitingAck);
        assert_eq!(queue.stats().snapshot().write_failures, 1);
    }

    #[test]
    fn test_port_closed_drops_message_and_stays_ready() {
        let (queue, writer) = queue_with(None);
        writer.fail(|| ArmlError::PortNotOpen);
        queue.enqueue(msg("ARML_READY"));

        assert_eq!(queue.drain_tick(), DrainOutcome::PortClosed(msg("ARML_READY")));
        assert_eq!(queue.state(), QueueState::ReadyToSend);
        assert_eq!(queue.pending_len(), 0);
    }

    // =========================================================================
    // Acknowledgements
    // =========================================================================

    #[test]
    fn test_ack_confirms_exactly_once() {
        let (queue, _) = queue_with(None);
        queue.enqueue(msg("ARML_DEFAULT"));
        queue.drain_tick();

        assert_eq!(queue.on_device_line("XX CMD: ARML_DEFAULT\r\n"), LineOutcome::Acked);
        assert_eq!(queue.state(), QueueState::ReadyToSend);

        // A repeated echo has nothing left to confirm
        assert_eq!(
            queue.on_device_line("XX CMD: ARML_DEFAULT\r\n"),
            LineOutcome::UnexpectedEcho
        );
        assert_eq!(queue.stats().snapshot().acked, 1);
    }

    #[test]
    fn test_mismatch_resends_same_message() {
        let (queue, writer) = queue_with(None);
        queue.enqueue(msg("ARML_B50"));
        queue.enqueue(msg("ARML_READY"));
        queue.drain_tick();

        assert_eq!(queue.on_device_line("...CMD:GARBAGE"), LineOutcome::Resent);
        assert_eq!(queue.state(), QueueState::AwaitingAck);
        assert_eq!(writer.lines(), vec!["ARML_B50", "ARML_B50"]);
        assert_eq!(queue.pending(), vec![msg("ARML_READY")]);
    }

    #[test]
    fn test_unbounded_retries_by_default() {
        let (queue, writer) = queue_with(None);
        queue.enqueue(msg("ARML_B50"));
        queue.drain_tick();

        for _ in 0..100 {
            assert_eq!(queue.on_device_line("CMD: ARML_B5"), LineOutcome::Resent);
        }
        assert_eq!(writer.lines().len(), 101);
        assert_eq!(queue.state(), QueueState::AwaitingAck);
    }

    #[test]
    fn test_retry_cap_abandons_and_degrades() {
        let (queue, writer) = queue_with(Some(2));
        queue.enqueue(msg("ARML_B50"));
        queue.enqueue(msg("ARML_READY"));
        queue.drain_tick();

        assert_eq!(queue.on_device_line("CMD: X"), LineOutcome::Resent);
        assert_eq!(queue.on_device_line("CMD: X"), LineOutcome::Resent);
        assert_eq!(queue.on_device_line("CMD: X"), LineOutcome::Abandoned);
        assert_eq!(queue.state(), QueueState::Degraded);

        // Queue advances past the abandoned message
        assert_eq!(queue.drain_tick(), DrainOutcome::Sent(msg("ARML_READY")));
        assert_eq!(queue.on_device_line("CMD: ARML_READY"), LineOutcome::Acked);
        assert_eq!(queue.state(), QueueState::ReadyToSend);
        assert_eq!(
            writer.lines(),
            vec!["ARML_B50", "ARML_B50", "ARML_B50", "ARML_READY"]
        );
        assert_eq!(queue.stats().snapshot().abandoned, 1);
    }

    #[test]
    fn test_echo_while_ready_does_not_resend() {
        let (queue, writer) = queue_with(None);
        queue.enqueue(msg("ARML_B50"));
        queue.drain_tick();
        queue.on_device_line("CMD: ARML_B50");

        // Echo of a force-sent command
        assert_eq!(queue.on_device_line("CMD: ARML_DEFAULT"), LineOutcome::UnexpectedEcho);
        assert_eq!(writer.lines(), vec!["ARML_B50"]);
    }

    #[test]
    fn test_force_send_echo_while_awaiting_counts_as_mismatch() {
        let (queue, writer) = queue_with(Some(1));
        queue.enqueue(msg("ARML_B50"));
        queue.drain_tick();
        queue.force_send(&msg("ARML_IMU")).unwrap();

        assert_eq!(queue.on_device_line("CMD: ARML_IMU"), LineOutcome::Resent);
        assert_eq!(queue.on_device_line("CMD: ARML_B50"), LineOutcome::Acked);
        assert_eq!(writer.lines(), vec!["ARML_B50", "ARML_IMU", "ARML_B50"]);
        assert_eq!(queue.stats().snapshot().resent, 1);
    }

    #[test]
    fn test_non_ack_lines_route_to_imu() {
        let (queue, _) = queue_with(None);

        assert_eq!(
            queue.on_device_line("0.0,0.0,0.0,1.0"),
            LineOutcome::Imu(Quaternion::IDENTITY)
        );
        assert_eq!(queue.on_device_line("1.0,2.0,abc,4.0"), LineOutcome::Ignored);
        assert_eq!(queue.on_device_line("boot ok"), LineOutcome::Ignored);

        let snap = queue.stats().snapshot();
        assert_eq!(snap.lines, 3);
        assert_eq!(snap.imu_samples, 1);
    }

    // =========================================================================
    // Force send / reset
    // =========================================================================

    #[test]
    fn test_force_send_bypasses_queue_and_gate() {
        let (queue, writer) = queue_with(None);
        queue.enqueue(msg("ARML_READY"));
        queue.drain_tick();

        queue.force_send(&command::blackout()).unwrap();

        assert_eq!(writer.lines(), vec!["ARML_READY", "R0G0B0W0A0E"]);
        assert_eq!(queue.state(), QueueState::AwaitingAck);
        assert_eq!(queue.last_sent(), Some(msg("ARML_READY")));
    }

    #[test]
    fn test_force_send_reports_failure() {
        let (queue, writer) = queue_with(None);
        writer.fail(io_failure);
        assert!(queue.force_send(&command::solid_color(Color::RED, 0)).is_err());
    }

    #[test]
    fn test_reset_clears_everything() {
        let (queue, _) = queue_with(None);
        queue.enqueue(msg("ARML_READY"));
        queue.enqueue(msg("ARML_DEFAULT"));
        queue.drain_tick();

        queue.reset();

        assert!(queue.is_idle());
        assert_eq!(queue.last_sent(), None);
        assert_eq!(queue.state(), QueueState::ReadyToSend);
    }

    // =========================================================================
    // Drain loop
    // =========================================================================

    #[tokio::test]
    async fn test_drain_loop_sends_on_interval_and_stops() {
        let (queue, writer) = queue_with(None);
        let queue = Arc::new(queue);
        queue.enqueue(msg("ARML_READY"));
        queue.enqueue(msg("ARML_DEFAULT"));

        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(run_drain_loop(
            queue.clone(),
            Duration::from_millis(20),
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(writer.lines(), vec!["ARML_READY"]);

        queue.on_device_line("CMD: ARML_READY");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(writer.lines(), vec!["ARML_READY", "ARML_DEFAULT"]);

        shutdown.store(true, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("drain loop did not stop")
            .unwrap();
    }
}

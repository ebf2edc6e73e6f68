//! Application-wide constants
//!
//! Centralized constants to avoid duplication and ensure consistency.

// =============================================================================
// Serial
// =============================================================================

/// Default baud rate of the LED/IMU sketch
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default blocking read timeout (milliseconds)
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 500;

/// Default blocking write timeout (milliseconds)
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 100;

/// Default bound on joining the reader thread at shutdown (milliseconds)
pub const DEFAULT_READER_JOIN_TIMEOUT_MS: u64 = 1_000;

/// Consecutive failing reads before the link is reported lost
pub const SERIAL_ERROR_THRESHOLD: u32 = 10;

/// Longest inbound line kept while waiting for its newline (bytes)
pub const MAX_LINE_BYTES: usize = 1024;

/// Pause after a failing read so a dead port does not spin (milliseconds)
pub const READ_ERROR_BACKOFF_MS: u64 = 50;

/// Poll step while waiting for the reader thread to finish (milliseconds)
pub const JOIN_POLL_INTERVAL_MS: u64 = 10;

/// USB vendor ids of boards the sketch runs on (Arduino LLC, Arduino SRL, CH340, CP210x)
pub const ARDUINO_VIDS: &[u16] = &[0x2341, 0x2A03, 0x1A86, 0x10C4];

// =============================================================================
// Queue
// =============================================================================

/// Default time between drain ticks (seconds)
pub const DEFAULT_WRITE_INTERVAL_SECS: f64 = 0.2;

/// Marker that identifies an acknowledgement line
pub const ACK_MARKER: &str = "CMD";

// =============================================================================
// LED strip
// =============================================================================

/// Highest brightness level the sketch accepts
pub const MAX_BRIGHTNESS: u8 = 254;

/// Default end pixel when the strip length is not configured
pub const DEFAULT_END_PIXEL_INDEX: u32 = 72;

/// Upper bound on the colour steps one fade expands into
pub const MAX_FADE_STEPS: usize = 600;

// =============================================================================
// Timing - Reconnection
// =============================================================================

/// Default delay between serial reconnection attempts (milliseconds)
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 2_000;

/// Default delay after connection loss before retry (milliseconds)
pub const DEFAULT_POST_DISCONNECT_DELAY_MS: u64 = 3_000;

/// How often the supervisor checks for link loss and shutdown (milliseconds)
pub const SUPERVISOR_POLL_MS: u64 = 100;

/// Upper bound on waiting for a one-shot CLI command to drain (seconds)
pub const ONE_SHOT_DRAIN_TIMEOUT_SECS: u64 = 10;

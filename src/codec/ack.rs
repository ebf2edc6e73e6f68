//! Acknowledgement line parsing
//!
//! After executing a command the sketch prints `...CMD: <command>`. The
//! echoed command is compared with the last drained message to pace the queue.

use crate::constants::ACK_MARKER;

/// Is this line an acknowledgement?
pub fn is_ack(line: &str) -> bool {
    line.contains(ACK_MARKER)
}

/// Extract the echoed command from an acknowledgement line
///
/// Returns `None` for lines without the marker. A marker without a `:`
/// yields an empty echo, which never matches a sent command.
pub fn parse_echo(line: &str) -> Option<&str> {
    let marker = line.find(ACK_MARKER)?;
    let after_marker = &line[marker + ACK_MARKER.len()..];

    let echo = match after_marker.find(':') {
        Some(colon) => &after_marker[colon + 1..],
        None => "",
    };
    Some(echo.trim_start().trim_end_matches(['\r', '\n']))
}

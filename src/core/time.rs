//! Shared timestamp/id helpers for log records and state envelopes.

use ulid::Ulid;

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{}Z", secs)
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Run identifier minted once per fresh guard state.
pub fn new_run_id() -> String {
    format!("r_{}", Ulid::new())
}

/// Truncates `text` to `max` bytes on a char boundary, appending a marker
/// naming how much was dropped. Oversized tool output must never reach the
/// log sinks or session prompts verbatim.
pub fn safe_truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut cut = max;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}\n...(truncated {} chars)",
        &text[..cut],
        text.len() - cut
    )
}

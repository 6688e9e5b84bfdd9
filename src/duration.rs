use crate::errors::*;
use chrono::Duration;

/// Used wherever a duration field is left empty.
pub const DEFAULT_DURATION: &str = "5m";

/// Parse `<number><unit>` where unit is one of s, m, h, d, w.
/// An empty string means [`DEFAULT_DURATION`].
pub fn parse_duration(value: &str) -> Result<Duration> {
    let value = if value.is_empty() {
        DEFAULT_DURATION
    } else {
        value
    };
    let invalid = || Error::from(ErrorKind::InvalidDuration(value.to_string()));

    let unit_at = value
        .char_indices()
        .last()
        .map(|(i, _)| i)
        .ok_or_else(invalid)?;
    let (amount, unit) = value.split_at(unit_at);
    if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let amount: i64 = amount.parse().map_err(|_| invalid())?;

    let seconds = match unit {
        "s" => Some(amount),
        "m" => amount.checked_mul(60),
        "h" => amount.checked_mul(60 * 60),
        "d" => amount.checked_mul(24 * 60 * 60),
        "w" => amount.checked_mul(7 * 24 * 60 * 60),
        _ => None,
    }
    .ok_or_else(invalid)?;

    Duration::try_seconds(seconds).ok_or_else(invalid)
}

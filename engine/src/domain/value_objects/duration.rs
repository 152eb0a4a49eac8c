//! Duration parsing and rendering for control-file timeouts

use regex::Regex;
use std::time::Duration;

/// Extracts a `with timeout N <unit>` clause from `text`, if present.
/// Units: millisecond, second, minute, hour, day, optionally pluralised.
/// Returns `None` when no clause matches; `Err` carries an out-of-range count.
pub fn parse_with_timeout(text: &str) -> Result<Option<Duration>, String> {
    let re = Regex::new(r"with\s+timeout\s+(\S+)\s+(millisecond|second|minute|hour|day)s?\b")
        .expect("timeout clause pattern");
    let caps = match re.captures(text) {
        Some(caps) => caps,
        None => return Ok(None),
    };
    let count: u64 = caps[1]
        .parse()
        .map_err(|_| format!("Invalid timeout value {}", &caps[1]))?;
    Ok(Some(duration_from_unit(count, &caps[2])))
}

fn duration_from_unit(count: u64, unit: &str) -> Duration {
    match unit {
        "millisecond" => Duration::from_millis(count),
        "second" => Duration::from_secs(count),
        "minute" => Duration::from_secs(count * 60),
        "hour" => Duration::from_secs(count * 3600),
        "day" => Duration::from_secs(count * 86400),
        _ => unreachable!("unit restricted by the pattern"),
    }
}

/// Renders a duration truncated to whole seconds, in compact `1h2m3s` form.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    if total == 0 {
        return "0s".to_string();
    }
    let (hours, rem) = (total / 3600, total % 3600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if seconds > 0 || out.is_empty() {
        out.push_str(&format!("{}s", seconds));
    }
    out
}

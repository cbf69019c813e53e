//! Process uptime.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

static STARTED_AT: OnceLock<Instant> = OnceLock::new();

/// Records the process start. Later calls keep the first value.
pub fn mark_bot_started() {
    STARTED_AT.get_or_init(Instant::now);
}

/// Time since [`mark_bot_started`], zero if it was never called.
#[must_use]
pub fn uptime() -> Duration {
    STARTED_AT.get().map_or(Duration::ZERO, Instant::elapsed)
}

/// Current uptime in Uzbek, e.g. `1 kun 3 soat 5 daqiqa`.
#[must_use]
pub fn format_uptime() -> String {
    format_duration_uz(uptime())
}

/// Days, hours and minutes, skipping zero parts. Under a minute shows seconds.
#[must_use]
pub fn format_duration_uz(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    let parts: Vec<String> = [(days, "kun"), (hours, "soat"), (minutes, "daqiqa")]
        .into_iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| format!("{value} {unit}"))
        .collect();

    if parts.is_empty() {
        format!("{seconds} soniya")
    } else {
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_uz() {
        assert_eq!(format_duration_uz(Duration::from_secs(42)), "42 soniya");
        assert_eq!(format_duration_uz(Duration::ZERO), "0 soniya");
        assert_eq!(format_duration_uz(Duration::from_secs(3_600)), "1 soat");
        assert_eq!(
            format_duration_uz(Duration::from_secs(90_000 + 5 * 60 + 7)),
            "1 kun 1 soat 5 daqiqa"
        );
        assert_eq!(format_duration_uz(Duration::from_secs(86_400 + 120)), "1 kun 2 daqiqa");
    }

    #[test]
    fn test_uptime_after_start() {
        mark_bot_started();
        let first = uptime();
        mark_bot_started();
        assert!(uptime() >= first);
    }
}

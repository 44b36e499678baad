//! Time formatting helpers.

use std::time::Duration;

/// Format an elapsed duration for progress logs: `850ms`, `42s`, `3m 7s`,
/// `2h 15m`, `1d 4h`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    match secs {
        0 => format!("{}ms", elapsed.as_millis()),
        1..=59 => format!("{secs}s"),
        60..=3_599 => format!("{}m {}s", secs / 60, secs % 60),
        3_600..=86_399 => format!("{}h {}m", secs / 3_600, (secs % 3_600) / 60),
        _ => format!("{}d {}h", secs / 86_400, (secs % 86_400) / 3_600),
    }
}

/// Blocks processed per second, or `0.0` for an empty interval.
pub fn blocks_per_sec(blocks: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        0.0
    } else {
        blocks as f64 / secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_each_magnitude() {
        assert_eq!(format_elapsed(Duration::from_millis(850)), "850ms");
        assert_eq!(format_elapsed(Duration::from_secs(42)), "42s");
        assert_eq!(format_elapsed(Duration::from_secs(187)), "3m 7s");
        assert_eq!(format_elapsed(Duration::from_secs(8_100)), "2h 15m");
        assert_eq!(format_elapsed(Duration::from_secs(100_800)), "1d 4h");
    }

    #[test]
    fn rate_of_empty_interval_is_zero() {
        assert_eq!(blocks_per_sec(100, Duration::ZERO), 0.0);
        assert_eq!(blocks_per_sec(100, Duration::from_secs(4)), 25.0);
    }
}

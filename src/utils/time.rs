use anyhow::{anyhow, Result};
use chrono::Duration;

/// Floors a signed millisecond amount at zero. Tracked durations never go negative.
pub fn clamp_ms(value: i64) -> u64 {
    value.max(0) as u64
}

/// This is the standard way of rendering a tracked duration in primetrack.
pub fn format_duration(v: Duration) -> String {
    if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}

/// Parses a signed `H:MM:SS` (or `M:SS`, or plain seconds) value into milliseconds.
/// Used for manual time corrections, so a leading `-` is meaningful.
pub fn parse_signed_hms(value: &str) -> Result<i64> {
    let (negative, rest) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    if rest.is_empty() {
        return Err(anyhow!("Empty duration"));
    }

    let parts: Vec<&str> = rest.split(':').collect();
    if parts.len() > 3 {
        return Err(anyhow!("Too many components in duration {value:?}"));
    }
    let mut total_seconds = 0i64;
    for (index, part) in parts.iter().enumerate() {
        let unit: i64 = part
            .parse()
            .map_err(|_| anyhow!("Can't parse {part:?} inside duration {value:?}"))?;
        // The leading component is open ended, minutes and seconds below it are not.
        if unit < 0 || (index > 0 && unit > 59) {
            return Err(anyhow!("Out of range component {part:?} in {value:?}"));
        }
        total_seconds = total_seconds * 60 + unit;
    }

    let ms = total_seconds * 1000;
    Ok(if negative { -ms } else { ms })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::{clamp_ms, format_duration, parse_signed_hms};

    #[test]
    fn clamping_floors_at_zero() {
        assert_eq!(clamp_ms(1500), 1500);
        assert_eq!(clamp_ms(0), 0);
        assert_eq!(clamp_ms(-1), 0);
        assert_eq!(clamp_ms(-1_000_000), 0);
    }

    #[test]
    fn durations_format_by_magnitude() {
        assert_eq!(format_duration(Duration::seconds(42)), "42s");
        assert_eq!(format_duration(Duration::seconds(62)), "1m2s");
        assert_eq!(format_duration(Duration::seconds(3723)), "1h2m3s");
    }

    #[test]
    fn hms_parsing_accepts_all_forms() {
        assert_eq!(parse_signed_hms("90").unwrap(), 90_000);
        assert_eq!(parse_signed_hms("1:30").unwrap(), 90_000);
        assert_eq!(parse_signed_hms("0:01:30").unwrap(), 90_000);
        assert_eq!(parse_signed_hms("2:00:00").unwrap(), 7_200_000);
        assert_eq!(parse_signed_hms("-0:30:00").unwrap(), -1_800_000);
        assert_eq!(parse_signed_hms("+0:00:01").unwrap(), 1000);
    }

    #[test]
    fn hms_parsing_rejects_garbage() {
        assert!(parse_signed_hms("abc").is_err());
        assert!(parse_signed_hms("1:75").is_err());
        assert!(parse_signed_hms("1:2:3:4").is_err());
        assert!(parse_signed_hms("").is_err());
        assert!(parse_signed_hms("-").is_err());
    }
}

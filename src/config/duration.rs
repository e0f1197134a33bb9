//! Retention duration parsing.

use anyhow::Context;

/// Parse a retention duration like "30", "30d", "4w" into days.
/// Supports:
/// - Plain numbers (interpreted as days): "30"
/// - Days suffix: "30d"
/// - Weeks suffix: "4w"
pub fn parse_duration_to_days(s: &str) -> anyhow::Result<i64> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty duration string");
    }

    let days = if let Some(num_str) = s.strip_suffix('w') {
        let weeks: i64 = num_str
            .parse()
            .with_context(|| format!("Invalid weeks value: {num_str}"))?;
        weeks
            .checked_mul(7)
            .with_context(|| format!("Duration out of range: {s}"))?
    } else if let Some(num_str) = s.strip_suffix('d') {
        num_str
            .parse()
            .with_context(|| format!("Invalid days value: {num_str}"))?
    } else {
        s.parse::<i64>()
            .with_context(|| format!("Invalid duration value: {s}"))?
    };

    if days < 0 {
        anyhow::bail!("Duration must not be negative: {s}");
    }
    if chrono::TimeDelta::try_days(days).is_none() {
        anyhow::bail!("Duration out of range: {s}");
    }
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_number_is_days() {
        assert_eq!(parse_duration_to_days("30").unwrap(), 30);
        assert_eq!(parse_duration_to_days(" 7 ").unwrap(), 7);
    }

    #[test]
    fn test_suffixes() {
        assert_eq!(parse_duration_to_days("14d").unwrap(), 14);
        assert_eq!(parse_duration_to_days("2w").unwrap(), 14);
    }

    #[test]
    fn test_invalid() {
        assert!(parse_duration_to_days("").is_err());
        assert!(parse_duration_to_days("abc").is_err());
        assert!(parse_duration_to_days("3h").is_err());
        assert!(parse_duration_to_days("-1").is_err());
    }

    #[test]
    fn test_out_of_range() {
        assert!(parse_duration_to_days("200000000000").is_err());
        assert!(parse_duration_to_days("2000000000000000000w").is_err());
        assert!(parse_duration_to_days("36500").is_ok());
    }
}

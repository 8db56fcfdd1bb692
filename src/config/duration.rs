//! Human-readable durations for config files (`"5s"`, `"500ms"`, `"2m"`).

use std::time::Duration;

use serde::{de, Deserialize, Deserializer, Serializer};

/// Parse a duration such as `"120s"`. A bare integer is read as seconds.
pub fn parse(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);
    if digits.is_empty() {
        return Err(format!("invalid duration '{}'", input));
    }
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{}'", input))?;

    let secs_per_unit = match unit.trim() {
        "ms" => return Ok(Duration::from_millis(value)),
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        other => return Err(format!("unknown duration unit '{}' in '{}'", other, input)),
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("invalid duration '{}': out of range", input))
}

/// Render a duration in the most compact unit that keeps it exact.
pub fn format(duration: &Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 {
        format!("{}ms", millis)
    } else {
        format!("{}s", duration.as_secs())
    }
}

pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(duration))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse(&text).map_err(de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_units() {
        assert_eq!(parse("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse("120s"), Ok(Duration::from_secs(120)));
        assert_eq!(parse("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse("30"), Ok(Duration::from_secs(30)));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("").is_err());
        assert!(parse("s").is_err());
        assert!(parse("5 parsecs").is_err());
        assert!(parse("-5s").is_err());
    }

    #[test]
    fn rejects_overflowing_values() {
        let err = parse("999999999999999999h").unwrap_err();
        assert!(err.contains("out of range"), "{}", err);
        assert!(parse("999999999999999999999s").is_err());
        assert_eq!(
            parse("5124095576030431h"),
            Ok(Duration::from_secs(5124095576030431 * 3600))
        );
    }

    #[test]
    fn formats_compactly() {
        assert_eq!(format(&Duration::from_secs(30)), "30s");
        assert_eq!(format(&Duration::from_millis(1500)), "1500ms");
    }
}

pub mod error;
pub mod logging;

use std::time::Duration;

// Helper function to parse duration from string
pub fn parse_duration(duration_str: &str) -> Option<Duration> {
    let parts: Vec<&str> = duration_str.split_whitespace().collect();
    if parts.len() != 2 {
        return None;
    }

    let value: u64 = parts[0].parse().ok()?;
    let unit = parts[1].to_lowercase();

    match unit.as_str() {
        "ms" | "milliseconds" | "millisecond" => Some(Duration::from_millis(value)),
        "s" | "seconds" | "second" => Some(Duration::from_secs(value)),
        "m" | "minutes" | "minute" => Some(Duration::from_secs(value * 60)),
        "h" | "hours" | "hour" => Some(Duration::from_secs(value * 3600)),
        _ => None,
    }
}

/// Serde adapter for durations written as integer milliseconds or as a
/// string accepted by [`parse_duration`]. Always serializes as milliseconds.
pub mod duration_ms {
    use super::parse_duration;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
            Raw::Text(text) => parse_duration(&text)
                .ok_or_else(|| D::Error::custom(format!("invalid duration: {}", text))),
        }
    }

    pub mod option {
        use super::Raw;
        use crate::utils::parse_duration;
        use serde::de::Error;
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<Raw>::deserialize(deserializer)? {
                None => Ok(None),
                Some(Raw::Millis(ms)) => Ok(Some(Duration::from_millis(ms))),
                Some(Raw::Text(text)) => parse_duration(&text)
                    .map(Some)
                    .ok_or_else(|| D::Error::custom(format!("invalid duration: {}", text))),
            }
        }
    }
}

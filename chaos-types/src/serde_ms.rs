//! Serde helpers for durations expressed as integer milliseconds.
//!
//! Scenario files and reports use plain millisecond integers (`duration_ms = 5000`)
//! rather than serde's default `{ secs, nanos }` representation.

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// `Duration` <-> `u64` milliseconds.
pub mod duration {
    use super::*;

    /// Serialize a duration as whole milliseconds.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    /// Deserialize whole milliseconds into a duration.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// `Option<Duration>` <-> optional `u64` milliseconds.
pub mod option {
    use super::*;

    /// Serialize an optional duration as optional whole milliseconds.
    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize optional whole milliseconds into an optional duration.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

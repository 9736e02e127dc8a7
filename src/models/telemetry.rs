//! Snapshot schema for the store's `live_data` topic.
//!
//! Field controllers disagree on spelling (camelCase vs snake_case) and
//! occasionally deliver numbers as quoted strings. Both forms are accepted
//! and normalized here, once, at the decode boundary; derivation code only
//! ever sees typed optional fields.

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// One pump sub-record as written by a field controller.
///
/// `status` is nominally ON/OFF and `mode` AUTO/MANUAL, but controllers are
/// free to write other tokens; normalization happens in `rules`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PumpReading {
    pub status: Option<String>,
    pub mode: Option<String>,
}

/// The most recent telemetry record for all channels at one point in time.
///
/// Every field is optional. Derivation treats a missing reading as zero,
/// which reads as critical for every sensor channel.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LiveSnapshot {
    /// Water tank fill level, percent.
    #[serde(rename = "waterLevel", alias = "tank_level", deserialize_with = "loose_f64")]
    pub water_level: Option<f64>,
    /// Diesel tank fill level, percent.
    #[serde(rename = "dieselLevel", alias = "diesel_level", deserialize_with = "loose_f64")]
    pub diesel_level: Option<f64>,
    /// Battery system voltage, volts.
    #[serde(rename = "batteryVoltage", alias = "battery_voltage", deserialize_with = "loose_f64")]
    pub battery_voltage: Option<f64>,
    /// System pressure, bar.
    #[serde(deserialize_with = "loose_f64")]
    pub pressure: Option<f64>,
    /// Pump sub-records keyed by pump id (e.g. main, jockey, sprinkler).
    pub pumps: BTreeMap<String, PumpReading>,
}

/// Accept a JSON number, a numeric string, or null. A string that does not
/// parse as a number is treated as absent rather than failing the snapshot.
fn loose_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::Number(v)) => Some(v),
        Some(Raw::Text(s)) => s.trim().parse::<f64>().ok(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_fixture() -> LiveSnapshot {
        let json = std::fs::read_to_string("tests/data/live-snapshot.json").expect("fixture present");
        serde_json::from_str(&json).expect("parse live snapshot")
    }

    #[test]
    fn parses_fixture_snapshot() {
        let snapshot = load_fixture();
        assert_eq!(snapshot.water_level, Some(97.5));
        // delivered as a quoted string by the controller
        assert_eq!(snapshot.diesel_level, Some(96.0));
        assert_eq!(snapshot.battery_voltage, Some(12.6));
        assert_eq!(snapshot.pressure, Some(7.2));
        assert_eq!(snapshot.pumps.len(), 2);

        let jockey = &snapshot.pumps["jockey"];
        assert_eq!(jockey.status.as_deref(), Some("on"));
        assert_eq!(jockey.mode.as_deref(), Some("auto"));
    }

    #[test]
    fn accepts_snake_case_spellings() {
        let snapshot: LiveSnapshot = serde_json::from_str(
            r#"{"tank_level": 88, "diesel_level": 97, "battery_voltage": "12.1"}"#,
        )
        .expect("parse");
        assert_eq!(snapshot.water_level, Some(88.0));
        assert_eq!(snapshot.diesel_level, Some(97.0));
        assert_eq!(snapshot.battery_voltage, Some(12.1));
        assert_eq!(snapshot.pressure, None);
        assert!(snapshot.pumps.is_empty());
    }

    #[test]
    fn missing_and_garbage_fields_read_as_absent() {
        let snapshot: LiveSnapshot =
            serde_json::from_str(r#"{"waterLevel": "n/a"}"#).expect("parse");
        assert_eq!(snapshot.water_level, None);
        assert_eq!(snapshot.diesel_level, None);
    }

    #[test]
    fn pump_records_default_empty_fields() {
        let snapshot: LiveSnapshot =
            serde_json::from_str(r#"{"pumps": {"main": {}}}"#).expect("parse");
        let main = &snapshot.pumps["main"];
        assert_eq!(main.status, None);
        assert_eq!(main.mode, None);
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Category of monitored natural or security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardType {
    Earthquake,
    Tsunami,
    Volcano,
    Solar,
    Hurricane,
    Wildfire,
    SevereWeather,
    Flood,
    AirQuality,
    ThreatAdvisory,
    Drought,
}

impl HazardType {
    pub const ALL: [Self; 11] = [
        Self::Earthquake,
        Self::Tsunami,
        Self::Volcano,
        Self::Solar,
        Self::Hurricane,
        Self::Wildfire,
        Self::SevereWeather,
        Self::Flood,
        Self::AirQuality,
        Self::ThreatAdvisory,
        Self::Drought,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Earthquake => "earthquake",
            Self::Tsunami => "tsunami",
            Self::Volcano => "volcano",
            Self::Solar => "solar",
            Self::Hurricane => "hurricane",
            Self::Wildfire => "wildfire",
            Self::SevereWeather => "severe_weather",
            Self::Flood => "flood",
            Self::AirQuality => "air_quality",
            Self::ThreatAdvisory => "threat_advisory",
            Self::Drought => "drought",
        }
    }
}

impl std::fmt::Display for HazardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HazardType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|h| h.as_str() == s)
            .ok_or_else(|| format!("unknown hazard type '{s}'"))
    }
}

/// Severity as reported upstream: either a numeric scale (magnitude,
/// Kp-index, AQI) or an ordinal level name (volcano alert level,
/// drought category).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeverityValue {
    Scalar(f64),
    Level(String),
}

impl SeverityValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Level(_) => None,
        }
    }

    pub fn as_level(&self) -> Option<&str> {
        match self {
            Self::Scalar(_) => None,
            Self::Level(l) => Some(l),
        }
    }
}

impl std::fmt::Display for SeverityValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "{v}"),
            Self::Level(l) => f.write_str(l),
        }
    }
}

/// Canonical representation of one upstream event, produced by the
/// source-specific fetchers.
///
/// `identifier` is stable across repeated fetches of the same upstream
/// event; the deduplication ledger depends on that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HazardRecord {
    pub hazard_type: HazardType,
    pub identifier: String,
    pub severity: SeverityValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Event timestamp as reported upstream (RFC 3339).
    pub observed_at: String,
    /// Source-specific fields preserved for display. Never consulted by
    /// the threshold evaluator.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub raw_attributes: BTreeMap<String, serde_json::Value>,
}

impl HazardRecord {
    /// Human-readable one-line summary for webhook payloads and logs.
    pub fn summary(&self) -> String {
        let what = self.hazard_type.as_str();
        match &self.location {
            Some(loc) => format!("{what} {} at {loc}", self.severity),
            None => format!("{what} {}", self.severity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quake() -> HazardRecord {
        HazardRecord {
            hazard_type: HazardType::Earthquake,
            identifier: "us7000abcd".to_string(),
            severity: SeverityValue::Scalar(7.2),
            location: Some("Mexico".to_string()),
            observed_at: "2025-03-01T12:00:00Z".to_string(),
            raw_attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn hazard_type_round_trips_through_str() {
        for hazard in HazardType::ALL {
            let parsed: HazardType = hazard.as_str().parse().unwrap();
            assert_eq!(parsed, hazard);
        }
    }

    #[test]
    fn hazard_type_rejects_unknown() {
        assert!("meteor".parse::<HazardType>().is_err());
    }

    #[test]
    fn hazard_type_serde_is_snake_case() {
        let json = serde_json::to_string(&HazardType::SevereWeather).unwrap();
        assert_eq!(json, "\"severe_weather\"");
    }

    #[test]
    fn severity_serde_untagged() {
        let scalar: SeverityValue = serde_json::from_str("7.2").unwrap();
        assert_eq!(scalar.as_scalar(), Some(7.2));

        let level: SeverityValue = serde_json::from_str("\"WARNING\"").unwrap();
        assert_eq!(level.as_level(), Some("WARNING"));
    }

    #[test]
    fn summary_includes_location_when_present() {
        assert_eq!(quake().summary(), "earthquake 7.2 at Mexico");
    }

    #[test]
    fn summary_without_location() {
        let mut record = quake();
        record.location = None;
        assert_eq!(record.summary(), "earthquake 7.2");
    }

    #[test]
    fn summary_with_level_severity() {
        let record = HazardRecord {
            hazard_type: HazardType::Volcano,
            identifier: "gvp-263300".to_string(),
            severity: SeverityValue::Level("WARNING".to_string()),
            location: Some("Iceland".to_string()),
            observed_at: "2025-03-01T12:00:00Z".to_string(),
            raw_attributes: BTreeMap::new(),
        };
        assert_eq!(record.summary(), "volcano WARNING at Iceland");
    }
}

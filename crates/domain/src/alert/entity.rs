use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::hazard::entity::{HazardRecord, HazardType, SeverityValue};

/// How a configured threshold is compared against a record's severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// Numeric severity floor, inclusive: record matches when
    /// `severity >= threshold`.
    FloorInclusive,
    /// Ordinal allow-list membership; an empty list accepts all levels.
    AllowList,
}

/// Declarative binding of a hazard type to its threshold config field
/// and comparator. Config parsing consults this table so the evaluator
/// stays free of per-hazard branching.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdBinding {
    pub field: &'static str,
    pub comparator: Comparator,
}

/// Threshold field and comparator for a hazard type.
///
/// All numeric hazards in this domain are floors (more severe = larger
/// value); none use a ceiling.
pub fn threshold_binding(hazard: HazardType) -> ThresholdBinding {
    use Comparator::{AllowList, FloorInclusive};
    let (field, comparator) = match hazard {
        HazardType::Earthquake => ("min_magnitude", FloorInclusive),
        HazardType::Tsunami => ("alert_levels", AllowList),
        HazardType::Volcano => ("alert_levels", AllowList),
        HazardType::Solar => ("min_kp_index", FloorInclusive),
        HazardType::Hurricane => ("min_category", FloorInclusive),
        HazardType::Wildfire => ("min_acres", FloorInclusive),
        HazardType::SevereWeather => ("alert_levels", AllowList),
        HazardType::Flood => ("alert_levels", AllowList),
        HazardType::AirQuality => ("min_aqi", FloorInclusive),
        HazardType::ThreatAdvisory => ("alert_levels", AllowList),
        HazardType::Drought => ("alert_levels", AllowList),
    };
    ThresholdBinding { field, comparator }
}

/// Policy for records that carry no location while the rule has an
/// active region filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingLocationPolicy {
    /// Fail closed: a record without location never matches a
    /// region-filtered rule.
    #[default]
    Deny,
    /// Fail open: treat a missing location as matching any region.
    Allow,
}

/// User configuration for one hazard type.
///
/// Loaded at startup; may be hot-reloaded between poll cycles but never
/// mutated mid-evaluation of a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub enabled: bool,
    /// Inclusive numeric severity floor (magnitude, Kp-index, AQI).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_floor: Option<f64>,
    /// Ordinal level allow-list; empty accepts all levels.
    #[serde(default)]
    pub allowed_levels: Vec<String>,
    /// Geographic allow-list; empty means global.
    #[serde(default)]
    pub regions: Vec<String>,
    /// Delivery target. Absent disables dispatch; evaluation still runs
    /// so dry-run rules show up in logs and cycle summaries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub missing_location: MissingLocationPolicy,
}

impl AlertRule {
    /// Enabled rule with no thresholds: matches every record of its
    /// hazard type.
    pub fn match_all() -> Self {
        Self {
            enabled: true,
            severity_floor: None,
            allowed_levels: Vec::new(),
            regions: Vec::new(),
            webhook_url: None,
            missing_location: MissingLocationPolicy::default(),
        }
    }
}

/// Alert rules keyed by hazard type.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: HashMap<HazardType, AlertRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, hazard: HazardType, rule: AlertRule) {
        self.rules.insert(hazard, rule);
    }

    /// Rule for a hazard type; `None` means the type is not monitored.
    pub fn rule_for(&self, hazard: HazardType) -> Option<&AlertRule> {
        self.rules.get(&hazard)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<(HazardType, AlertRule)> for RuleSet {
    fn from_iter<I: IntoIterator<Item = (HazardType, AlertRule)>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

/// JSON body POSTed to a webhook for one matching event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    pub hazard_type: HazardType,
    pub identifier: String,
    pub severity: SeverityValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub observed_at: String,
    pub summary: String,
}

impl AlertPayload {
    pub fn from_record(record: &HazardRecord) -> Self {
        Self {
            hazard_type: record.hazard_type,
            identifier: record.identifier.clone(),
            severity: record.severity.clone(),
            location: record.location.clone(),
            observed_at: record.observed_at.clone(),
            summary: record.summary(),
        }
    }
}

/// Result of one webhook delivery, after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A 2xx response was received.
    Delivered { attempts: usize },
    /// All attempts exhausted, or a fatal failure occurred.
    Failed { reason: String, attempts: usize },
    /// The rule has no webhook URL configured.
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn quake_record() -> HazardRecord {
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
    fn numeric_hazards_bind_floor_comparators() {
        for hazard in [
            HazardType::Earthquake,
            HazardType::Solar,
            HazardType::AirQuality,
        ] {
            let binding = threshold_binding(hazard);
            assert_eq!(binding.comparator, Comparator::FloorInclusive);
            assert!(binding.field.starts_with("min_"), "{}", binding.field);
        }
    }

    #[test]
    fn ordinal_hazards_bind_allow_lists() {
        for hazard in [
            HazardType::Volcano,
            HazardType::Tsunami,
            HazardType::Drought,
        ] {
            let binding = threshold_binding(hazard);
            assert_eq!(binding.comparator, Comparator::AllowList);
            assert_eq!(binding.field, "alert_levels");
        }
    }

    #[test]
    fn missing_location_defaults_to_deny() {
        assert_eq!(
            MissingLocationPolicy::default(),
            MissingLocationPolicy::Deny
        );
    }

    #[test]
    fn payload_carries_record_fields_and_summary() {
        let payload = AlertPayload::from_record(&quake_record());
        let json: serde_json::Value = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["hazard_type"], "earthquake");
        assert_eq!(json["identifier"], "us7000abcd");
        assert_eq!(json["severity"], 7.2);
        assert_eq!(json["location"], "Mexico");
        assert_eq!(json["observed_at"], "2025-03-01T12:00:00Z");
        assert_eq!(json["summary"], "earthquake 7.2 at Mexico");
    }

    #[test]
    fn payload_omits_absent_location() {
        let mut record = quake_record();
        record.location = None;
        let json = serde_json::to_value(AlertPayload::from_record(&record)).unwrap();
        assert!(json.get("location").is_none());
    }

    #[test]
    fn ruleset_lookup() {
        let rules: RuleSet =
            [(HazardType::Earthquake, AlertRule::match_all())].into_iter().collect();

        assert_eq!(rules.len(), 1);
        assert!(rules.rule_for(HazardType::Earthquake).is_some());
        assert!(rules.rule_for(HazardType::Tsunami).is_none());
    }
}

use crate::alert::entity::{AlertRule, MissingLocationPolicy};
use crate::hazard::entity::HazardRecord;

/// Decide whether a record crosses the rule's thresholds.
///
/// Pure function: no I/O, no shared state. Malformed input (severity
/// kind not matching the configured threshold kind) is treated as a
/// non-match rather than an error, so a degraded upstream source never
/// crashes alerting.
pub fn evaluate(record: &HazardRecord, rule: &AlertRule) -> bool {
    if !rule.enabled {
        return false;
    }

    // Numeric floor, inclusive: severity >= floor.
    if let Some(floor) = rule.severity_floor {
        match record.severity.as_scalar() {
            Some(value) if value >= floor => {}
            _ => return false,
        }
    }

    // Ordinal allow-list; empty list accepts all levels.
    if !rule.allowed_levels.is_empty() {
        match record.severity.as_level() {
            Some(level)
                if rule
                    .allowed_levels
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(level)) => {}
            _ => return false,
        }
    }

    // Region filter: case-insensitive substring intersection, matching
    // how upstream place strings are reported ("10km SSW of X, Mexico").
    if !rule.regions.is_empty() {
        match &record.location {
            Some(location) => {
                let location = location.to_lowercase();
                if !rule
                    .regions
                    .iter()
                    .any(|region| location.contains(&region.to_lowercase()))
                {
                    return false;
                }
            }
            None => {
                if rule.missing_location == MissingLocationPolicy::Deny {
                    return false;
                }
            }
        }
    }

    true
}

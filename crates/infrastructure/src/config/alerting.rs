//! Alerting configuration structs and conversion into domain rules.

use std::collections::BTreeMap;
use std::time::Duration;

use domain::alert::entity::{
    AlertRule, Comparator, MissingLocationPolicy, RuleSet, threshold_binding,
};
use domain::hazard::entity::HazardType;
use serde::{Deserialize, Serialize};

use super::common::{ConfigError, default_true};
use crate::constants::{
    DEFAULT_BREAKER_OPEN_SECS, DEFAULT_BREAKER_THRESHOLD, DEFAULT_CYCLE_DEADLINE_SECS,
    DEFAULT_DEDUP_RETENTION_HOURS, DEFAULT_WEBHOOK_BASE_BACKOFF_MS, DEFAULT_WEBHOOK_MAX_ATTEMPTS,
    DEFAULT_WEBHOOK_MAX_BACKOFF_SECS, DEFAULT_WEBHOOK_TIMEOUT_SECS,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_dedup_retention_hours")]
    pub dedup_retention_hours: u64,

    #[serde(default = "default_cycle_deadline_secs")]
    pub cycle_deadline_secs: u64,

    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Rules keyed by hazard type name (`earthquake`, `tsunami`, ...).
    #[serde(default)]
    pub rules: BTreeMap<String, AlertRuleConfig>,
}

fn default_dedup_retention_hours() -> u64 {
    DEFAULT_DEDUP_RETENTION_HOURS
}
fn default_cycle_deadline_secs() -> u64 {
    DEFAULT_CYCLE_DEADLINE_SECS
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dedup_retention_hours: default_dedup_retention_hours(),
            cycle_deadline_secs: default_cycle_deadline_secs(),
            webhook: WebhookConfig::default(),
            rules: BTreeMap::new(),
        }
    }
}

impl AlertingConfig {
    pub fn dedup_retention(&self) -> Duration {
        Duration::from_secs(self.dedup_retention_hours * 3600)
    }

    pub fn cycle_deadline(&self) -> Duration {
        Duration::from_secs(self.cycle_deadline_secs)
    }

    /// Convert configured rules into the domain rule set.
    ///
    /// Returns an empty set when alerting is disabled, so the caller's
    /// poll loop degrades to fetch-only.
    pub fn alert_rules(&self) -> Result<RuleSet, ConfigError> {
        if !self.enabled {
            tracing::warn!("alerting disabled; no rules will be loaded");
            return Ok(RuleSet::new());
        }
        self.rules
            .iter()
            .map(|(name, rule)| {
                let hazard = parse_hazard_key(name)?;
                Ok((hazard, rule.resolve(hazard)?))
            })
            .collect()
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.dedup_retention_hours == 0 {
            return Err(ConfigError::Validation {
                field: "alerting.dedup_retention_hours".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.cycle_deadline_secs == 0 {
            return Err(ConfigError::Validation {
                field: "alerting.cycle_deadline_secs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        self.webhook.validate()?;
        for (name, rule) in &self.rules {
            let hazard = parse_hazard_key(name)?;
            rule.resolve(hazard)?;
        }
        Ok(())
    }
}

fn parse_hazard_key(name: &str) -> Result<HazardType, ConfigError> {
    name.parse().map_err(|_| ConfigError::InvalidValue {
        field: "alerting.rules".to_string(),
        value: name.to_string(),
        expected: HazardType::ALL.map(HazardType::as_str).join(", "),
    })
}

/// Webhook delivery tuning shared by all destinations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,

    /// Total delivery attempts per dispatch, including the first.
    #[serde(default = "default_webhook_attempts")]
    pub max_attempts: usize,

    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Consecutive dispatch failures before a destination's circuit opens.
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: usize,

    #[serde(default = "default_breaker_open_secs")]
    pub breaker_open_secs: u64,
}

fn default_webhook_timeout() -> u64 {
    DEFAULT_WEBHOOK_TIMEOUT_SECS
}
fn default_webhook_attempts() -> usize {
    DEFAULT_WEBHOOK_MAX_ATTEMPTS
}
fn default_base_backoff_ms() -> u64 {
    DEFAULT_WEBHOOK_BASE_BACKOFF_MS
}
fn default_max_backoff_secs() -> u64 {
    DEFAULT_WEBHOOK_MAX_BACKOFF_SECS
}
fn default_breaker_threshold() -> usize {
    DEFAULT_BREAKER_THRESHOLD
}
fn default_breaker_open_secs() -> u64 {
    DEFAULT_BREAKER_OPEN_SECS
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_webhook_timeout(),
            max_attempts: default_webhook_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_secs: default_max_backoff_secs(),
            breaker_threshold: default_breaker_threshold(),
            breaker_open_secs: default_breaker_open_secs(),
        }
    }
}

impl WebhookConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn breaker_open_period(&self) -> Duration {
        Duration::from_secs(self.breaker_open_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Validation {
                field: "alerting.webhook.max_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation {
                field: "alerting.webhook.timeout_secs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.breaker_threshold == 0 {
            return Err(ConfigError::Validation {
                field: "alerting.webhook.breaker_threshold".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// One hazard type's alert rule as written in YAML.
///
/// The threshold field name depends on the hazard type (`min_magnitude`
/// for earthquakes, `min_kp_index` for solar, `alert_levels` for level
/// hazards); it is captured via the flattened map and checked against
/// the hazard's threshold binding during validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRuleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub regions: Vec<String>,

    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default)]
    pub missing_location: MissingLocationPolicy,

    #[serde(flatten)]
    pub thresholds: BTreeMap<String, serde_yaml_ng::Value>,
}

impl AlertRuleConfig {
    pub(super) fn resolve(&self, hazard: HazardType) -> Result<AlertRule, ConfigError> {
        let prefix = format!("alerting.rules.{hazard}");

        if let Some(url) = &self.webhook_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(ConfigError::Validation {
                field: format!("{prefix}.webhook_url"),
                message: format!("'{url}' is not an http(s) URL"),
            });
        }

        let binding = threshold_binding(hazard);
        let mut severity_floor = None;
        let mut allowed_levels = Vec::new();

        for (key, value) in &self.thresholds {
            if key != binding.field {
                return Err(ConfigError::InvalidValue {
                    field: format!("{prefix}.{key}"),
                    value: key.clone(),
                    expected: binding.field.to_string(),
                });
            }
            match binding.comparator {
                Comparator::FloorInclusive => {
                    let floor = value.as_f64().ok_or_else(|| ConfigError::Validation {
                        field: format!("{prefix}.{key}"),
                        message: "expected a number".to_string(),
                    })?;
                    if !floor.is_finite() {
                        return Err(ConfigError::Validation {
                            field: format!("{prefix}.{key}"),
                            message: "must be a finite number".to_string(),
                        });
                    }
                    severity_floor = Some(floor);
                }
                Comparator::AllowList => {
                    let seq = value.as_sequence().ok_or_else(|| ConfigError::Validation {
                        field: format!("{prefix}.{key}"),
                        message: "expected a list of level names".to_string(),
                    })?;
                    for item in seq {
                        let level = item.as_str().ok_or_else(|| ConfigError::Validation {
                            field: format!("{prefix}.{key}"),
                            message: "levels must be strings".to_string(),
                        })?;
                        allowed_levels.push(level.to_string());
                    }
                }
            }
        }

        Ok(AlertRule {
            enabled: self.enabled,
            severity_floor,
            allowed_levels,
            regions: self.regions.clone(),
            webhook_url: self.webhook_url.clone(),
            missing_location: self.missing_location,
        })
    }
}

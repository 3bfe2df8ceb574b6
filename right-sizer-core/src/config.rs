//! Immutable per-tick configuration snapshot.
//!
//! A [`Config`] is produced externally (from the policy/global-config
//! custom resources, which are out of scope for this crate) and consumed
//! read-only by every component for the duration of a single tick. Live
//! reload is safe because the orchestration loop only ever reads a cloned
//! snapshot at the start of a tick; see `right-sizer-runtime`'s controller
//! module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

fn default_resize_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_retry_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_max_deferral_time() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_resize_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_decision_log_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_delay_between_pods() -> Duration {
    Duration::from_millis(500)
}

fn default_delay_between_batches() -> Duration {
    Duration::from_secs(5)
}

/// Resolved configuration for a single right-sizing tick.
///
/// Field names mirror the options enumerated in the specification's data
/// model so that a YAML/JSON policy document maps onto this struct
/// directly via `serde`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_resize_interval", with = "humantime_duration")]
    pub resize_interval: Duration,

    #[serde(default = "Thresholds::default")]
    pub thresholds: Thresholds,

    #[serde(default = "Sizing::default")]
    pub sizing: Sizing,

    #[serde(default = "Limits::default")]
    pub limits: Limits,

    #[serde(default)]
    pub preserve_guaranteed_qos: bool,
    #[serde(default)]
    pub force_guaranteed_for_critical: bool,
    #[serde(default)]
    pub qos_transition_warning: bool,

    #[serde(default)]
    pub update_resize_policy: bool,

    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_delay_between_batches", with = "humantime_duration")]
    pub delay_between_batches: Duration,
    #[serde(default = "default_delay_between_pods", with = "humantime_duration")]
    pub delay_between_pods: Duration,
    #[serde(default = "default_max_pods_per_run")]
    pub max_pods_per_run: usize,

    #[serde(default)]
    pub system_namespaces: BTreeSet<String>,
    #[serde(default)]
    pub namespace_include: BTreeSet<String>,
    #[serde(default)]
    pub namespace_exclude: BTreeSet<String>,

    #[serde(default = "default_retry_interval", with = "humantime_duration")]
    pub retry_interval: Duration,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_deferral_time", with = "humantime_duration")]
    pub max_deferral_time: Duration,
    #[serde(default = "default_resize_timeout", with = "humantime_duration")]
    pub resize_timeout: Duration,

    #[serde(default = "default_decision_log_ttl", with = "humantime_duration")]
    pub decision_log_ttl: Duration,
}

fn default_batch_size() -> usize {
    3
}

fn default_max_pods_per_run() -> usize {
    50
}

fn default_max_retries() -> u32 {
    5
}

/// Usage/limit ratio thresholds, in `[0, 1]`, that trigger a scale
/// direction. See the decision engine (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub cpu_scale_up: f64,
    pub cpu_scale_down: f64,
    pub mem_scale_up: f64,
    pub mem_scale_down: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            cpu_scale_up: 0.8,
            cpu_scale_down: 0.3,
            mem_scale_up: 0.8,
            mem_scale_down: 0.3,
        }
    }
}

/// Request-sizing multipliers/additions used by the resource calculator
/// (§4.2). Additions are in canonical units (millicores, bytes).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sizing {
    pub cpu_request_multiplier: f64,
    pub cpu_request_addition: i64,
    pub memory_request_multiplier: f64,
    pub memory_request_addition: i64,
    pub cpu_limit_multiplier: f64,
    pub cpu_limit_addition: i64,
    pub memory_limit_multiplier: f64,
    pub memory_limit_addition: i64,
}

impl Default for Sizing {
    fn default() -> Self {
        Sizing {
            cpu_request_multiplier: 1.2,
            cpu_request_addition: 0,
            memory_request_multiplier: 1.2,
            memory_request_addition: 0,
            cpu_limit_multiplier: 2.0,
            cpu_limit_addition: 0,
            memory_limit_multiplier: 2.0,
            memory_limit_addition: 0,
        }
    }
}

/// Minima/maxima clamps, in canonical units.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Limits {
    pub min_cpu_request: i64,
    pub min_memory_request: i64,
    pub max_cpu_limit: i64,
    pub max_memory_limit: i64,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            min_cpu_request: 10,                   // 10m
            min_memory_request: 16 * 1024 * 1024,  // 16Mi
            max_cpu_limit: 16_000,                 // 16 cores
            max_memory_limit: 32 * 1024 * 1024 * 1024, // 32Gi
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            resize_interval: default_resize_interval(),
            thresholds: Thresholds::default(),
            sizing: Sizing::default(),
            limits: Limits::default(),
            preserve_guaranteed_qos: true,
            force_guaranteed_for_critical: false,
            qos_transition_warning: true,
            update_resize_policy: true,
            dry_run: false,
            batch_size: default_batch_size(),
            delay_between_batches: default_delay_between_batches(),
            delay_between_pods: default_delay_between_pods(),
            max_pods_per_run: default_max_pods_per_run(),
            system_namespaces: ["kube-system", "kube-public", "kube-node-lease"]
                .into_iter()
                .map(String::from)
                .collect(),
            namespace_include: BTreeSet::new(),
            namespace_exclude: BTreeSet::new(),
            retry_interval: default_retry_interval(),
            max_retries: default_max_retries(),
            max_deferral_time: default_max_deferral_time(),
            resize_timeout: default_resize_timeout(),
            decision_log_ttl: default_decision_log_ttl(),
        }
    }
}

impl Config {
    /// Validate cross-field constraints that are awkward to express via
    /// `serde` defaults alone. Invalid configuration is a warning, not a
    /// hard failure: per §7 the core continues with the computed union of
    /// include/exclude rather than refusing to run.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let overlap: Vec<&String> = self
            .namespace_include
            .intersection(&self.namespace_exclude)
            .collect();
        if !overlap.is_empty() {
            warnings.push(format!(
                "namespaceInclude and namespaceExclude overlap on {overlap:?}; exclude wins"
            ));
        }
        if self.batch_size == 0 {
            warnings.push("batchSize is zero; treating as 1".to_string());
        }
        warnings
    }
}

/// `serde` helper for (de)serializing [`Duration`] as a human-readable
/// string (e.g. `"30s"`, `"500ms"`) rather than a nanosecond count, to keep
/// the policy document legible.
mod humantime_duration {
    use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        format!("{}ms", value.as_millis()).serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(de)?;
        parse(&raw).map_err(D::Error::custom)
    }

    fn parse(raw: &str) -> Result<Duration, String> {
        let raw = raw.trim();
        let (num, suffix) = raw
            .find(|c: char| c.is_alphabetic())
            .map(|i| raw.split_at(i))
            .ok_or_else(|| format!("duration {raw:?} has no unit suffix"))?;
        let value: f64 = num
            .parse()
            .map_err(|_| format!("duration {raw:?} has an invalid numeric part"))?;
        let millis = match suffix {
            "ms" => value,
            "s" => value * 1_000.0,
            "m" => value * 60_000.0,
            "h" => value * 3_600_000.0,
            other => return Err(format!("unknown duration unit {other:?}")),
        };
        Ok(Duration::from_millis(millis.round() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_internally_consistent() {
        let cfg = Config::default();
        assert!(cfg.validate().is_empty());
        assert!(cfg.limits.max_cpu_limit > cfg.limits.min_cpu_request);
    }

    #[test]
    fn flags_overlapping_namespace_filters() {
        let mut cfg = Config::default();
        cfg.namespace_include.insert("payments".into());
        cfg.namespace_exclude.insert("payments".into());
        assert_eq!(cfg.validate().len(), 1);
    }

    #[test]
    fn roundtrips_through_yaml() {
        let cfg = Config::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(cfg, back);
    }
}

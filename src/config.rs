// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Engine configuration (`spec.md` §6).
//!
//! Every key is optional and falls back to its documented default; an
//! unparseable value for a key is logged and the default is used for that
//! key alone, never treated as a fatal error — `spec.md` §6 asks for the
//! engine to run with sane defaults even from a malformed config file.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::events::AlertLevel;
use crate::heap_walker::HeapWalkMode;
use crate::phase::MigrationHistory;

/// Engine configuration, fully resolved (no further defaulting needed once
/// built).
#[derive(Debug, Clone)]
pub struct Config {
    /// `heap.walk.mode`, default [`HeapWalkMode::Full`].
    pub heap_walk_mode: HeapWalkMode,
    /// `timeout.heap.walk`, default no timeout.
    pub heap_walk_timeout: Duration,
    /// `timeout.heap.snapshot`, default no timeout.
    pub heap_snapshot_timeout: Duration,
    /// `timeout.critical.phase`, default no timeout.
    pub critical_phase_timeout: Duration,
    /// `timeout.smoke.test`, default no timeout.
    pub smoke_test_timeout: Duration,
    /// `heap.size.min`, in MiB, default 0 (no lower bound check).
    pub heap_size_min: u64,
    /// `heap.size.max`, in MiB, default 0 (no upper bound check).
    pub heap_size_max: u64,
    /// `history.size`, default [`MigrationHistory::DEFAULT_CAPACITY`].
    pub history_size: usize,
    /// `alert.level`, default [`AlertLevel::Warning`].
    pub alert_level: AlertLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heap_walk_mode: HeapWalkMode::Full,
            heap_walk_timeout: Duration::ZERO,
            heap_snapshot_timeout: Duration::ZERO,
            critical_phase_timeout: Duration::ZERO,
            smoke_test_timeout: Duration::ZERO,
            heap_size_min: 0,
            heap_size_max: 0,
            history_size: MigrationHistory::DEFAULT_CAPACITY,
            alert_level: AlertLevel::Warning,
        }
    }
}

/// Mirrors [`Config`] with every field optional, the shape a YAML document
/// is deserialized into before defaulting (`spec.md` §6: unknown keys are
/// ignored, which `serde`'s default behavior already gives us; missing keys
/// fall back to [`Config::default`]).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct RawConfig {
    heap_walk_mode: Option<String>,
    timeout_heap_walk_ms: Option<u64>,
    timeout_heap_snapshot_ms: Option<u64>,
    timeout_critical_phase_ms: Option<u64>,
    timeout_smoke_test_ms: Option<u64>,
    heap_size_min: Option<u64>,
    heap_size_max: Option<u64>,
    history_size: Option<usize>,
    alert_level: Option<String>,
}

impl Config {
    /// Loads configuration from a YAML document, defaulting any missing or
    /// unparseable key.
    #[must_use]
    pub fn from_yaml(source: &str) -> Self {
        let raw: RawConfig = serde_yaml::from_str(source).unwrap_or_else(|error| {
            tracing::warn!(%error, "config yaml failed to parse, using defaults");
            RawConfig::default()
        });
        Self::from_raw(&raw)
    }

    /// Loads configuration from a flat `key=value` properties file, one
    /// assignment per line, `#`-prefixed comments and blank lines ignored.
    #[must_use]
    pub fn from_properties(source: &str) -> Self {
        let mut map: HashMap<String, String> = HashMap::new();
        for line in source.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                tracing::warn!(line, "config line missing '=', ignored");
                continue;
            };
            map.insert(key.trim().to_string(), value.trim().to_string());
        }

        let mut config = Self::default();
        if let Some(mode) = map.get("heap.walk.mode") {
            config.heap_walk_mode = parse_mode(mode).unwrap_or_else(|| {
                tracing::warn!(value = mode, "invalid heap.walk.mode, using default");
                config.heap_walk_mode
            });
        }
        if let Some(raw) = map.get("timeout.heap.walk") {
            config.heap_walk_timeout = parse_millis(raw, "timeout.heap.walk", config.heap_walk_timeout);
        }
        if let Some(raw) = map.get("timeout.heap.snapshot") {
            config.heap_snapshot_timeout =
                parse_millis(raw, "timeout.heap.snapshot", config.heap_snapshot_timeout);
        }
        if let Some(raw) = map.get("timeout.critical.phase") {
            config.critical_phase_timeout =
                parse_millis(raw, "timeout.critical.phase", config.critical_phase_timeout);
        }
        if let Some(raw) = map.get("timeout.smoke.test") {
            config.smoke_test_timeout =
                parse_millis(raw, "timeout.smoke.test", config.smoke_test_timeout);
        }
        if let Some(raw) = map.get("heap.size.min") {
            config.heap_size_min = parse_u64(raw, "heap.size.min", config.heap_size_min);
        }
        if let Some(raw) = map.get("heap.size.max") {
            config.heap_size_max = parse_u64(raw, "heap.size.max", config.heap_size_max);
        }
        if let Some(raw) = map.get("history.size") {
            let parsed = raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = raw, "invalid history.size, using default");
                config.history_size
            });
            config.history_size = validate_history_size(parsed, config.history_size);
        }
        if let Some(raw) = map.get("alert.level") {
            config.alert_level = AlertLevel::parse(raw).unwrap_or_else(|| {
                tracing::warn!(value = raw, "invalid alert.level, using default");
                config.alert_level
            });
        }
        config
    }

    fn from_raw(raw: &RawConfig) -> Self {
        let default = Self::default();
        Self {
            heap_walk_mode: raw
                .heap_walk_mode
                .as_deref()
                .and_then(parse_mode)
                .unwrap_or(default.heap_walk_mode),
            heap_walk_timeout: raw
                .timeout_heap_walk_ms
                .map_or(default.heap_walk_timeout, Duration::from_millis),
            heap_snapshot_timeout: raw
                .timeout_heap_snapshot_ms
                .map_or(default.heap_snapshot_timeout, Duration::from_millis),
            critical_phase_timeout: raw
                .timeout_critical_phase_ms
                .map_or(default.critical_phase_timeout, Duration::from_millis),
            smoke_test_timeout: raw
                .timeout_smoke_test_ms
                .map_or(default.smoke_test_timeout, Duration::from_millis),
            heap_size_min: raw.heap_size_min.unwrap_or(default.heap_size_min),
            heap_size_max: raw.heap_size_max.unwrap_or(default.heap_size_max),
            history_size: validate_history_size(
                raw.history_size.unwrap_or(default.history_size),
                default.history_size,
            ),
            alert_level: raw
                .alert_level
                .as_deref()
                .and_then(AlertLevel::parse)
                .unwrap_or(default.alert_level),
        }
    }
}

fn parse_mode(raw: &str) -> Option<HeapWalkMode> {
    match raw.to_ascii_uppercase().as_str() {
        "FULL" => Some(HeapWalkMode::Full),
        "SPEC" => Some(HeapWalkMode::Spec),
        _ => None,
    }
}

fn parse_millis(raw: &str, key: &str, default: Duration) -> Duration {
    raw.parse().map(Duration::from_millis).unwrap_or_else(|_| {
        tracing::warn!(value = raw, key, "invalid duration, using default");
        default
    })
}

fn parse_u64(raw: &str, key: &str, default: u64) -> u64 {
    raw.parse().unwrap_or_else(|_| {
        tracing::warn!(value = raw, key, "invalid integer, using default");
        default
    })
}

/// `history.size` must be > 0 (`spec.md` §6); a parsed `0` is semantically
/// invalid the same way an unparseable value is, so it falls back to
/// `default` with a warning instead of producing a history that silently
/// retains nothing.
fn validate_history_size(value: usize, default: usize) -> usize {
    if value == 0 {
        tracing::warn!("history.size must be > 0, using default");
        default
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let config = Config::default();
        assert_eq!(config.heap_walk_mode, HeapWalkMode::Full);
        assert_eq!(config.heap_walk_timeout, Duration::ZERO);
        assert_eq!(config.history_size, 10);
        assert_eq!(config.alert_level, AlertLevel::Warning);
    }

    #[test]
    fn properties_parses_recognized_keys() {
        let source = "heap.walk.mode=SPEC\ntimeout.heap.walk=500\nhistory.size=3\nalert.level=error\n";
        let config = Config::from_properties(source);
        assert_eq!(config.heap_walk_mode, HeapWalkMode::Spec);
        assert_eq!(config.heap_walk_timeout, Duration::from_millis(500));
        assert_eq!(config.history_size, 3);
        assert_eq!(config.alert_level, AlertLevel::Error);
    }

    #[test]
    fn properties_ignores_comments_and_blank_lines() {
        let source = "# comment\n\nheap.size.min=10\n";
        let config = Config::from_properties(source);
        assert_eq!(config.heap_size_min, 10);
    }

    #[test]
    fn unparseable_value_falls_back_to_default_non_fatally() {
        let config = Config::from_properties("history.size=not-a-number\n");
        assert_eq!(config.history_size, Config::default().history_size);
    }

    #[test]
    fn zero_history_size_falls_back_to_default_from_properties() {
        let config = Config::from_properties("history.size=0\n");
        assert_eq!(config.history_size, Config::default().history_size);
    }

    #[test]
    fn zero_history_size_falls_back_to_default_from_yaml() {
        let config = Config::from_yaml("history-size: 0\n");
        assert_eq!(config.history_size, Config::default().history_size);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = Config::from_properties("totally.unknown.key=1\nheap.size.max=7\n");
        assert_eq!(config.heap_size_max, 7);
    }

    #[test]
    fn yaml_loads_known_keys_and_defaults_the_rest() {
        let yaml = "heap-walk-mode: spec\nhistory-size: 4\n";
        let config = Config::from_yaml(yaml);
        assert_eq!(config.heap_walk_mode, HeapWalkMode::Spec);
        assert_eq!(config.history_size, 4);
        assert_eq!(config.alert_level, AlertLevel::Warning);
    }

    #[test]
    fn malformed_yaml_falls_back_to_full_default() {
        let config = Config::from_yaml("not: valid: yaml: [");
        assert_eq!(config.heap_walk_mode, Config::default().heap_walk_mode);
    }
}

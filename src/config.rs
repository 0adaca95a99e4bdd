//! Per-set configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ObservableError, ObservableResult};

/// Largest accepted `listener_capacity`.
pub const MAX_LISTENER_CAPACITY: usize = 1024;

/// What `add` does when a listener returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPolicy {
    /// Stop notifying for this element and return the error from `add`.
    ///
    /// The element stays inserted and listeners later in the snapshot are
    /// not called for it.
    #[default]
    FailFast,
    /// Call every listener, log and count each failure, and report success.
    Isolate,
}

/// Observable set configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObservableSetConfig {
    /// Listener failure handling.
    pub notify_policy: NotifyPolicy,
    /// Initial capacity of the listener registry, at most
    /// [`MAX_LISTENER_CAPACITY`].
    pub listener_capacity: usize,
}

impl Default for ObservableSetConfig {
    fn default() -> Self {
        Self {
            notify_policy: NotifyPolicy::FailFast,
            listener_capacity: 4,
        }
    }
}

impl ObservableSetConfig {
    /// Returns this config with `policy` as the notify policy.
    #[must_use]
    pub fn with_notify_policy(mut self, policy: NotifyPolicy) -> Self {
        self.notify_policy = policy;
        self
    }

    /// Checks field ranges.
    ///
    /// # Errors
    ///
    /// Returns `ObservableError::Config` if `listener_capacity` exceeds
    /// [`MAX_LISTENER_CAPACITY`].
    pub fn validate(&self) -> ObservableResult<()> {
        if self.listener_capacity > MAX_LISTENER_CAPACITY {
            return Err(ObservableError::config(format!(
                "listener_capacity {} exceeds maximum {MAX_LISTENER_CAPACITY}",
                self.listener_capacity
            )));
        }
        Ok(())
    }

    /// Parses and validates a config from JSON. Missing fields take their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns `ObservableError::Config` if the JSON is malformed or names an
    /// unknown field or policy, or if [`validate`](Self::validate) rejects it.
    ///
    /// # Examples
    ///
    /// ```
    /// use observable_set::{NotifyPolicy, ObservableSetConfig};
    ///
    /// let cfg = ObservableSetConfig::from_json(r#"{ "notify_policy": "isolate" }"#).unwrap();
    /// assert_eq!(cfg.notify_policy, NotifyPolicy::Isolate);
    /// assert_eq!(cfg.listener_capacity, 4);
    /// ```
    pub fn from_json(json: &str) -> ObservableResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ObservableError::config(format!("invalid observable set config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_fail_fast() {
        let cfg = ObservableSetConfig::default();
        assert_eq!(cfg.notify_policy, NotifyPolicy::FailFast);
        assert_eq!(
            cfg.with_notify_policy(NotifyPolicy::Isolate).notify_policy,
            NotifyPolicy::Isolate
        );
    }

    #[test]
    fn from_json_fills_missing_fields() {
        let cfg = ObservableSetConfig::from_json("{}").unwrap();
        assert_eq!(cfg, ObservableSetConfig::default());

        let cfg = ObservableSetConfig::from_json(r#"{ "listener_capacity": 32 }"#).unwrap();
        assert_eq!(cfg.listener_capacity, 32);
        assert_eq!(cfg.notify_policy, NotifyPolicy::FailFast);
    }

    #[test]
    fn from_json_rejects_unknown_policy() {
        let err = ObservableSetConfig::from_json(r#"{ "notify_policy": "retry" }"#).unwrap_err();
        assert!(err.is_config());
        assert!(format!("{err}").contains("invalid observable set config"));
    }

    #[test]
    fn from_json_rejects_unknown_field() {
        let err = ObservableSetConfig::from_json(r#"{ "priority": 1 }"#).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn from_json_rejects_oversized_capacity() {
        let err = ObservableSetConfig::from_json(r#"{ "listener_capacity": 18446744073709551615 }"#)
            .unwrap_err();
        assert!(err.is_config());
        assert!(format!("{err}").contains("exceeds maximum"));

        let json = format!(r#"{{ "listener_capacity": {MAX_LISTENER_CAPACITY} }}"#);
        let cfg = ObservableSetConfig::from_json(&json).unwrap();
        assert_eq!(cfg.listener_capacity, MAX_LISTENER_CAPACITY);
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = ObservableSetConfig {
            notify_policy: NotifyPolicy::Isolate,
            listener_capacity: 0,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"isolate\""));
        assert_eq!(ObservableSetConfig::from_json(&json).unwrap(), cfg);
    }
}

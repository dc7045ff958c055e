//! Replicator configuration.

use crate::error::{BroadcastError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for a single replicator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatorSettings {
    /// How often unacknowledged envelopes are checked for redelivery.
    pub resend_interval: Duration,
    /// How long a peer has to acknowledge an envelope before it is sent again.
    pub retry_timeout: Duration,
    /// Only cluster members carrying this role take part in replication.
    /// `None` accepts every member.
    pub role: Option<String>,
}

impl Default for ReplicatorSettings {
    fn default() -> Self {
        Self {
            resend_interval: Duration::from_secs(5),
            retry_timeout: Duration::from_secs(10),
            role: None,
        }
    }
}

impl ReplicatorSettings {
    pub fn builder() -> ReplicatorSettingsBuilder {
        ReplicatorSettingsBuilder::new()
    }

    /// True if a member with the given roles should be invited.
    pub fn accepts_roles<'a, I>(&self, roles: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        match &self.role {
            None => true,
            Some(role) => roles.into_iter().any(|r| r == role),
        }
    }
}

/// Builder for replicator settings.
pub struct ReplicatorSettingsBuilder {
    settings: ReplicatorSettings,
}

impl ReplicatorSettingsBuilder {
    pub fn new() -> Self {
        Self {
            settings: ReplicatorSettings::default(),
        }
    }

    pub fn resend_interval(mut self, interval: Duration) -> Self {
        self.settings.resend_interval = interval;
        self
    }

    pub fn retry_timeout(mut self, timeout: Duration) -> Self {
        self.settings.retry_timeout = timeout;
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.settings.role = Some(role.into());
        self
    }

    pub fn build(self) -> Result<ReplicatorSettings> {
        let settings = self.settings;
        if settings.resend_interval.is_zero() {
            return Err(BroadcastError::InvalidSettings(
                "resend interval must be greater than zero".into(),
            ));
        }
        if settings.retry_timeout.is_zero() {
            return Err(BroadcastError::InvalidSettings(
                "retry timeout must be greater than zero".into(),
            ));
        }
        if matches!(&settings.role, Some(role) if role.is_empty()) {
            return Err(BroadcastError::InvalidSettings(
                "role must not be empty".into(),
            ));
        }
        Ok(settings)
    }
}

impl Default for ReplicatorSettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ReplicatorSettings::default();
        assert_eq!(settings.resend_interval, Duration::from_secs(5));
        assert_eq!(settings.retry_timeout, Duration::from_secs(10));
        assert!(settings.role.is_none());
        assert!(settings.accepts_roles(["anything"]));
    }

    #[test]
    fn test_builder_validates() {
        let settings = ReplicatorSettings::builder()
            .resend_interval(Duration::from_millis(100))
            .retry_timeout(Duration::from_millis(300))
            .role("replicator")
            .build()
            .unwrap();
        assert!(settings.accepts_roles(["web", "replicator"]));
        assert!(!settings.accepts_roles(["web"]));

        assert!(ReplicatorSettings::builder().role("").build().is_err());
        assert!(ReplicatorSettings::builder()
            .retry_timeout(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_settings_from_json() {
        let json = r#"{
            "resend_interval": {"secs": 1, "nanos": 0},
            "retry_timeout": {"secs": 2, "nanos": 0},
            "role": "replicator"
        }"#;
        let settings: ReplicatorSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.retry_timeout, Duration::from_secs(2));
        assert_eq!(settings.role.as_deref(), Some("replicator"));
    }
}

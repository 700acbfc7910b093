//! Collector enablement configuration.

use serde::{Deserialize, Serialize};

use crate::collector::CollectorKind;

use super::validation::ConfigError;

fn default_enabled() -> bool {
    true
}

/// Which collectors run on each scrape. Fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorsConfig {
    /// Device inventory and online status (default: true).
    #[serde(default = "default_enabled")]
    pub devices: bool,

    /// Access users, joined with device status (default: true).
    #[serde(default = "default_enabled")]
    pub users: bool,

    /// Cloudflare Tunnel health (default: true).
    #[serde(default = "default_enabled")]
    pub tunnels: bool,

    /// Digital Experience Monitoring tests (default: true).
    #[serde(default = "default_enabled")]
    pub dex: bool,

    /// Magic WAN tunnel state and bandwidth (default: false).
    #[serde(default)]
    pub magicwan: bool,
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            devices: true,
            users: true,
            tunnels: true,
            dex: true,
            magicwan: false,
        }
    }
}

impl CollectorsConfig {
    /// Config with every collector disabled.
    pub fn none() -> Self {
        Self {
            devices: false,
            users: false,
            tunnels: false,
            dex: false,
            magicwan: false,
        }
    }

    /// Whether `kind` is enabled.
    pub fn is_enabled(&self, kind: CollectorKind) -> bool {
        match kind {
            CollectorKind::Devices => self.devices,
            CollectorKind::Users => self.users,
            CollectorKind::Tunnels => self.tunnels,
            CollectorKind::Dex => self.dex,
            CollectorKind::MagicWan => self.magicwan,
        }
    }

    /// Enable or disable `kind`.
    pub fn set(&mut self, kind: CollectorKind, enabled: bool) {
        let slot = match kind {
            CollectorKind::Devices => &mut self.devices,
            CollectorKind::Users => &mut self.users,
            CollectorKind::Tunnels => &mut self.tunnels,
            CollectorKind::Dex => &mut self.dex,
            CollectorKind::MagicWan => &mut self.magicwan,
        };
        *slot = enabled;
    }

    /// Builder-style variant of [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, kind: CollectorKind, enabled: bool) -> Self {
        self.set(kind, enabled);
        self
    }

    /// Enabled collectors in declaration order.
    pub fn enabled(&self) -> Vec<CollectorKind> {
        CollectorKind::ALL
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }

    /// Validate the enablement set.
    ///
    /// Users without devices is allowed: the user collector degrades to
    /// "no device data" on every scrape, so it is only worth a warning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.users && !self.devices {
            tracing::warn!(
                "users collector is enabled without devices; user device status will be unavailable"
            );
        }
        if self.enabled().is_empty() {
            tracing::warn!("no collectors enabled; scrapes will only expose exporter metrics");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collectors_config_defaults() {
        let config = CollectorsConfig::default();
        assert_eq!(
            config.enabled(),
            vec![
                CollectorKind::Devices,
                CollectorKind::Users,
                CollectorKind::Tunnels,
                CollectorKind::Dex,
            ]
        );
        assert!(!config.is_enabled(CollectorKind::MagicWan));
    }

    #[test]
    fn test_collectors_config_serde_defaults() {
        let config: CollectorsConfig =
            serde_yaml::from_str("magicwan: true\ndex: false\n").unwrap();
        assert!(config.devices);
        assert!(config.users);
        assert!(config.tunnels);
        assert!(!config.dex);
        assert!(config.magicwan);
    }

    #[test]
    fn test_collectors_config_set() {
        let config = CollectorsConfig::none()
            .with(CollectorKind::Users, true)
            .with(CollectorKind::MagicWan, true);
        assert_eq!(
            config.enabled(),
            vec![CollectorKind::Users, CollectorKind::MagicWan]
        );
        assert!(config.validate().is_ok());
    }
}

use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use anyhow::{bail, Result};

use crate::{NetworkId, RouterId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub max_interfaces: usize,
    pub advertise_interval_ms: u64,
    pub check_interval_ms: u64,
    /// Route expiry threshold, counted in invalidation checks.
    pub invalid_after_checks: u32,
    pub delivery: DeliveryConfig,
    pub first_router_id: RouterId,
    pub first_network_id: NetworkId,
}

/// Fault injection applied to every advertisement handed to a neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub loss_probability: f64,
    pub delay_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_interfaces: 8,
            advertise_interval_ms: 3000, // 3 seconds
            check_interval_ms: 1000,     // 1 second
            invalid_after_checks: 5,     // 5 seconds at the default check interval
            delivery: DeliveryConfig::default(),
            first_router_id: 101,
            first_network_id: 1,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            loss_probability: 0.0,
            delay_ms: 0,
        }
    }
}

impl ProtocolConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ProtocolConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_interfaces == 0 {
            bail!("max_interfaces must be at least 1");
        }
        if self.advertise_interval_ms == 0 || self.check_interval_ms == 0 {
            bail!("advertise and check intervals must be non-zero");
        }
        if self.invalid_after_checks == 0 {
            bail!("invalid_after_checks must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.delivery.loss_probability) {
            bail!("loss_probability must lie in [0, 1], got {}", self.delivery.loss_probability);
        }
        Ok(())
    }

    pub fn advertise_interval(&self) -> Duration {
        Duration::from_millis(self.advertise_interval_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Wall-clock time after which an unrefreshed learned route is dropped.
    pub fn expiry_time(&self) -> Duration {
        self.check_interval() * self.invalid_after_checks
    }
}

impl DeliveryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn is_perfect(&self) -> bool {
        self.loss_probability <= 0.0 && self.delay_ms == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_classic_timers() {
        let config = ProtocolConfig::default();
        assert_eq!(config.advertise_interval(), Duration::from_secs(3));
        assert_eq!(config.check_interval(), Duration::from_secs(1));
        assert_eq!(config.expiry_time(), Duration::from_secs(5));
        assert!(config.delivery.is_perfect());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: ProtocolConfig =
            serde_json::from_str(r#"{ "advertise_interval_ms": 500, "delivery": { "delay_ms": 20 } }"#).unwrap();
        assert_eq!(config.advertise_interval_ms, 500);
        assert_eq!(config.max_interfaces, 8);
        assert_eq!(config.delivery.delay_ms, 20);
        assert_eq!(config.delivery.loss_probability, 0.0);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = ProtocolConfig::default();
        config.max_interfaces = 0;
        assert!(config.validate().is_err());

        let mut config = ProtocolConfig::default();
        config.check_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ProtocolConfig::default();
        config.delivery.loss_probability = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!("rip-sim-config-{}.json", std::process::id()));
        let path = path.to_string_lossy().to_string();

        let mut config = ProtocolConfig::default();
        config.invalid_after_checks = 9;
        config.save(&path).unwrap();

        let loaded = ProtocolConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = fs::remove_file(&path);
    }
}

//! Coordinator configuration.

use std::time::Duration;

use thiserror::Error;

use twophase_common::{AccountId, Amount, MIN_RESERVATION_TTL};

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Listen port cannot be 0")]
    ZeroListenPort,

    #[error("Sweep interval cannot be zero")]
    ZeroSweepInterval,

    #[error("Reservation TTL {0:?} is below the minimum of one second")]
    ReservationTtlTooShort(Duration),

    #[error("Seed account {0} has a negative balance")]
    NegativeSeedBalance(AccountId),

    #[error("Invalid seed account entry {entry:?}: {reason}")]
    InvalidSeedAccount { entry: String, reason: String },
}

/// Lock and reservation configuration.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Lease after which an unresolved reservation is aborted. `None` keeps
    /// reservations until the caller resolves them.
    pub reservation_ttl: Option<Duration>,
    /// Interval between expiry sweeps.
    pub sweep_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            reservation_ttl: None,
            sweep_interval: Duration::from_secs(1),
        }
    }
}

/// Main coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Node ID (generated when absent).
    pub node_id: Option<String>,
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    /// Lock configuration.
    pub lock_config: LockConfig,
    /// Accounts opened in the in-memory ledger at startup.
    pub seed_accounts: Vec<(AccountId, Amount)>,
    /// How long `stop` waits for pending reservations to resolve.
    pub shutdown_grace: Duration,
    /// Log level.
    pub log_level: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 50051,
            lock_config: LockConfig::default(),
            seed_accounts: Vec::new(),
            shutdown_grace: Duration::from_secs(5),
            log_level: "info".to_string(),
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from environment variables.
    ///
    /// Unparseable numeric settings keep their defaults; an unparseable seed
    /// account list is an error, since it would start the node on an empty
    /// ledger.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup, such as a parsed env file.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(node_id) = lookup("COORDINATOR_NODE_ID") {
            config.node_id = Some(node_id);
        }

        if let Some(addr) = lookup("COORDINATOR_LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Some(port) = lookup("COORDINATOR_LISTEN_PORT") {
            if let Ok(port) = port.parse() {
                config.listen_port = port;
            }
        }

        if let Some(ttl) = lookup("COORDINATOR_RESERVATION_TTL_SECS") {
            if let Ok(secs) = ttl.parse::<u64>() {
                config.lock_config.reservation_ttl =
                    (secs > 0).then(|| Duration::from_secs(secs));
            }
        }

        if let Some(interval) = lookup("COORDINATOR_SWEEP_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                config.lock_config.sweep_interval = Duration::from_millis(ms);
            }
        }

        if let Some(accounts) = lookup("COORDINATOR_SEED_ACCOUNTS") {
            config.seed_accounts = parse_seed_accounts(&accounts)?;
        }

        if let Some(grace) = lookup("COORDINATOR_SHUTDOWN_GRACE_MS") {
            if let Ok(ms) = grace.parse() {
                config.shutdown_grace = Duration::from_millis(ms);
            }
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_port == 0 {
            return Err(ConfigError::ZeroListenPort);
        }

        if self.lock_config.sweep_interval.is_zero() {
            return Err(ConfigError::ZeroSweepInterval);
        }

        if let Some(ttl) = self.lock_config.reservation_ttl {
            if ttl < MIN_RESERVATION_TTL {
                return Err(ConfigError::ReservationTtlTooShort(ttl));
            }
        }

        if let Some((id, _)) = self.seed_accounts.iter().find(|(_, balance)| *balance < 0) {
            return Err(ConfigError::NegativeSeedBalance(*id));
        }

        Ok(())
    }
}

/// Parse `"1:100,2:5"` into `(account, balance)` pairs.
pub fn parse_seed_accounts(accounts: &str) -> Result<Vec<(AccountId, Amount)>, ConfigError> {
    accounts
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let invalid = |reason: String| ConfigError::InvalidSeedAccount {
                entry: entry.to_string(),
                reason,
            };
            let (id, balance) = entry
                .split_once(':')
                .ok_or_else(|| invalid("expected <account>:<balance>".to_string()))?;
            let id = AccountId::parse(id).map_err(|e| invalid(format!("account: {e}")))?;
            let balance = balance
                .trim()
                .parse::<Amount>()
                .map_err(|e| invalid(format!("balance: {e}")))?;
            Ok((id, balance))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.lock_config.reservation_ttl.is_none());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = CoordinatorConfig::default();
        config.listen_port = 0;
        assert!(config.validate().is_err());

        let mut config = CoordinatorConfig::default();
        config.lock_config.reservation_ttl = Some(Duration::from_millis(10));
        assert_eq!(
            config.validate(),
            Err(ConfigError::ReservationTtlTooShort(Duration::from_millis(10)))
        );

        let mut config = CoordinatorConfig::default();
        config.seed_accounts = vec![(AccountId::new(1), -5)];
        assert_eq!(
            config.validate(),
            Err(ConfigError::NegativeSeedBalance(AccountId::new(1)))
        );
    }

    #[test]
    fn test_parse_seed_accounts() {
        let accounts = parse_seed_accounts("1:100, 2:5,").unwrap();
        assert_eq!(
            accounts,
            vec![(AccountId::new(1), 100), (AccountId::new(2), 5)]
        );

        assert!(matches!(
            parse_seed_accounts("1=100"),
            Err(ConfigError::InvalidSeedAccount { entry, .. }) if entry == "1=100"
        ));
        assert!(parse_seed_accounts("x:100").is_err());
        assert!(parse_seed_accounts("").unwrap().is_empty());
    }

    fn lookup_from<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_from_lookup() {
        let vars = [
            ("COORDINATOR_NODE_ID", "node-a"),
            ("COORDINATOR_LISTEN_PORT", "7000"),
            ("COORDINATOR_RESERVATION_TTL_SECS", "30"),
            ("COORDINATOR_SEED_ACCOUNTS", "1:100,2:5"),
        ];

        let config = CoordinatorConfig::from_lookup(lookup_from(&vars)).unwrap();

        assert_eq!(config.node_id.as_deref(), Some("node-a"));
        assert_eq!(config.listen_port, 7000);
        assert_eq!(
            config.lock_config.reservation_ttl,
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            config.seed_accounts,
            vec![(AccountId::new(1), 100), (AccountId::new(2), 5)]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_seed_accounts_rejected() {
        let vars = [("COORDINATOR_SEED_ACCOUNTS", "1:100,2=5")];

        let result = CoordinatorConfig::from_lookup(lookup_from(&vars));

        assert!(matches!(
            result,
            Err(ConfigError::InvalidSeedAccount { entry, .. }) if entry == "2=5"
        ));
    }
}

//! Configuration for every layer of the subsystem.

use std::time::Duration;

/// Store connection configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Store host
    pub host: String,
    /// Store port
    pub port: u16,
    /// Logical database index
    pub db: u8,
    /// Optional password
    pub password: Option<String>,
    /// Upper bound for any single store command
    pub command_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
            password: None,
            command_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    /// Connection URL for the Redis driver.
    #[must_use]
    pub fn url(&self) -> String {
        match &self.password {
            Some(pass) => format!("redis://:{}@{}:{}/{}", pass, self.host, self.port, self.db),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }

    /// Set host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set database index.
    #[must_use]
    pub fn with_db(mut self, db: u8) -> Self {
        self.db = db;
        self
    }
}

/// Broker behaviour configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Maximum entries kept per history list
    pub history_limit: usize,
    /// How long a handoff stays pending before it expires
    pub handoff_timeout: Duration,
    /// Retention window for resolved handoffs, tasks and histories
    pub retention: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            handoff_timeout: Duration::from_secs(5 * 60),
            retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl BrokerConfig {
    /// Set the per-agent history cap.
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Set the handoff expiry timeout.
    #[must_use]
    pub fn with_handoff_timeout(mut self, timeout: Duration) -> Self {
        self.handoff_timeout = timeout;
        self
    }
}

/// Fixed-window rate limit configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Window length
    pub window: Duration,
    /// Mutating operations allowed per agent per window
    pub max_operations: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_operations: 100,
        }
    }
}

/// Reconnection backoff configuration.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Base delay before the first retry
    pub base_delay: Duration,
    /// Cap applied before jitter
    pub max_delay: Duration,
    /// Floor applied after jitter
    pub min_delay: Duration,
    /// Give up after this many consecutive failed cycles
    pub max_attempts: u32,
    /// Jitter fraction of the computed delay (0.25 = ±25%)
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            min_delay: Duration::from_secs(1),
            max_attempts: 10,
            jitter: 0.25,
        }
    }
}

impl ReconnectConfig {
    /// Set the base delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the retry budget.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }
}

/// Top-level configuration for the communication subsystem.
#[derive(Debug, Clone, Default)]
pub struct CommsConfig {
    pub store: StoreConfig,
    pub broker: BrokerConfig,
    pub rate_limit: RateLimitConfig,
    pub reconnect: ReconnectConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_url() {
        let config = StoreConfig::default();
        assert_eq!(config.url(), "redis://127.0.0.1:6379/0");

        let config = StoreConfig::default().with_host("redis.internal").with_db(2);
        assert_eq!(config.url(), "redis://redis.internal:6379/2");
    }

    #[test]
    fn test_defaults() {
        let config = CommsConfig::default();
        assert_eq!(config.broker.history_limit, 100);
        assert_eq!(config.rate_limit.max_operations, 100);
        assert_eq!(config.reconnect.max_attempts, 10);
        assert!((config.reconnect.jitter - 0.25).abs() < f64::EPSILON);
    }
}

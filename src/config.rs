use crate::error::{Error, Result};
use std::time::Duration;

const MAX_POOL_SIZE: usize = 1024;

#[derive(Debug, Clone)]
pub struct Config {
    /// Diagnostic label, shows up in logs and snapshots.
    pub name: String,
    pub pool_size: usize,

    /// Records a before/after snapshot around every state transition.
    /// Meant for concurrency test suites, keep it off otherwise: every
    /// transition clones the whole state (including the finished ring) under
    /// the state lock, and up to `history_limit` of those clones are kept.
    pub self_test: bool,

    /// Most records the self-test history keeps. Older ones are dropped.
    pub history_limit: usize,

    /// Idle workers retire after this long. `None` keeps them forever.
    pub keep_alive: Option<Duration>,

    /// Upper bound on every internal condition wait, so exclusive tasks
    /// re-check the usual drain and blocked tasks notice interrupts.
    pub exclusive_poll_interval: Duration,

    pub stack_size: Option<usize>,
    pub thread_name_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "terminal".to_string(),
            pool_size: num_cpus::get(),
            self_test: false,
            history_limit: 10_000,
            keep_alive: Some(Duration::from_secs(10)),
            exclusive_poll_interval: Duration::from_millis(10),
            stack_size: Some(2 * 1024 * 1024),
            thread_name_prefix: "terminal-worker".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config("terminal name must not be empty"));
        }
        if self.pool_size == 0 {
            return Err(Error::config("pool_size must be > 0"));
        }
        if self.pool_size > MAX_POOL_SIZE {
            return Err(Error::config(format!(
                "pool_size too large (max {})",
                MAX_POOL_SIZE
            )));
        }
        if self.history_limit == 0 {
            return Err(Error::config("history_limit must be > 0"));
        }
        if self.exclusive_poll_interval.is_zero() {
            return Err(Error::config("exclusive_poll_interval must be > 0"));
        }
        if let Some(keep_alive) = self.keep_alive {
            if keep_alive.is_zero() {
                return Err(Error::config("keep_alive must be > 0 when set"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn pool_size(mut self, n: usize) -> Self {
        self.config.pool_size = n;
        self
    }

    pub fn self_test(mut self, enable: bool) -> Self {
        self.config.self_test = enable;
        self
    }

    pub fn history_limit(mut self, limit: usize) -> Self {
        self.config.history_limit = limit;
        self
    }

    pub fn keep_alive(mut self, keep_alive: Option<Duration>) -> Self {
        self.config.keep_alive = keep_alive;
        self
    }

    pub fn exclusive_poll_interval(mut self, interval: Duration) -> Self {
        self.config.exclusive_poll_interval = interval;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(!config.self_test);
        assert!(config.pool_size > 0);
    }

    #[test]
    fn test_builder() {
        let config = Config::builder()
            .name("termini")
            .pool_size(16)
            .self_test(true)
            .keep_alive(None)
            .build()
            .unwrap();

        assert_eq!(config.name, "termini");
        assert_eq!(config.pool_size, 16);
        assert!(config.self_test);
        assert!(config.keep_alive.is_none());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::builder().pool_size(0).build().is_err());
        assert!(Config::builder().pool_size(4096).build().is_err());
        assert!(Config::builder().name("  ").build().is_err());
        assert!(Config::builder().history_limit(0).build().is_err());
        assert!(Config::builder()
            .exclusive_poll_interval(Duration::ZERO)
            .build()
            .is_err());
        assert!(Config::builder()
            .keep_alive(Some(Duration::ZERO))
            .build()
            .is_err());
    }
}

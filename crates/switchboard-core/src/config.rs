//! Config - `switchboard.toml`
//!
//! すべてのフィールドに既定値があるので、ファイルがなくても動く。
//!
//! ```toml
//! data_dir = "./switchboard-data"
//!
//! [dispatcher]
//! max_retries = 3
//! lease_ttl_ms = 30000
//! lease_margin_ms = 2000
//! order = "priority"
//!
//! [consumer]
//! poll_interval_ms = 5000
//!
//! [delivery]
//! command = ["notify-agent", "--quiet"]
//! timeout_ms = 20000
//!
//! [log]
//! filter = "info,switchboard_core=debug"
//! json = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::{ConsumerSettings, DispatcherSettings};
use crate::domain::{Result, SwitchboardError};
use crate::queue::{DispatchOrder, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub dispatcher: DispatcherConfig,
    pub consumer: ConsumerConfig,
    pub delivery: DeliveryConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Defaults to `dispatcher-<pid>`.
    pub holder_id: Option<String>,
    pub max_retries: u32,
    pub lease_ttl_ms: u64,
    /// Part of the lease a delivery attempt may not use.
    pub lease_margin_ms: u64,
    pub lease_retry_ms: u64,
    pub idle_ms: u64,
    pub retry_base_delay_ms: u64,
    pub retry_multiplier: f64,
    pub retry_max_delay_ms: u64,
    pub order: DispatchOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub poll_interval_ms: u64,
    /// How often a hosting process checks for the stop sentinel.
    pub stop_check_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Program and arguments; the payload goes to stdin.
    pub command: Vec<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: String,
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./switchboard-data"),
            dispatcher: DispatcherConfig::default(),
            consumer: ConsumerConfig::default(),
            delivery: DeliveryConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            holder_id: None,
            max_retries: 3,
            lease_ttl_ms: 30_000,
            lease_margin_ms: 2_000,
            lease_retry_ms: 200,
            idle_ms: 500,
            retry_base_delay_ms: 1_000,
            retry_multiplier: 2.0,
            retry_max_delay_ms: 60_000,
            order: DispatchOrder::Fifo,
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            stop_check_ms: 1_000,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_ms: 20_000,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(SwitchboardError::io(format!("read {}", path.display()), e)),
        };
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SwitchboardError::Config(e.to_string()))
    }

    /// Reject settings that would make a loop spin or a lease never expire.
    pub fn validate(&self) -> Result<()> {
        let d = &self.dispatcher;
        let checks = [
            (d.lease_ttl_ms == 0, "dispatcher.lease_ttl_ms must be > 0"),
            (d.lease_retry_ms == 0, "dispatcher.lease_retry_ms must be > 0"),
            (d.idle_ms == 0, "dispatcher.idle_ms must be > 0"),
            (
                !(d.retry_multiplier.is_finite() && d.retry_multiplier >= 1.0),
                "dispatcher.retry_multiplier must be >= 1",
            ),
            (
                d.retry_base_delay_ms > d.retry_max_delay_ms,
                "dispatcher.retry_base_delay_ms must not exceed retry_max_delay_ms",
            ),
            (
                self.consumer.poll_interval_ms == 0,
                "consumer.poll_interval_ms must be > 0",
            ),
            (
                self.consumer.stop_check_ms == 0 || self.consumer.stop_check_ms > 1_000,
                "consumer.stop_check_ms must be within 1..=1000",
            ),
            (self.delivery.timeout_ms == 0, "delivery.timeout_ms must be > 0"),
            (
                self.delivery
                    .timeout_ms
                    .saturating_add(d.lease_margin_ms)
                    >= d.lease_ttl_ms,
                "delivery.timeout_ms + dispatcher.lease_margin_ms must be below dispatcher.lease_ttl_ms",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(SwitchboardError::Config((*message).to_string())),
            None => Ok(()),
        }
    }

    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }

    pub fn lease_path(&self) -> PathBuf {
        self.data_dir.join("dispatch.lease")
    }

    pub fn inbox_dir(&self) -> PathBuf {
        self.data_dir.join("inbox")
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.data_dir.join("outbox")
    }

    pub fn stop_path(&self) -> PathBuf {
        self.data_dir.join("stop")
    }

    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        let d = &self.dispatcher;
        let defaults = DispatcherSettings::default();
        DispatcherSettings {
            holder_id: d.holder_id.clone().unwrap_or(defaults.holder_id),
            max_retries: d.max_retries,
            lease_ttl: Duration::from_millis(d.lease_ttl_ms),
            lease_margin: Duration::from_millis(d.lease_margin_ms),
            attempt_timeout: Duration::from_millis(self.delivery.timeout_ms),
            lease_retry: Duration::from_millis(d.lease_retry_ms),
            idle: Duration::from_millis(d.idle_ms),
            order: d.order,
            retry: RetryPolicy::new(
                Duration::from_millis(d.retry_base_delay_ms),
                d.retry_multiplier,
                Duration::from_millis(d.retry_max_delay_ms),
            ),
        }
    }

    pub fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            poll_interval: Duration::from_millis(self.consumer.poll_interval_ms),
        }
    }
}

//! Daemon-level configuration: reads the pool geometry from a JSON file and
//! layers a handful of environment overrides on top, the way `hr-common`'s
//! config loader does for the other daemons in this codebase.

use std::env;
use std::fs;

use anyhow::{Context, Result};
use ddhcp_core::PoolConfig;
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "/etc/ddhcpd/config.json";
const DEFAULT_DHCP_PORT: u16 = 67;
const DEFAULT_CLUSTER_PORT: u16 = 1067;

fn default_cluster_port() -> u16 {
    DEFAULT_CLUSTER_PORT
}

fn default_log_filter() -> String {
    "ddhcpd=info,ddhcp_core=info".to_string()
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(flatten)]
    pool: PoolConfig,
    #[serde(default = "default_cluster_port")]
    cluster_port: u16,
    #[serde(default = "default_log_filter")]
    log_filter: String,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub pool: PoolConfig,
    pub dhcp_port: u16,
    pub cluster_port: u16,
    pub log_filter: String,
}

impl DaemonConfig {
    /// Loads the config file named by `DDHCPD_CONFIG` (default
    /// `/etc/ddhcpd/config.json`), then applies `DDHCPD_INTERFACE` and
    /// `DDHCPD_LOG` if set. Any geometry or option-override error is fatal
    /// at startup.
    pub fn load() -> Result<Self> {
        let path = env::var("DDHCPD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let raw = fs::read_to_string(&path).with_context(|| format!("reading config file {path}"))?;
        let mut config: RawConfig =
            serde_json::from_str(&raw).with_context(|| format!("parsing config file {path}"))?;

        if let Ok(interface) = env::var("DDHCPD_INTERFACE") {
            config.pool.interface = Some(interface);
        }
        if let Ok(filter) = env::var("DDHCPD_LOG") {
            config.log_filter = filter;
        }

        config.pool.number_of_blocks().context("validating pool geometry")?;
        config.pool.parsed_overrides().context("validating configured DHCP option overrides")?;

        Ok(DaemonConfig {
            pool: config.pool,
            dhcp_port: DEFAULT_DHCP_PORT,
            cluster_port: config.cluster_port,
            log_filter: config.log_filter,
        })
    }
}

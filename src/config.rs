//! Settlement configuration.
use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_CONFIRMATIONS, DEFAULT_HEARTBEAT_INTERVAL,
    DEFAULT_IO_RETRY_INTERVAL, DEFAULT_LONG_UNEXECUTED_BLOCKS, DEFAULT_MONITOR_INTERVAL,
    DEFAULT_NONCE_CHECK_INTERVAL, DEFAULT_NONCE_TOO_FUTURE_THRESHOLD, DEFAULT_PAUSE_INTERVAL,
    DEFAULT_RELAY_ERRORS_TO_SKIP, DEFAULT_RELAY_REQUEST_TIMEOUT, DEFAULT_RELAY_SKIP_TIMEOUT,
    DEFAULT_UNDERPRICED_RETRY_INTERVAL, DEFAULT_WAIT_COUNTDOWN, DEFAULT_WAIT_INTERVAL,
};
use alloy::primitives::Address;
use eyre::Context;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    net::{IpAddr, Ipv4Addr},
    path::Path,
    time::Duration,
};
use url::Url;

/// Settlement configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Chain configuration.
    pub chain: ChainConfig,
    /// Settlement contracts.
    #[serde(default)]
    pub contract: ContractConfig,
    /// Settlement worker configuration.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Nonce budget configuration.
    #[serde(default)]
    pub nonce: NonceConfig,
    /// Confirmation monitor configuration.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Transaction relayer configuration.
    #[serde(default)]
    pub relay: RelayConfig,
    /// Heartbeat configuration.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    /// Metrics server configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Secrets.
    #[serde(skip_serializing, default)]
    pub secrets: SecretsConfig,
}

impl SettlementConfig {
    /// Sets the RPC endpoint of the chain.
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.chain.endpoint = endpoint;
        self
    }

    /// Sets the chain id used when signing.
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain.chain_id = chain_id;
        self
    }

    /// Sets the depth after which a block is considered final.
    pub fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.chain.confirmations = confirmations;
        self
    }

    /// Sets the default settlement contract.
    pub fn with_contract(mut self, contract: Address) -> Self {
        self.contract.default = contract;
        self
    }

    /// Registers a named settlement contract.
    pub fn with_named_contract(mut self, name: impl Into<String>, contract: Address) -> Self {
        self.contract.named.insert(name.into(), contract);
        self
    }

    /// Sets the settlement worker configuration.
    pub fn with_worker_config(mut self, config: WorkerConfig) -> Self {
        self.worker = config;
        self
    }

    /// Sets the nonce budget configuration.
    pub fn with_nonce_config(mut self, config: NonceConfig) -> Self {
        self.nonce = config;
        self
    }

    /// Sets the confirmation monitor configuration.
    pub fn with_monitor_config(mut self, config: MonitorConfig) -> Self {
        self.monitor = config;
        self
    }

    /// Sets the relay endpoints.
    pub fn with_relay_endpoints(mut self, endpoints: Vec<Url>) -> Self {
        self.relay.endpoints = endpoints;
        self
    }

    /// Sets the port to serve the metrics on.
    pub fn with_metrics_port(mut self, port: u16) -> Self {
        self.metrics.port = port;
        self
    }

    /// Sets the key used to sign settlement transactions.
    pub fn with_signer_key(mut self, signer_key: Option<String>) -> Self {
        if let Some(signer_key) = signer_key {
            self.secrets.signer_key = signer_key;
        }
        self
    }

    /// Load from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> eyre::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .wrap_err_with(|| format!("failed to read config file: {}", path.display()))?;
        let config = serde_yaml::from_reader(&file)
            .wrap_err_with(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save to a YAML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> eyre::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Chain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// The RPC endpoint to send settlements to.
    pub endpoint: Url,
    /// Chain id used when signing.
    pub chain_id: u64,
    /// Number of blocks on top of a block before it is considered final.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
}

fn default_confirmations() -> u64 {
    DEFAULT_CONFIRMATIONS
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            endpoint: Url::parse("http://localhost:8545").expect("valid url"),
            chain_id: 31337,
            confirmations: DEFAULT_CONFIRMATIONS,
        }
    }
}

/// Settlement contracts.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Contract used unless an item names another one.
    pub default: Address,
    /// Additional contracts by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub named: BTreeMap<String, Address>,
}

impl ContractConfig {
    /// Returns the contract registered under `name`.
    pub fn get(&self, name: &str) -> Option<Address> {
        self.named.get(name).copied()
    }
}

/// Settlement worker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum number of items per batch.
    pub batch_size: usize,
    /// Number of waits for more items before a partial batch is sent.
    pub wait_countdown: usize,
    /// Delay between two waits of a partial batch.
    #[serde(with = "crate::serde::duration")]
    pub wait_interval: Duration,
    /// Delay used while paused, after failures and after unexpected node errors.
    #[serde(with = "crate::serde::duration")]
    pub pause_interval: Duration,
    /// Delay before resending an underpriced transaction.
    #[serde(with = "crate::serde::duration")]
    pub underpriced_retry_interval: Duration,
    /// Delay before retrying after a transport error.
    #[serde(with = "crate::serde::duration")]
    pub io_retry_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            wait_countdown: DEFAULT_WAIT_COUNTDOWN,
            wait_interval: DEFAULT_WAIT_INTERVAL,
            pause_interval: DEFAULT_PAUSE_INTERVAL,
            underpriced_retry_interval: DEFAULT_UNDERPRICED_RETRY_INTERVAL,
            io_retry_interval: DEFAULT_IO_RETRY_INTERVAL,
        }
    }
}

/// Nonce budget configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonceConfig {
    /// The on-chain nonce is checked whenever the working nonce is a multiple of this value.
    pub check_interval: u64,
    /// Maximum distance between the working nonce and the on-chain nonce.
    pub too_future_threshold: u64,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_NONCE_CHECK_INTERVAL,
            too_future_threshold: DEFAULT_NONCE_TOO_FUTURE_THRESHOLD,
        }
    }
}

/// Confirmation monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Blocks after which an unexecuted transaction is resent.
    pub long_unexecuted_blocks: u64,
    /// Extra depth on top of the confirmed block.
    pub extra_confirmations: u64,
    /// Interval between two monitor cycles.
    #[serde(with = "crate::serde::duration")]
    pub interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            long_unexecuted_blocks: DEFAULT_LONG_UNEXECUTED_BLOCKS,
            extra_confirmations: 0,
            interval: DEFAULT_MONITOR_INTERVAL,
        }
    }
}

/// Transaction relayer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Additional endpoints every accepted transaction is broadcast to.
    pub endpoints: Vec<Url>,
    /// Consecutive non-RPC errors after which an endpoint is skipped.
    pub errors_to_skip: u64,
    /// How long a failing endpoint is skipped.
    #[serde(with = "crate::serde::duration")]
    pub skip_timeout: Duration,
    /// Timeout of a single broadcast.
    #[serde(with = "crate::serde::duration")]
    pub request_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            errors_to_skip: DEFAULT_RELAY_ERRORS_TO_SKIP,
            skip_timeout: DEFAULT_RELAY_SKIP_TIMEOUT,
            request_timeout: DEFAULT_RELAY_REQUEST_TIMEOUT,
        }
    }
}

/// Heartbeat configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Interval between two probes.
    #[serde(with = "crate::serde::duration")]
    pub interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { interval: DEFAULT_HEARTBEAT_INTERVAL }
    }
}

/// Metrics server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// The address to serve the metrics on.
    pub address: IpAddr,
    /// The port to serve the metrics on.
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { address: IpAddr::V4(Ipv4Addr::LOCALHOST), port: 9000 }
    }
}

/// Secrets (kept out of serialized output).
#[derive(Debug, Clone, Deserialize)]
pub struct SecretsConfig {
    /// The private key to sign settlement transactions with.
    pub signer_key: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            signer_key: "0x0000000000000000000000000000000000000000000000000000000000000001"
                .to_string(),
        }
    }
}

//! # Settler CLI
use crate::{
    chain::{ChainClient, ChainError, EvmClient},
    config::SettlementConfig,
    metrics::setup_exporter,
    nonce::{NonceSyncer, WorkingNonce},
    signers::{TransactionSigner, WalletSigner},
    storage::{SettlementStorage, StorageApi},
    transactions::{HeartBeat, HeartBeatHandler, TransactionRelayer},
};
use alloy::primitives::{B256, Bytes};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info, warn};
use url::Url;

/// Operator tools for the settlement pipeline.
#[derive(Debug, Parser)]
#[command(author, about = "Settler", long_about = None)]
pub struct Args {
    /// The configuration file.
    ///
    /// If missing, a default one will be used and stored in the working directory under
    /// `settler.yaml`.
    #[arg(long, value_name = "CONFIG", env = "SETTLER_CONFIG", default_value = "settler.yaml")]
    pub config: PathBuf,
    /// The RPC endpoint of the chain to settle on.
    ///
    /// Must be a valid HTTP or HTTPS URL pointing to an Ethereum JSON-RPC endpoint.
    #[arg(long = "endpoint", value_name = "RPC_ENDPOINT")]
    pub endpoint: Option<Url>,
    /// Additional endpoints signed transactions are broadcast to.
    #[arg(long = "relay-endpoint", value_name = "RPC_ENDPOINT")]
    pub relay_endpoints: Vec<Url>,
    /// The port to serve the metrics on.
    #[arg(long = "http.metrics-port", value_name = "PORT")]
    pub metrics_port: Option<u16>,
    /// The secret key to sign settlement transactions with.
    #[arg(long = "signer-key", value_name = "SECRET_KEY", env = "SETTLER_SK")]
    pub signer_key: Option<String>,
    /// The command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Settler commands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Probes the chain endpoint and serves its health as metrics.
    Heartbeat,
    /// Reconciles the working nonce of the settlement signer against a persisted transaction,
    /// without sending anything.
    SyncNonce {
        /// Hash of the last transaction sent with a fresh nonce.
        #[arg(long = "tx-hash", value_name = "HASH")]
        tx_hash: B256,
        /// Nonce of the last transaction sent with a fresh nonce.
        #[arg(long, value_name = "NONCE")]
        nonce: u64,
    },
    /// Broadcasts a signed transaction to the chain endpoint and every relay endpoint.
    Relay {
        /// The EIP-2718 encoded transaction.
        #[arg(value_name = "RAW_TX")]
        raw: Bytes,
    },
}

impl Args {
    /// Runs the command.
    pub async fn run(self) -> eyre::Result<()> {
        let config_path = self.config.clone();
        let command = self.command.clone();

        let config = if !config_path.exists() {
            let config = self.merge_settlement_config(SettlementConfig::default());
            config.save_to_file(&config_path)?;
            config
        } else {
            // File exists: load and override with CLI values.
            self.merge_settlement_config(SettlementConfig::load_from_file(&config_path)?)
        };

        match command {
            Command::Heartbeat => heartbeat(config).await,
            Command::SyncNonce { tx_hash, nonce } => sync_nonce(config, tx_hash, nonce).await,
            Command::Relay { raw } => relay(config, raw).await,
        }
    }

    /// Merges [`Args`] values into an existing [`SettlementConfig`] instance.
    pub fn merge_settlement_config(self, mut config: SettlementConfig) -> SettlementConfig {
        if let Some(endpoint) = self.endpoint {
            config = config.with_endpoint(endpoint);
        }
        if let Some(port) = self.metrics_port {
            config = config.with_metrics_port(port);
        }
        if !self.relay_endpoints.is_empty() {
            config = config.with_relay_endpoints(self.relay_endpoints);
        }
        config.with_signer_key(self.signer_key)
    }
}

/// Logs heartbeat failures.
#[derive(Debug)]
struct LogHeartBeat;

impl HeartBeatHandler for LogHeartBeat {
    fn on_io_error(&self, err: &ChainError, errors: u64) {
        warn!(%err, errors, "Chain endpoint unreachable");
    }

    fn on_unexpected_error(&self, err: &ChainError, errors: u64) {
        error!(%err, errors, "Chain endpoint failing");
    }
}

fn chain_client(config: &SettlementConfig) -> Arc<dyn ChainClient> {
    Arc::new(EvmClient::connect_http(config.chain.endpoint.clone(), config.chain.confirmations))
}

async fn heartbeat(config: SettlementConfig) -> eyre::Result<()> {
    setup_exporter((config.metrics.address, config.metrics.port)).await?;

    let heartbeat = Arc::new(HeartBeat::new(chain_client(&config), Arc::new(LogHeartBeat)));
    info!(endpoint = %config.chain.endpoint, interval = ?config.heartbeat.interval, "Started heartbeat");
    heartbeat.run(config.heartbeat.interval).await;

    Ok(())
}

async fn sync_nonce(config: SettlementConfig, tx_hash: B256, nonce: u64) -> eyre::Result<()> {
    let signer = WalletSigner::from_signing_key(&config.secrets.signer_key, config.chain.chain_id)?;
    let address = signer.address();
    let chain = chain_client(&config);

    let (latest, pending) =
        tokio::try_join!(chain.get_nonce(address), chain.get_pending_nonce(address))?;

    let storage = SettlementStorage::in_memory();
    storage.write_last_transaction(tx_hash, nonce).await?;
    let working = WorkingNonce::new(pending);
    let outcome = NonceSyncer::new(chain, storage, address).sync(&working).await?;

    println!("signer:  {address}");
    println!("latest:  {latest}");
    println!("pending: {pending}");
    println!("outcome: {outcome:?}");
    println!("working: {}", working.get());

    Ok(())
}

async fn relay(config: SettlementConfig, raw: Bytes) -> eyre::Result<()> {
    let relayer = TransactionRelayer::from_config(config.relay.clone());
    relayer.add_endpoint(config.chain.endpoint.as_str(), chain_client(&config));
    relayer.broadcast(&raw).await;

    for (endpoint, stats) in relayer.stats() {
        println!(
            "{endpoint}: rpc errors {}, io errors {}, unknown errors {}",
            stats.num_rpc_errors, stats.num_io_errors, stats.num_unknown_errors
        );
    }

    Ok(())
}

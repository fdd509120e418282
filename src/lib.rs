//! # Settler
//!
//! Library settling off-chain items on an EVM chain: batching, signing, sending, relaying and
//! confirming their transactions while keeping the signer nonce consistent across restarts.

pub mod chain;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod metrics;
pub mod nonce;
pub mod serde;
pub mod settle;
pub mod signers;
pub mod storage;
pub mod transactions;
pub mod worker;

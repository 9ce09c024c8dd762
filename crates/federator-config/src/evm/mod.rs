// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use ethers::types::Address;
use federator_types::rpc_url::RpcUrl;
use serde::{Deserialize, Serialize};

use crate::defaults;

/// EvmChainConfig is the configuration of one EVM chain: how to reach it, and
/// where its bridge and federation contracts live.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EvmChainConfig {
    /// String that groups configuration for this chain on a human-readable name.
    pub name: String,
    /// Boolean indicating EVM based networks are enabled or not.
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    /// Http(s) Endpoint for quick Req/Res
    #[serde(skip_serializing)]
    pub http_endpoint: RpcUrl,
    /// More endpoints of the same chain. Requests are spread round-robin over
    /// `http-endpoint` and these.
    #[serde(skip_serializing, default)]
    pub fallback_http_endpoints: Vec<RpcUrl>,
    /// Block Explorer for this chain.
    ///
    /// Optional, and only used for printing links to transactions.
    #[serde(skip_serializing)]
    pub explorer: Option<url::Url>,
    /// chain specific id (output of chainId opcode on EVM networks)
    #[serde(rename(serialize = "chainId"))]
    pub chain_id: u64,
    /// The bridge contract of this chain.
    pub bridge: BridgeContractConfig,
    /// The gate proposals go through when this chain is the destination.
    pub federation: FederationBackendConfig,
    /// How many blocks must be built on top of an event before it is acted on.
    #[serde(
        default = "defaults::block_confirmations",
        rename(serialize = "blockConfirmations")
    )]
    pub block_confirmations: u64,
    /// Controls the events watcher
    #[serde(default, rename(serialize = "eventsWatcher"))]
    pub events_watcher: EventsWatcherConfig,
    /// Transaction sender configuration
    #[serde(default, rename(serialize = "txSender"))]
    pub tx_sender: TxSenderConfig,
}

impl EvmChainConfig {
    /// Every configured endpoint of this chain, the primary one first.
    pub fn endpoints(&self) -> impl Iterator<Item = &RpcUrl> {
        std::iter::once(&self.http_endpoint)
            .chain(self.fallback_http_endpoints.iter())
    }
}

/// BridgeContractConfig represents the configuration for the bridge contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BridgeContractConfig {
    /// The address of this contract on this chain.
    pub address: Address,
    /// the block number where this contract got deployed at.
    #[serde(rename(serialize = "deployedAt"))]
    pub deployed_at: u64,
}

/// Enumerates the supported federation backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FederationBackendConfig {
    /// Vote through the `Federation` contract, which calls the bridge itself once
    /// enough members voted.
    Federation(FederationContractConfig),
    /// Submit or confirm `acceptTransfer` calls through a multisig wallet.
    MultiSig(MultiSigWalletConfig),
}

impl FederationBackendConfig {
    /// The contract federator transactions are sent to.
    pub fn address(&self) -> Address {
        match self {
            FederationBackendConfig::Federation(c) => c.address,
            FederationBackendConfig::MultiSig(c) => c.address,
        }
    }
}

/// FederationContractConfig represents the configuration for the Federation contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FederationContractConfig {
    /// The address of this contract on this chain.
    pub address: Address,
}

/// MultiSigWalletConfig represents the configuration for the multisig wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MultiSigWalletConfig {
    /// The address of the wallet on this chain.
    pub address: Address,
    /// How many of the most recent wallet transactions are searched for one
    /// that already proposes the same transfer.
    #[serde(default = "defaults::multisig_lookback")]
    pub lookback: u64,
}

/// EventsWatcherConfig is the configuration for the bridge events watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EventsWatcherConfig {
    /// Polling interval in milliseconds
    #[serde(
        default = "defaults::polling_interval",
        rename(serialize = "pollingInterval")
    )]
    pub polling_interval: u64,
    /// The maximum number of blocks to fetch in one request.
    #[serde(skip_serializing, default = "defaults::max_blocks_per_step")]
    pub max_blocks_per_step: u64,
    /// The maximum number of blocks one pass scans.
    #[serde(skip_serializing, default = "defaults::max_blocks_per_pass")]
    pub max_blocks_per_pass: u64,
    /// print sync progress frequency in milliseconds
    /// if it is zero, means no progress will be printed.
    #[serde(skip_serializing, default = "defaults::print_progress_interval")]
    pub print_progress_interval: u64,
    /// How many times a failed chain read is retried.
    #[serde(skip_serializing, default = "defaults::max_read_retries")]
    pub max_retries: usize,
    /// Milliseconds before the first retry of a failed chain read.
    #[serde(skip_serializing, default = "defaults::read_retry_interval")]
    pub retry_interval: u64,
}

impl Default for EventsWatcherConfig {
    fn default() -> Self {
        Self {
            polling_interval: defaults::polling_interval(),
            max_blocks_per_step: defaults::max_blocks_per_step(),
            max_blocks_per_pass: defaults::max_blocks_per_pass(),
            print_progress_interval: defaults::print_progress_interval(),
            max_retries: defaults::max_read_retries(),
            retry_interval: defaults::read_retry_interval(),
        }
    }
}

/// TxSenderConfig is the configuration for sending transactions to this chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TxSenderConfig {
    /// Milliseconds to wait for a receipt before the transaction counts as unconfirmed.
    #[serde(default = "defaults::receipt_timeout")]
    pub receipt_timeout: u64,
    /// Milliseconds between two receipt polls.
    #[serde(default = "defaults::receipt_polling_interval")]
    pub receipt_polling_interval: u64,
    /// Gas limit used when estimation fails.
    #[serde(default = "defaults::default_gas_limit")]
    pub default_gas_limit: u64,
    /// Factor applied to the gas estimate.
    #[serde(default = "defaults::gas_limit_multiplier")]
    pub gas_limit_multiplier: f64,
    /// Factor applied to the node's gas price.
    #[serde(default = "defaults::gas_price_multiplier")]
    pub gas_price_multiplier: f64,
    /// How many times an unconfirmed transaction is sent again, with a fresh nonce.
    #[serde(default = "defaults::max_unconfirmed_retries")]
    pub max_unconfirmed_retries: usize,
}

impl Default for TxSenderConfig {
    fn default() -> Self {
        Self {
            receipt_timeout: defaults::receipt_timeout(),
            receipt_polling_interval: defaults::receipt_polling_interval(),
            default_gas_limit: defaults::default_gas_limit(),
            gas_limit_multiplier: defaults::gas_limit_multiplier(),
            gas_price_multiplier: defaults::gas_price_multiplier(),
            max_unconfirmed_retries: defaults::max_unconfirmed_retries(),
        }
    }
}

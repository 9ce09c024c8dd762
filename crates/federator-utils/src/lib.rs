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

//! Shared building blocks of the bridge federator: the error taxonomy, the
//! probe logging target, metrics and the round-robin JSON-RPC client.

use ethers::types::H256;

/// Explorer links for transaction hashes.
pub mod explorer;
/// Metrics functionality
pub mod metric;
/// Multi provider for ethers.
pub mod multi_provider;
/// A module used for debugging federator lifecycle, sync state, or other federator state.
pub mod probe;
/// Retry functionality
pub mod retry;

/// An enum of all possible errors that could be encountered during the execution of the
/// federator.
///
/// The first group of variants is the federator's own taxonomy, the rest are transparent
/// wrappers around the errors of the crates we use.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The chain endpoint could not be reached, even after retrying.
    #[error("Chain {} unavailable: {}", chain_id, reason)]
    ChainUnavailable {
        /// The chain id of the unreachable chain.
        chain_id: u64,
        /// Why the last attempt failed.
        reason: String,
    },
    /// The destination refused the transaction, or it reverted.
    #[error("Transaction rejected: {}", reason)]
    Rejected {
        /// The revert or refusal reason reported by the node.
        reason: String,
    },
    /// The transaction was broadcast but no receipt arrived in time.
    #[error("Transaction {:?} unconfirmed", tx_hash)]
    Unconfirmed {
        /// The hash of the transaction that was broadcast.
        tx_hash: H256,
    },
    /// The durable store holds an entry that can not be read back.
    #[error("Store corrupt: {}", _0)]
    StoreCorrupt(String),
    /// The configuration is invalid.
    #[error("Configuration error: {}", _0)]
    Configuration(String),
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Error in Http Provider (ethers client).
    #[error(transparent)]
    EthersProvider(#[from] ethers::providers::ProviderError),
    /// Ether wallet errors.
    #[error(transparent)]
    EtherWalletError(#[from] ethers::signers::WalletError),
    /// ABI encoding or decoding error.
    #[error(transparent)]
    Abi(#[from] ethers::core::abi::AbiError),
    /// Sled database error.
    #[error(transparent)]
    Sled(#[from] sled::Error),
    /// Sled transaction error.
    #[error(transparent)]
    SledTransaction(
        #[from] sled::transaction::TransactionError<std::io::Error>,
    ),
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
    /// EVM Chain not found.
    #[error("Chain Not Found: {}", chain_id)]
    ChainNotFound {
        /// The name or id of the chain.
        chain_id: String,
    },
    /// Federator instance not found.
    #[error("Federator Not Found: {}", name)]
    FederatorNotFound {
        /// The configured name of the instance.
        name: String,
    },
    /// A transfer event id could not be parsed.
    #[error("Invalid transfer event id: {}", _0)]
    InvalidTransferEventId(String),
    /// Provider not found error.
    #[error("Provider not found for index {0}")]
    ProviderNotFound(usize),
}

impl Error {
    /// Returns true if the error must stop the federator instance instead of being retried
    /// on the next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::StoreCorrupt(_)
                | Error::Configuration(_)
                | Error::Sled(_)
                | Error::SledTransaction(_)
                | Error::Io(_)
                | Error::Config(_)
                | Error::ParseConfig(_)
                | Error::ChainNotFound { .. }
                | Error::FederatorNotFound { .. }
        )
    }

    /// Wraps any transport level failure of `chain_id` into [`Error::ChainUnavailable`].
    pub fn chain_unavailable(chain_id: u64, reason: impl ToString) -> Self {
        Error::ChainUnavailable {
            chain_id,
            reason: reason.to_string(),
        }
    }
}

/// A type alias for the result for the federator, that uses the `Error` enum.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_and_config_errors_are_fatal() {
        assert!(Error::StoreCorrupt("bad cursor".into()).is_fatal());
        assert!(Error::Configuration("shared path".into()).is_fatal());
        assert!(!Error::chain_unavailable(31, "timeout").is_fatal());
        assert!(!Error::Rejected {
            reason: "execution reverted".into()
        }
        .is_fatal());
        assert!(!Error::Unconfirmed {
            tx_hash: H256::zero()
        }
        .is_fatal());
    }

    #[test]
    fn chain_unavailable_keeps_the_reason() {
        let err = Error::chain_unavailable(42, "connection refused");
        assert_eq!(err.to_string(), "Chain 42 unavailable: connection refused");
    }
}

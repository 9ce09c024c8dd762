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

//! Sending proposals to the destination chain.
//!
//! A [`TransactionSubmitter`] owns one key. For every proposal the federator first
//! calls [`TransactionSubmitter::simulate`], and only then [`TransactionSubmitter::send`],
//! which reads a fresh nonce, prices the transaction, signs, broadcasts and waits
//! for the receipt.
//!
//! `send` reports its outcome through the federator error taxonomy:
//!
//! * `Ok(SubmitReceipt)` once the transaction is mined successfully.
//! * [`Error::Rejected`] when the node refuses the transaction or it reverts.
//! * [`Error::Unconfirmed`] when it was broadcast but no receipt arrived in time,
//!   or the node reported a nonce race. The caller may send again.
//! * [`Error::ChainUnavailable`] when the node could not be reached.

use std::time::Duration;

use ethers::providers::MiddlewareError;
use ethers::types::{Address, H256, U256};
use federator_config::evm::TxSenderConfig;
use federator_types::{CallRequest, SubmitReceipt};
use federator_utils::{Error, Result};

/// EVM transaction sender.
pub mod evm;
/// In-memory submitter for tests.
pub mod mocked;

#[doc(hidden)]
pub use evm::EvmTransactionSender;

/// Sends calls built by a federation backend from the key of one federator instance.
#[async_trait::async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// The address derived from the held key. Votes are cast from it.
    fn address(&self) -> Address;
    /// Runs `call` as an `eth_call` from [`Self::address`] against the latest state.
    ///
    /// Returns [`Error::Rejected`] if it would revert.
    async fn simulate(&self, call: &CallRequest) -> Result<()>;
    /// Signs and broadcasts `call`, then waits for its receipt.
    async fn send(&self, call: &CallRequest) -> Result<SubmitReceipt>;
}

#[async_trait::async_trait]
impl<T> TransactionSubmitter for std::sync::Arc<T>
where
    T: TransactionSubmitter + ?Sized,
{
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn simulate(&self, call: &CallRequest) -> Result<()> {
        (**self).simulate(call).await
    }

    async fn send(&self, call: &CallRequest) -> Result<SubmitReceipt> {
        (**self).send(call).await
    }
}

/// Gas and receipt tuning of a [`EvmTransactionSender`].
#[derive(Debug, Clone, PartialEq)]
pub struct TxSenderSettings {
    pub receipt_timeout: Duration,
    pub receipt_polling_interval: Duration,
    /// Used when the node can not estimate the call.
    pub default_gas_limit: U256,
    pub gas_limit_multiplier: f64,
    pub gas_price_multiplier: f64,
    /// Block explorer, only used to print links.
    pub explorer: Option<url::Url>,
}

impl TxSenderSettings {
    pub fn from_config(config: &TxSenderConfig, explorer: Option<url::Url>) -> Self {
        Self {
            receipt_timeout: Duration::from_millis(config.receipt_timeout),
            receipt_polling_interval: Duration::from_millis(
                config.receipt_polling_interval,
            ),
            default_gas_limit: U256::from(config.default_gas_limit),
            gas_limit_multiplier: config.gas_limit_multiplier,
            gas_price_multiplier: config.gas_price_multiplier,
            explorer,
        }
    }
}

impl Default for TxSenderSettings {
    fn default() -> Self {
        Self::from_config(&TxSenderConfig::default(), None)
    }
}

/// Scales `value` by `multiplier`, with a precision of a thousandth.
pub fn scale(value: U256, multiplier: f64) -> U256 {
    let permille = (multiplier * 1000.0).round().max(0.0) as u64;
    value.saturating_mul(U256::from(permille)) / U256::from(1000u64)
}

/// Node messages meaning our nonce was taken, or the very same transaction is
/// already in the pool.
const NONCE_RACE_MESSAGES: [&str; 4] = [
    "nonce too low",
    "already known",
    "known transaction",
    "replacement transaction underpriced",
];

/// JSON-RPC error codes meaning the node asks us to slow down.
const RATE_LIMIT_CODES: [i64; 3] = [429, -32005, -32016];

/// Maps a middleware error of `chain_id` onto the federator taxonomy.
///
/// `broadcast` is the hash of the signed transaction when the error happened
/// while sending it. Only then can a nonce race be reported as unconfirmed.
pub fn classify<E: MiddlewareError>(
    chain_id: u64,
    err: &E,
    broadcast: Option<H256>,
) -> Error {
    let Some(response) = err.as_error_response() else {
        return Error::chain_unavailable(chain_id, err);
    };
    if RATE_LIMIT_CODES.contains(&response.code) {
        return Error::chain_unavailable(chain_id, &response.message);
    }
    let message = response.message.to_lowercase();
    match broadcast {
        Some(tx_hash)
            if NONCE_RACE_MESSAGES.iter().any(|m| message.contains(m)) =>
        {
            Error::Unconfirmed { tx_hash }
        }
        _ => Error::Rejected {
            reason: response.message.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::{HttpClientError, JsonRpcError, ProviderError};

    #[test]
    fn scaling_keeps_a_thousandth_of_precision() {
        assert_eq!(scale(U256::from(100_000u64), 2.0), U256::from(200_000u64));
        assert_eq!(scale(U256::from(1000u64), 1.125), U256::from(1125u64));
        assert_eq!(scale(U256::from(21_000u64), 1.0), U256::from(21_000u64));
    }

    fn rpc_error(code: i64, message: &str) -> ProviderError {
        ProviderError::from(HttpClientError::JsonRpcError(JsonRpcError {
            code,
            message: message.into(),
            data: None,
        }))
    }

    #[test]
    fn revert_is_rejected() {
        let err = rpc_error(3, "execution reverted: Transfer already processed");
        let classified = classify(31, &err, None);
        assert!(matches!(
            classified,
            Error::Rejected { ref reason } if reason.contains("already processed")
        ));
    }

    #[test]
    fn nonce_race_after_broadcast_is_unconfirmed() {
        let hash = H256::repeat_byte(7);
        let err = rpc_error(-32000, "nonce too low");
        assert!(matches!(
            classify(31, &err, Some(hash)),
            Error::Unconfirmed { tx_hash } if tx_hash == hash
        ));
        let err = rpc_error(-32000, "already known");
        assert!(matches!(
            classify(31, &err, Some(hash)),
            Error::Unconfirmed { .. }
        ));
    }

    #[test]
    fn transport_and_rate_limit_errors_mean_unavailable() {
        let err = ProviderError::CustomError("connection refused".into());
        assert!(matches!(
            classify(31, &err, None),
            Error::ChainUnavailable { chain_id: 31, .. }
        ));
        let err = rpc_error(-32005, "daily request count exceeded");
        assert!(matches!(
            classify(31, &err, None),
            Error::ChainUnavailable { .. }
        ));
    }

    #[test]
    fn settings_follow_the_chain_config() {
        let config = TxSenderConfig {
            receipt_timeout: 2_000,
            default_gas_limit: 1_000_000,
            ..Default::default()
        };
        let settings = TxSenderSettings::from_config(&config, None);
        assert_eq!(settings.receipt_timeout, Duration::from_secs(2));
        assert_eq!(settings.default_gas_limit, U256::from(1_000_000u64));
    }
}

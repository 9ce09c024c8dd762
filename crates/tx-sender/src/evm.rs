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

use std::sync::Arc;

use ethers::core::types::transaction::eip2718::TypedTransaction;
use ethers::middleware::SignerMiddleware;
use ethers::providers::Middleware;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{
    Address, BlockNumber, TransactionReceipt, TransactionRequest, H256, U256,
};
use ethers::utils::keccak256;
use federator_types::{CallRequest, SubmitReceipt};
use federator_utils::explorer::TxLink;
use federator_utils::{probe, Error, Result};

use crate::{classify, scale, TransactionSubmitter, TxSenderSettings};

/// Sends proposals to an EVM chain, signing them with a local wallet.
///
/// The nonce is read from the `pending` block right before every broadcast and
/// never cached, since other signers may share the key's account.
#[derive(Debug)]
pub struct EvmTransactionSender<M: Middleware> {
    chain_id: u64,
    client: SignerMiddleware<Arc<M>, LocalWallet>,
    settings: TxSenderSettings,
}

impl<M> EvmTransactionSender<M>
where
    M: Middleware + 'static,
{
    /// Creates a sender on `chain_id`. The wallet is bound to that chain id.
    pub fn new(
        chain_id: u64,
        provider: Arc<M>,
        wallet: LocalWallet,
        settings: TxSenderSettings,
    ) -> Self {
        let wallet = wallet.with_chain_id(chain_id);
        Self {
            chain_id,
            client: SignerMiddleware::new(provider, wallet),
            settings,
        }
    }

    fn request(&self, call: &CallRequest) -> TransactionRequest {
        TransactionRequest::new()
            .from(self.address())
            .to(call.to)
            .data(call.data.clone())
            .value(call.value)
            .chain_id(self.chain_id)
    }

    async fn gas_limit(&self, tx: &TypedTransaction) -> U256 {
        match self.client.estimate_gas(tx, None).await {
            Ok(estimate) => scale(estimate, self.settings.gas_limit_multiplier),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    fallback = %self.settings.default_gas_limit,
                    "Gas estimation failed, using the default gas limit",
                );
                self.settings.default_gas_limit
            }
        }
    }

    fn finalize(&self, receipt: TransactionReceipt) -> Result<SubmitReceipt> {
        let tx_hash = receipt.transaction_hash;
        let link = TxLink::new(self.settings.explorer.as_ref(), tx_hash);
        if matches!(receipt.status, Some(status) if status.is_zero()) {
            tracing::error!("Tx {} reverted", link);
            return Err(Error::Rejected {
                reason: format!("transaction {tx_hash:?} reverted"),
            });
        }
        tracing::info!("Tx {} mined", link);
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::TxSender,
            chain_id = %self.chain_id,
            finalized = true,
            %tx_hash,
        );
        Ok(SubmitReceipt {
            tx_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()),
            gas_used: receipt.gas_used,
        })
    }
}

#[async_trait::async_trait]
impl<M> TransactionSubmitter for EvmTransactionSender<M>
where
    M: Middleware + 'static,
{
    fn address(&self) -> Address {
        self.client.address()
    }

    #[tracing::instrument(skip_all, fields(chain_id = self.chain_id, to = ?call.to))]
    async fn simulate(&self, call: &CallRequest) -> Result<()> {
        let tx: TypedTransaction = self.request(call).into();
        let outcome = self.client.call(&tx, None).await;
        let dry_run = if outcome.is_ok() { "passed" } else { "failed" };
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::TxSender,
            chain_id = %self.chain_id,
            dry_run,
        );
        outcome
            .map(|_| ())
            .map_err(|e| classify(self.chain_id, &e, None))
    }

    #[tracing::instrument(skip_all, fields(chain_id = self.chain_id, to = ?call.to))]
    async fn send(&self, call: &CallRequest) -> Result<SubmitReceipt> {
        let from = self.address();
        let nonce = self
            .client
            .get_transaction_count(from, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| classify(self.chain_id, &e, None))?;
        let mut tx: TypedTransaction = self.request(call).nonce(nonce).into();
        let gas = self.gas_limit(&tx).await;
        tx.set_gas(gas);
        let gas_price = self
            .client
            .get_gas_price()
            .await
            .map_err(|e| classify(self.chain_id, &e, None))?;
        tx.set_gas_price(scale(gas_price, self.settings.gas_price_multiplier));

        let signature = self.client.signer().sign_transaction(&tx).await?;
        let raw = tx.rlp_signed(&signature);
        let tx_hash = H256::from(keccak256(&raw));
        let link = TxLink::new(self.settings.explorer.as_ref(), tx_hash);
        tracing::debug!(%nonce, %gas, "Sending tx {}", link);

        let pending = match self.client.send_raw_transaction(raw).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::TxSender,
                    chain_id = %self.chain_id,
                    errored = true,
                    error = %e,
                    %tx_hash,
                );
                return Err(classify(self.chain_id, &e, Some(tx_hash)));
            }
        };
        tracing::info!("Tx {} is submitted and pending!", link);
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::TxSender,
            chain_id = %self.chain_id,
            pending = true,
            %tx_hash,
        );

        let pending = pending.interval(self.settings.receipt_polling_interval);
        match tokio::time::timeout(self.settings.receipt_timeout, pending).await
        {
            Ok(Ok(Some(receipt))) => self.finalize(receipt),
            Ok(Ok(None)) => {
                tracing::warn!("Tx {} dropped from mempool", link);
                Err(Error::Unconfirmed { tx_hash })
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Lost track of tx {}", link);
                Err(Error::Unconfirmed { tx_hash })
            }
            Err(_) => {
                tracing::warn!(
                    timeout = ?self.settings.receipt_timeout,
                    "No receipt for tx {} in time",
                    link,
                );
                Err(Error::Unconfirmed { tx_hash })
            }
        }
    }
}

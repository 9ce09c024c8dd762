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

use ethers::abi::AbiEncode;
use ethers::providers::Middleware;
use ethers::types::{Address, Bytes, U256};
use federator_types::contracts::{
    AcceptTransferCall, ConfirmTransactionCall, MultiSigWalletContract,
    SubmitTransactionCall,
};
use federator_types::{CallRequest, TransferEvent};
use federator_utils::{probe, Error, Result};

use crate::{contract_log_index, FederationBackend};

/// Proposes transfers as `acceptTransfer` calls owned by a multisig wallet.
///
/// The first owner to see a transfer submits the wallet transaction, the
/// others confirm it. Existing proposals are found by scanning the last
/// `lookback` wallet transactions for the same destination and data.
#[derive(Debug)]
pub struct MultiSigWalletGate<M: Middleware> {
    chain_id: u64,
    wallet: MultiSigWalletContract<M>,
    bridge: Address,
    lookback: u64,
}

/// A wallet transaction proposing the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Proposal {
    id: U256,
    executed: bool,
}

impl<M> MultiSigWalletGate<M>
where
    M: Middleware + 'static,
{
    pub fn new(
        chain_id: u64,
        wallet: Address,
        bridge: Address,
        lookback: u64,
        client: Arc<M>,
    ) -> Self {
        Self {
            chain_id,
            wallet: MultiSigWalletContract::new(wallet, client),
            bridge,
            lookback,
        }
    }

    fn unavailable(&self, e: impl ToString) -> Error {
        Error::chain_unavailable(self.chain_id, e)
    }

    /// Looks for the wallet transaction carrying `data`, newest first.
    async fn find_proposal(&self, data: &Bytes) -> Result<Option<Proposal>> {
        let count = self
            .wallet
            .transaction_count()
            .call()
            .await
            .map_err(|e| self.unavailable(e))?;
        let oldest = count.saturating_sub(U256::from(self.lookback));
        let mut id = count;
        while id > oldest {
            id -= U256::one();
            let (destination, _value, tx_data, executed) = self
                .wallet
                .transactions(id)
                .call()
                .await
                .map_err(|e| self.unavailable(e))?;
            if destination == self.bridge && &tx_data == data {
                return Ok(Some(Proposal { id, executed }));
            }
        }
        Ok(None)
    }
}

/// The bridge call the wallet executes for `event`.
pub fn accept_transfer_data(event: &TransferEvent) -> Result<Bytes> {
    let call = AcceptTransferCall {
        original_token_address: event.token,
        sender: event.sender,
        receiver: event.receiver,
        amount: event.amount,
        block_hash: event.block_hash.0,
        transaction_hash: event.id.tx_hash.0,
        log_index: contract_log_index(event)?,
    };
    Ok(call.encode().into())
}

#[async_trait::async_trait]
impl<M> FederationBackend for MultiSigWalletGate<M>
where
    M: Middleware + 'static,
{
    #[tracing::instrument(skip_all, fields(event = %event.id))]
    async fn has_quorum(&self, event: &TransferEvent) -> Result<bool> {
        let data = accept_transfer_data(event)?;
        let Some(proposal) = self.find_proposal(&data).await? else {
            return Ok(false);
        };
        if proposal.executed {
            return Ok(true);
        }
        let confirmed = self
            .wallet
            .is_confirmed(proposal.id)
            .call()
            .await
            .map_err(|e| self.unavailable(e))?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Federation,
            backend = "MultiSig",
            wallet_tx = %proposal.id,
            confirmed,
        );
        Ok(confirmed)
    }

    #[tracing::instrument(skip_all, fields(event = %event.id, ?voter))]
    async fn has_voted(
        &self,
        event: &TransferEvent,
        voter: Address,
    ) -> Result<bool> {
        let data = accept_transfer_data(event)?;
        match self.find_proposal(&data).await? {
            Some(proposal) => self
                .wallet
                .confirmations(proposal.id, voter)
                .call()
                .await
                .map_err(|e| self.unavailable(e)),
            None => Ok(false),
        }
    }

    #[tracing::instrument(skip_all, fields(event = %event.id))]
    async fn submit_or_vote(
        &self,
        event: &TransferEvent,
        _voter: Address,
    ) -> Result<CallRequest> {
        let data = accept_transfer_data(event)?;
        let call = match self.find_proposal(&data).await? {
            Some(proposal) => {
                tracing::debug!(wallet_tx = %proposal.id, "Confirming wallet transaction");
                ConfirmTransactionCall {
                    transaction_id: proposal.id,
                }
                .encode()
            }
            None => {
                tracing::debug!("Submitting wallet transaction");
                SubmitTransactionCall {
                    destination: self.bridge,
                    value: U256::zero(),
                    data,
                }
                .encode()
            }
        };
        Ok(CallRequest::new(self.wallet.address(), call))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::transfer_event;
    use ethers::abi::{AbiDecode, Token};
    use ethers::providers::{MockProvider, Provider};
    use ethers::types::H160;

    const WALLET: Address = H160([0x5a; 20]);
    const BRIDGE: Address = H160([0xb2; 20]);

    fn gate() -> (MultiSigWalletGate<Provider<MockProvider>>, MockProvider) {
        let (provider, mock) = Provider::mocked();
        let gate =
            MultiSigWalletGate::new(30, WALLET, BRIDGE, 10, Arc::new(provider));
        (gate, mock)
    }

    fn encoded(tokens: &[Token]) -> Bytes {
        Bytes::from(ethers::abi::encode(tokens))
    }

    fn wallet_transaction(data: Bytes, executed: bool) -> Bytes {
        encoded(&[
            Token::Address(BRIDGE),
            Token::Uint(U256::zero()),
            Token::Bytes(data.to_vec()),
            Token::Bool(executed),
        ])
    }

    #[tokio::test]
    async fn first_owner_submits() {
        let (gate, mock) = gate();
        mock.push::<Bytes, _>(encoded(&[Token::Uint(U256::zero())]))
            .unwrap();
        let event = transfer_event(1);
        let call = gate
            .submit_or_vote(&event, Address::repeat_byte(1))
            .await
            .unwrap();
        assert_eq!(call.to, WALLET);
        let submit = SubmitTransactionCall::decode(&call.data).unwrap();
        assert_eq!(submit.destination, BRIDGE);
        assert_eq!(submit.data, accept_transfer_data(&event).unwrap());
    }

    #[tokio::test]
    async fn later_owners_confirm_the_existing_proposal() {
        let (gate, mock) = gate();
        let event = transfer_event(1);
        let data = accept_transfer_data(&event).unwrap();
        // responses are served last in, first out
        mock.push::<Bytes, _>(wallet_transaction(data, false)).unwrap();
        mock.push::<Bytes, _>(encoded(&[Token::Uint(U256::one())]))
            .unwrap();
        let call = gate
            .submit_or_vote(&event, Address::repeat_byte(1))
            .await
            .unwrap();
        let confirm = ConfirmTransactionCall::decode(&call.data).unwrap();
        assert_eq!(confirm.transaction_id, U256::zero());
    }

    #[tokio::test]
    async fn executed_proposal_has_quorum() {
        let (gate, mock) = gate();
        let event = transfer_event(4);
        let data = accept_transfer_data(&event).unwrap();
        mock.push::<Bytes, _>(wallet_transaction(data, true)).unwrap();
        mock.push::<Bytes, _>(encoded(&[Token::Uint(U256::one())]))
            .unwrap();
        assert!(gate.has_quorum(&event).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_transfer_was_not_voted() {
        let (gate, mock) = gate();
        mock.push::<Bytes, _>(encoded(&[Token::Uint(U256::zero())]))
            .unwrap();
        let voted = gate
            .has_voted(&transfer_event(1), Address::repeat_byte(1))
            .await
            .unwrap();
        assert!(!voted);
    }
}

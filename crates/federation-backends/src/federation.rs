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
use ethers::types::Address;
use federator_types::contracts::{FederationContract, VoteTransactionCall};
use federator_types::{CallRequest, TransferEvent};
use federator_utils::{probe, Error, Result};

use crate::{contract_log_index, transaction_id, FederationBackend};

/// Votes through the `Federation` contract, which executes the transfer on the
/// bridge once enough members voted for it.
#[derive(Debug)]
pub struct FederationGate<M: Middleware> {
    chain_id: u64,
    contract: FederationContract<M>,
}

impl<M> FederationGate<M>
where
    M: Middleware + 'static,
{
    pub fn new(chain_id: u64, address: Address, client: Arc<M>) -> Self {
        Self {
            chain_id,
            contract: FederationContract::new(address, client),
        }
    }

    fn unavailable(&self, e: impl ToString) -> Error {
        Error::chain_unavailable(self.chain_id, e)
    }
}

/// The `voteTransaction` call of `event`.
pub fn vote_call(event: &TransferEvent) -> Result<VoteTransactionCall> {
    Ok(VoteTransactionCall {
        original_token_address: event.token,
        sender: event.sender,
        receiver: event.receiver,
        amount: event.amount,
        block_hash: event.block_hash.0,
        transaction_hash: event.id.tx_hash.0,
        log_index: contract_log_index(event)?,
    })
}

#[async_trait::async_trait]
impl<M> FederationBackend for FederationGate<M>
where
    M: Middleware + 'static,
{
    #[tracing::instrument(skip_all, fields(event = %event.id))]
    async fn has_quorum(&self, event: &TransferEvent) -> Result<bool> {
        let id = transaction_id(event)?;
        let processed = self
            .contract
            .transaction_was_processed(id.0)
            .call()
            .await
            .map_err(|e| self.unavailable(e))?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Federation,
            backend = "Federation",
            transaction_id = ?id,
            processed,
        );
        Ok(processed)
    }

    #[tracing::instrument(skip_all, fields(event = %event.id, ?voter))]
    async fn has_voted(
        &self,
        event: &TransferEvent,
        voter: Address,
    ) -> Result<bool> {
        let id = transaction_id(event)?;
        // the contract answers for msg.sender
        self.contract
            .has_voted(id.0)
            .from(voter)
            .call()
            .await
            .map_err(|e| self.unavailable(e))
    }

    async fn submit_or_vote(
        &self,
        event: &TransferEvent,
        _voter: Address,
    ) -> Result<CallRequest> {
        let call = vote_call(event)?;
        let data = call.encode();
        tracing::debug!(
            event = %event.id,
            data = %hex::encode(&data),
            "Voting for transfer",
        );
        Ok(CallRequest::new(self.contract.address(), data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::transfer_event;
    use ethers::abi::{AbiDecode, Token};
    use ethers::providers::{MockProvider, Provider};
    use ethers::types::Bytes;

    fn gate() -> (FederationGate<Provider<MockProvider>>, MockProvider) {
        let (provider, mock) = Provider::mocked();
        let gate = FederationGate::new(
            30,
            Address::repeat_byte(0xfe),
            Arc::new(provider),
        );
        (gate, mock)
    }

    fn encoded_bool(value: bool) -> Bytes {
        Bytes::from(ethers::abi::encode(&[Token::Bool(value)]))
    }

    #[tokio::test]
    async fn vote_is_sent_to_the_federation_contract() {
        let (gate, _mock) = gate();
        let event = transfer_event(2);
        let call = gate
            .submit_or_vote(&event, Address::repeat_byte(1))
            .await
            .unwrap();
        assert_eq!(call.to, Address::repeat_byte(0xfe));
        let decoded = VoteTransactionCall::decode(&call.data).unwrap();
        assert_eq!(decoded.log_index, 2);
        assert_eq!(decoded.amount, event.amount);
        assert_eq!(decoded.transaction_hash, event.id.tx_hash.0);
    }

    #[tokio::test]
    async fn processed_transfer_has_quorum() {
        let (gate, mock) = gate();
        mock.push::<Bytes, _>(encoded_bool(true)).unwrap();
        assert!(gate.has_quorum(&transfer_event(0)).await.unwrap());
    }

    #[tokio::test]
    async fn unreachable_node_is_unavailable() {
        let (gate, _mock) = gate();
        // no queued response
        let err = gate
            .has_voted(&transfer_event(0), Address::repeat_byte(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChainUnavailable { chain_id: 30, .. }));
    }
}

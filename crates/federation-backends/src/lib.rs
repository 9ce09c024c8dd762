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

//! Federation backends are the gate between federators and the destination bridge.
//!
//! Every federator proposes the same transfer independently, and the backend only
//! lets the bridge act once enough of them agree. Two gates are supported:
//!
//! * [`federation::FederationGate`], where each member calls `voteTransaction` on the
//!   `Federation` contract.
//! * [`multisig::MultiSigWalletGate`], where the first member submits an
//!   `acceptTransfer` call to a multisig wallet and the others confirm it.

use std::sync::Arc;

use ethers::providers::Middleware;
use ethers::types::{Address, H256};
use ethers::utils::keccak256;
use federator_config::evm::{EvmChainConfig, FederationBackendConfig};
use federator_types::contracts::VoteTransactionCall;
use federator_types::{CallRequest, TransferEvent};
use federator_utils::{Error, Result};

pub mod federation;
/// A threshold gate kept in memory, for tests.
pub mod mocked;
pub mod multisig;

/// The quorum gate of a destination chain.
#[async_trait::async_trait]
pub trait FederationBackend: Send + Sync {
    /// Whether the destination already has enough votes for `event`, or already
    /// executed it.
    async fn has_quorum(&self, event: &TransferEvent) -> Result<bool>;
    /// Whether `voter` already voted for `event`.
    async fn has_voted(
        &self,
        event: &TransferEvent,
        voter: Address,
    ) -> Result<bool>;
    /// Builds the call that casts `voter`'s vote for `event`.
    async fn submit_or_vote(
        &self,
        event: &TransferEvent,
        voter: Address,
    ) -> Result<CallRequest>;
}

#[async_trait::async_trait]
impl<T> FederationBackend for Arc<T>
where
    T: FederationBackend + ?Sized,
{
    async fn has_quorum(&self, event: &TransferEvent) -> Result<bool> {
        (**self).has_quorum(event).await
    }

    async fn has_voted(
        &self,
        event: &TransferEvent,
        voter: Address,
    ) -> Result<bool> {
        (**self).has_voted(event, voter).await
    }

    async fn submit_or_vote(
        &self,
        event: &TransferEvent,
        voter: Address,
    ) -> Result<CallRequest> {
        (**self).submit_or_vote(event, voter).await
    }
}

/// The log index as the contracts store it, a `uint32`.
pub fn contract_log_index(event: &TransferEvent) -> Result<u32> {
    u32::try_from(event.id.log_index).map_err(|_| Error::Rejected {
        reason: format!(
            "log index {} of {} does not fit in uint32",
            event.id.log_index, event.id
        ),
    })
}

/// The id the destination contracts give to a transfer:
/// `keccak256(abi.encodePacked(token, sender, receiver, amount, blockHash, txHash, uint32(logIndex)))`.
pub fn transaction_id(event: &TransferEvent) -> Result<H256> {
    Ok(vote_id(&federation::vote_call(event)?))
}

/// [`transaction_id`] of the transfer a `voteTransaction` call is about.
pub fn vote_id(vote: &VoteTransactionCall) -> H256 {
    let mut amount = [0u8; 32];
    vote.amount.to_big_endian(&mut amount);
    let mut packed = Vec::with_capacity(3 * 20 + 3 * 32 + 4);
    packed.extend_from_slice(vote.original_token_address.as_bytes());
    packed.extend_from_slice(vote.sender.as_bytes());
    packed.extend_from_slice(vote.receiver.as_bytes());
    packed.extend_from_slice(&amount);
    packed.extend_from_slice(&vote.block_hash);
    packed.extend_from_slice(&vote.transaction_hash);
    packed.extend_from_slice(&vote.log_index.to_be_bytes());
    H256::from(keccak256(packed))
}

/// The backend configured for a destination chain.
#[derive(Debug)]
pub enum FederationBackendSelector<M: Middleware> {
    Federation(federation::FederationGate<M>),
    MultiSig(multisig::MultiSigWalletGate<M>),
}

impl<M> FederationBackendSelector<M>
where
    M: Middleware + 'static,
{
    /// Builds the backend of `chain`, reading it through `client`.
    pub fn from_config(chain: &EvmChainConfig, client: Arc<M>) -> Self {
        match &chain.federation {
            FederationBackendConfig::Federation(c) => Self::Federation(
                federation::FederationGate::new(chain.chain_id, c.address, client),
            ),
            FederationBackendConfig::MultiSig(c) => {
                Self::MultiSig(multisig::MultiSigWalletGate::new(
                    chain.chain_id,
                    c.address,
                    chain.bridge.address,
                    c.lookback,
                    client,
                ))
            }
        }
    }
}

#[async_trait::async_trait]
impl<M> FederationBackend for FederationBackendSelector<M>
where
    M: Middleware + 'static,
{
    async fn has_quorum(&self, event: &TransferEvent) -> Result<bool> {
        match self {
            Self::Federation(b) => b.has_quorum(event).await,
            Self::MultiSig(b) => b.has_quorum(event).await,
        }
    }

    async fn has_voted(
        &self,
        event: &TransferEvent,
        voter: Address,
    ) -> Result<bool> {
        match self {
            Self::Federation(b) => b.has_voted(event, voter).await,
            Self::MultiSig(b) => b.has_voted(event, voter).await,
        }
    }

    async fn submit_or_vote(
        &self,
        event: &TransferEvent,
        voter: Address,
    ) -> Result<CallRequest> {
        match self {
            Self::Federation(b) => b.submit_or_vote(event, voter).await,
            Self::MultiSig(b) => b.submit_or_vote(event, voter).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use ethers::types::{Address, Bytes, H256, U256};
    use federator_types::{TransferEvent, TransferEventId};

    pub fn transfer_event(log_index: u64) -> TransferEvent {
        TransferEvent {
            id: TransferEventId::new(31, H256::repeat_byte(0xcc), log_index),
            bridge: Address::repeat_byte(0xb1),
            token: Address::repeat_byte(0x70),
            sender: Address::repeat_byte(0xab),
            receiver: Address::repeat_byte(0xde),
            amount: U256::exp10(18),
            block_number: 120,
            block_hash: H256::repeat_byte(0x0b),
            user_data: Bytes::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::transfer_event;
    use super::*;

    #[test]
    fn transaction_id_covers_the_packed_fields() {
        let event = transfer_event(3);
        let mut packed = Vec::new();
        packed.extend_from_slice(&[0x70; 20]);
        packed.extend_from_slice(&[0xab; 20]);
        packed.extend_from_slice(&[0xde; 20]);
        let mut amount = [0u8; 32];
        ethers::types::U256::exp10(18).to_big_endian(&mut amount);
        packed.extend_from_slice(&amount);
        packed.extend_from_slice(&[0x0b; 32]);
        packed.extend_from_slice(&[0xcc; 32]);
        packed.extend_from_slice(&[0, 0, 0, 3]);
        assert_eq!(packed.len(), 160);
        assert_eq!(
            transaction_id(&event).unwrap(),
            H256::from(keccak256(packed))
        );
        assert_ne!(
            transaction_id(&event).unwrap(),
            transaction_id(&transfer_event(4)).unwrap()
        );
    }

    #[test]
    fn oversized_log_index_is_rejected() {
        let event = transfer_event(u64::from(u32::MAX) + 1);
        assert!(matches!(
            transaction_id(&event),
            Err(Error::Rejected { .. })
        ));
    }
}

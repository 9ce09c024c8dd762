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

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ethers::abi::{AbiDecode, AbiEncode};
use ethers::types::{Address, H256};
use federator_types::contracts::VoteTransactionCall;
use federator_types::{CallRequest, TransferEvent};
use federator_utils::{Error, Result};
use parking_lot::RwLock;

use crate::federation::vote_call;
use crate::{transaction_id, vote_id, FederationBackend};

#[derive(Debug, Default)]
struct Inner {
    votes: RwLock<HashMap<H256, HashSet<Address>>>,
    unavailable: AtomicBool,
}

/// A `Federation` contract living in memory.
///
/// It hands out real `voteTransaction` calls, but only learns about votes when
/// told through [`MockedFederation::record_call`] or [`MockedFederation::vote`].
/// Clones share the same votes.
#[derive(Debug, Clone)]
pub struct MockedFederation {
    chain_id: u64,
    address: Address,
    threshold: usize,
    inner: Arc<Inner>,
}

impl MockedFederation {
    pub fn new(chain_id: u64, address: Address, threshold: usize) -> Self {
        Self {
            chain_id,
            address,
            threshold,
            inner: Arc::default(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Casts `voter`'s vote for `event` directly.
    pub fn vote(&self, event: &TransferEvent, voter: Address) -> Result<()> {
        let id = transaction_id(event)?;
        self.inner.votes.write().entry(id).or_default().insert(voter);
        Ok(())
    }

    /// Applies a mined `voteTransaction` call sent by `voter`.
    pub fn record_call(&self, call: &CallRequest, voter: Address) -> Result<()> {
        if call.to != self.address {
            return Ok(());
        }
        let vote = VoteTransactionCall::decode(&call.data)?;
        let id = vote_id(&vote);
        self.inner.votes.write().entry(id).or_default().insert(voter);
        Ok(())
    }

    pub fn votes(&self, event: &TransferEvent) -> Result<usize> {
        let id = transaction_id(event)?;
        Ok(self.inner.votes.read().get(&id).map_or(0, HashSet::len))
    }

    /// Makes every read fail until set back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(Error::chain_unavailable(self.chain_id, "connection refused"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl FederationBackend for MockedFederation {
    async fn has_quorum(&self, event: &TransferEvent) -> Result<bool> {
        self.check_available()?;
        Ok(self.votes(event)? >= self.threshold)
    }

    async fn has_voted(
        &self,
        event: &TransferEvent,
        voter: Address,
    ) -> Result<bool> {
        self.check_available()?;
        let id = transaction_id(event)?;
        Ok(self
            .inner
            .votes
            .read()
            .get(&id)
            .map_or(false, |voters| voters.contains(&voter)))
    }

    async fn submit_or_vote(
        &self,
        event: &TransferEvent,
        _voter: Address,
    ) -> Result<CallRequest> {
        self.check_available()?;
        Ok(CallRequest::new(self.address, vote_call(event)?.encode()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::transfer_event;

    #[tokio::test]
    async fn mined_votes_count_towards_quorum() {
        let federation = MockedFederation::new(30, Address::repeat_byte(0xfe), 2);
        let event = transfer_event(0);
        let alice = Address::repeat_byte(1);
        let bob = Address::repeat_byte(2);

        let call = federation.submit_or_vote(&event, alice).await.unwrap();
        federation.record_call(&call, alice).unwrap();
        assert!(federation.has_voted(&event, alice).await.unwrap());
        assert!(!federation.has_voted(&event, bob).await.unwrap());
        assert!(!federation.has_quorum(&event).await.unwrap());

        federation.vote(&event, bob).unwrap();
        assert!(federation.has_quorum(&event).await.unwrap());
        assert!(!federation.has_quorum(&transfer_event(1)).await.unwrap());
    }

    #[tokio::test]
    async fn reads_fail_while_unavailable() {
        let federation = MockedFederation::new(30, Address::repeat_byte(0xfe), 1);
        federation.set_unavailable(true);
        let err = federation.has_quorum(&transfer_event(0)).await.unwrap_err();
        assert!(matches!(err, Error::ChainUnavailable { chain_id: 30, .. }));
    }
}

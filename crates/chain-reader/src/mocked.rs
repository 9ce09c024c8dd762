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

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use ethers::types::{Address, Bytes, H256, U256};
use federator_types::{TransferEvent, TransferEventId};
use federator_utils::{Error, Result};
use parking_lot::RwLock;

use crate::BridgeLogSource;

#[derive(Debug)]
struct Inner {
    chain_id: u64,
    bridge: Address,
    head: AtomicU64,
    events: RwLock<Vec<TransferEvent>>,
    failures_left: AtomicUsize,
    log_requests: AtomicUsize,
}

/// An in-memory bridge: events are pushed by hand, and the chain head is set
/// explicitly.
///
/// Clones share the same chain, so a test can keep a handle after giving one
/// to a [`ChainReader`](crate::ChainReader).
#[derive(Debug, Clone)]
pub struct MockedLogSource {
    inner: Arc<Inner>,
}

impl MockedLogSource {
    pub fn new(chain_id: u64, head: u64) -> Self {
        Self {
            inner: Arc::new(Inner {
                chain_id,
                bridge: Address::repeat_byte(0xb1),
                head: AtomicU64::new(head),
                events: RwLock::new(Vec::new()),
                failures_left: AtomicUsize::new(0),
                log_requests: AtomicUsize::new(0),
            }),
        }
    }

    pub fn set_head(&self, head: u64) {
        self.inner.head.store(head, Ordering::SeqCst);
    }

    /// Emits a transfer of one token at `block_number`, returning it.
    pub fn emit(&self, block_number: u64, log_index: u64) -> TransferEvent {
        let event = TransferEvent {
            id: TransferEventId::new(
                self.inner.chain_id,
                H256::from_low_u64_be(block_number * 1_000 + log_index),
                log_index,
            ),
            bridge: self.inner.bridge,
            token: Address::repeat_byte(0x70),
            sender: Address::repeat_byte(0x5e),
            receiver: Address::repeat_byte(0x2e),
            amount: U256::exp10(18),
            block_number,
            block_hash: H256::from_low_u64_be(block_number),
            user_data: Bytes::default(),
        };
        self.push_event(event.clone());
        event
    }

    pub fn push_event(&self, event: TransferEvent) {
        self.inner.events.write().push(event);
    }

    /// Makes the next `count` log requests fail.
    pub fn fail_next_requests(&self, count: usize) {
        self.inner.failures_left.store(count, Ordering::SeqCst);
    }

    /// How many log requests were made, failed ones included.
    pub fn log_requests(&self) -> usize {
        self.inner.log_requests.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl BridgeLogSource for MockedLogSource {
    fn chain_id(&self) -> u64 {
        self.inner.chain_id
    }

    fn bridge_address(&self) -> Address {
        self.inner.bridge
    }

    async fn latest_block(&self) -> Result<u64> {
        Ok(self.inner.head.load(Ordering::SeqCst))
    }

    async fn transfer_events(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<TransferEvent>> {
        self.inner.log_requests.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .inner
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok();
        if failing {
            return Err(Error::chain_unavailable(
                self.inner.chain_id,
                "connection refused",
            ));
        }
        let events = self.inner.events.read();
        Ok(events
            .iter()
            .filter(|e| from <= e.block_number && e.block_number <= to)
            .cloned()
            .collect())
    }
}

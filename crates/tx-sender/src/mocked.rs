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

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use ethers::types::{Address, H256, U256};
use federator_types::{CallRequest, SubmitReceipt};
use federator_utils::{Error, Result};
use parking_lot::Mutex;

use crate::TransactionSubmitter;

/// What the next [`MockedSubmitter::send`] does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Mined,
    Rejected(String),
    Unconfirmed,
    /// Times out like `Unconfirmed`, but the call is mined anyway.
    LandsLate,
    Unavailable,
}

type CallFilter = Box<dyn Fn(&CallRequest) -> bool + Send + Sync>;
type CallObserver = Box<dyn Fn(&CallRequest) + Send + Sync>;

struct Inner {
    chain_id: u64,
    address: Address,
    script: Mutex<VecDeque<SendOutcome>>,
    rejects_simulation: Mutex<Option<CallFilter>>,
    on_mined: Mutex<Vec<CallObserver>>,
    sent: Mutex<Vec<CallRequest>>,
    simulations: AtomicUsize,
    nonce: AtomicU64,
}

/// A destination chain that mines everything unless told otherwise.
///
/// Every `send` consumes one scripted [`SendOutcome`]; once the script is
/// empty, sends are mined. Clones share state.
#[derive(Clone)]
pub struct MockedSubmitter {
    inner: Arc<Inner>,
}

impl fmt::Debug for MockedSubmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockedSubmitter")
            .field("chain_id", &self.inner.chain_id)
            .field("address", &self.inner.address)
            .field("sent", &self.inner.sent.lock().len())
            .finish()
    }
}

impl MockedSubmitter {
    pub fn new(chain_id: u64, address: Address) -> Self {
        Self {
            inner: Arc::new(Inner {
                chain_id,
                address,
                script: Mutex::new(VecDeque::new()),
                rejects_simulation: Mutex::new(None),
                on_mined: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
                simulations: AtomicUsize::new(0),
                nonce: AtomicU64::new(0),
            }),
        }
    }

    /// Queues outcomes for the next sends, in order.
    pub fn script_sends(&self, outcomes: impl IntoIterator<Item = SendOutcome>) {
        self.inner.script.lock().extend(outcomes);
    }

    /// Makes `simulate` revert for every call matching `filter`.
    pub fn reject_simulation_when(
        &self,
        filter: impl Fn(&CallRequest) -> bool + Send + Sync + 'static,
    ) {
        *self.inner.rejects_simulation.lock() = Some(Box::new(filter));
    }

    /// Runs `observer` on every call that gets mined, which is how a mocked
    /// destination contract learns about votes.
    pub fn on_mined(
        &self,
        observer: impl Fn(&CallRequest) + Send + Sync + 'static,
    ) {
        self.inner.on_mined.lock().push(Box::new(observer));
    }

    /// Every call passed to `send`, failed ones included.
    pub fn sent(&self) -> Vec<CallRequest> {
        self.inner.sent.lock().clone()
    }

    pub fn simulations(&self) -> usize {
        self.inner.simulations.load(Ordering::SeqCst)
    }

    fn next_hash(&self) -> H256 {
        let nonce = self.inner.nonce.fetch_add(1, Ordering::SeqCst);
        H256::from_low_u64_be(0x7000 + nonce)
    }
}

#[async_trait::async_trait]
impl TransactionSubmitter for MockedSubmitter {
    fn address(&self) -> Address {
        self.inner.address
    }

    async fn simulate(&self, call: &CallRequest) -> Result<()> {
        self.inner.simulations.fetch_add(1, Ordering::SeqCst);
        let rejects = self
            .inner
            .rejects_simulation
            .lock()
            .as_ref()
            .map(|filter| filter(call))
            .unwrap_or(false);
        if rejects {
            return Err(Error::Rejected {
                reason: "execution reverted".into(),
            });
        }
        Ok(())
    }

    async fn send(&self, call: &CallRequest) -> Result<SubmitReceipt> {
        self.inner.sent.lock().push(call.clone());
        let outcome = self
            .inner
            .script
            .lock()
            .pop_front()
            .unwrap_or(SendOutcome::Mined);
        let tx_hash = self.next_hash();
        match outcome {
            SendOutcome::Mined => {
                for observer in self.inner.on_mined.lock().iter() {
                    observer(call);
                }
                Ok(SubmitReceipt {
                    tx_hash,
                    block_number: Some(1),
                    gas_used: Some(U256::from(21_000u64)),
                })
            }
            SendOutcome::Rejected(reason) => Err(Error::Rejected { reason }),
            SendOutcome::Unconfirmed => Err(Error::Unconfirmed { tx_hash }),
            SendOutcome::LandsLate => {
                for observer in self.inner.on_mined.lock().iter() {
                    observer(call);
                }
                Err(Error::Unconfirmed { tx_hash })
            }
            SendOutcome::Unavailable => Err(Error::chain_unavailable(
                self.inner.chain_id,
                "connection reset",
            )),
        }
    }
}

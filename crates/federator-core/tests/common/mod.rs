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

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, Bytes, H160, H256, U256};
use federation_backends::mocked::MockedFederation;
use federator_chain_reader::mocked::MockedLogSource;
use federator_chain_reader::{BridgeLogSource, ChainReader, ChainReaderConfig};
use federator_core::{Federator, InstanceSettings};
use federator_store::{
    FederatorStore, InMemoryStore, ProposalLedgerStore, ScanCursorStore,
};
use federator_tx_sender::mocked::MockedSubmitter;
use federator_types::{
    CursorKey, ProposalRecord, ScanCursor, TransferEvent, TransferEventId,
};
use federator_utils::metric::Metrics;
use federator_utils::{Error, Result};
use parking_lot::Mutex;

pub const ORIGIN: u64 = 31;
pub const DESTINATION: u64 = 5777;
pub const DEPLOYED_AT: u64 = 100;
pub const VOTER: Address = H160([0xf1; 20]);

/// Where a [`CrashingStore`] pretends the process died.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// Before the final statuses and the cursor are committed.
    Commit,
    /// Right after a vote was mined, before its receipt is recorded.
    Submitted,
}

/// An in-memory store that fails once at a chosen point, the way a killed
/// process would leave it.
#[derive(Debug, Clone, Default)]
pub struct CrashingStore {
    pub inner: InMemoryStore,
    crash: Arc<Mutex<Option<CrashPoint>>>,
}

impl CrashingStore {
    pub fn crash_at(&self, point: CrashPoint) {
        *self.crash.lock() = Some(point);
    }

    fn trip(&self, point: CrashPoint) -> Result<()> {
        let mut crash = self.crash.lock();
        if *crash == Some(point) {
            *crash = None;
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "process killed",
            )));
        }
        Ok(())
    }
}

impl ScanCursorStore for CrashingStore {
    fn get_scan_cursor(
        &self,
        key: CursorKey,
        default: ScanCursor,
    ) -> Result<ScanCursor> {
        self.inner.get_scan_cursor(key, default)
    }
}

impl ProposalLedgerStore for CrashingStore {
    fn get_proposal_record(
        &self,
        id: &TransferEventId,
    ) -> Result<Option<ProposalRecord>> {
        self.inner.get_proposal_record(id)
    }

    fn record_status(&self, record: &ProposalRecord) -> Result<()> {
        if record.status.kind() == federator_types::StatusKind::Submitted {
            self.trip(CrashPoint::Submitted)?;
        }
        self.inner.record_status(record)
    }

    fn proposal_records(&self) -> Result<Vec<ProposalRecord>> {
        self.inner.proposal_records()
    }
}

impl FederatorStore for CrashingStore {
    fn commit_window(
        &self,
        key: CursorKey,
        cursor: ScanCursor,
        records: &[ProposalRecord],
    ) -> Result<ScanCursor> {
        self.trip(CrashPoint::Commit)?;
        self.inner.commit_window(key, cursor, records)
    }
}

pub type TestFederator = Federator<
    CrashingStore,
    MockedLogSource,
    MockedFederation,
    MockedSubmitter,
>;

/// One federator instance, with an origin chain, a destination federation and
/// a store that all outlive it, so a test can restart it.
pub struct Harness {
    pub store: CrashingStore,
    pub source: MockedLogSource,
    pub federation: MockedFederation,
    pub submitter: MockedSubmitter,
    pub metrics: Arc<Metrics>,
    pub confirmations: u64,
    pub max_unconfirmed_retries: usize,
}

impl Harness {
    /// Two votes are needed for quorum, so this instance alone never reaches it.
    pub fn new(head: u64, confirmations: u64) -> Self {
        let source = MockedLogSource::new(ORIGIN, head);
        let federation =
            MockedFederation::new(DESTINATION, Address::repeat_byte(0xfe), 2);
        let submitter = MockedSubmitter::new(DESTINATION, VOTER);
        let observer = federation.clone();
        submitter.on_mined(move |call| {
            let _ = observer.record_call(call, VOTER);
        });
        Self {
            store: CrashingStore::default(),
            source,
            federation,
            submitter,
            metrics: Arc::new(Metrics::new().unwrap()),
            confirmations,
            max_unconfirmed_retries: 2,
        }
    }

    pub fn cursor_key(&self) -> CursorKey {
        CursorKey::new(ORIGIN, self.source.bridge_address())
    }

    /// A fresh federator over the shared state, as after a restart.
    pub fn federator(&self) -> TestFederator {
        let settings = InstanceSettings {
            name: "rsk-to-ethereum".into(),
            cursor_key: self.cursor_key(),
            deployed_at: DEPLOYED_AT,
            confirmations: self.confirmations,
            max_blocks_per_pass: 1_000,
            max_unconfirmed_retries: self.max_unconfirmed_retries,
            print_progress_interval: Duration::ZERO,
            polling_interval: Duration::from_millis(10),
        };
        let reader = ChainReader::new(
            self.source.clone(),
            ChainReaderConfig {
                max_blocks_per_step: 4,
                max_retries: 1,
                retry_interval: Duration::from_millis(1),
            },
        );
        Federator::builder()
            .settings(settings)
            .store(self.store.clone())
            .reader(reader)
            .federation(self.federation.clone())
            .submitter(self.submitter.clone())
            .metrics(self.metrics.clone())
            .build()
    }

    /// Emits a transfer of `tokens` whole tokens from `sender`.
    pub fn transfer(
        &self,
        block_number: u64,
        log_index: u64,
        sender: Address,
        tokens: u64,
    ) -> TransferEvent {
        let event = TransferEvent {
            id: TransferEventId::new(
                ORIGIN,
                H256::from_low_u64_be(block_number * 1_000 + log_index),
                log_index,
            ),
            bridge: self.source.bridge_address(),
            token: Address::repeat_byte(0x70),
            sender,
            receiver: Address::repeat_byte(0x2e),
            amount: U256::from(tokens) * U256::exp10(18),
            block_number,
            block_hash: H256::from_low_u64_be(block_number),
            user_data: Bytes::default(),
        };
        self.source.push_event(event.clone());
        event
    }

    pub fn cursor(&self) -> u64 {
        self.store
            .get_scan_cursor(
                self.cursor_key(),
                ScanCursor::starting_at(DEPLOYED_AT, self.confirmations),
            )
            .unwrap()
            .last_processed_block
    }

    pub fn record(&self, event: &TransferEvent) -> Option<ProposalRecord> {
        self.store.get_proposal_record(&event.id).unwrap()
    }
}

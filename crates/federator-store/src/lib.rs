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

//! # Federator Store Module 🕸️
//!
//! A module for managing the durable state of one federator instance.
//!
//! ## Overview
//!
//! Every instance keeps two things per storage path: the scan cursor of the
//! bridge it watches, and the ledger of proposals it already made on the
//! destination chain. The loop reads both at the start of a pass, writes ledger
//! entries while proposing, and commits the final statuses together with the
//! cursor advance at the end of the pass.
//!
use std::fmt::Debug;

use federator_types::{
    CursorKey, ProposalRecord, ProposalStatus, ScanCursor, StatusKind,
    TransferEventId,
};
use federator_utils::Result;

/// A module for managing in-memory storage of the federator.
pub mod mem;
/// A module for setting up and managing a [Sled](https://sled.rs)-based database.
#[cfg(feature = "sled")]
pub mod sled;

/// A store that uses [`sled`](https://sled.rs) as the backend.
#[cfg(feature = "sled")]
pub use self::sled::SledStore;
/// A store that uses in memory data structures as the backend.
pub use mem::InMemoryStore;

/// ScanCursorStore keeps how far each bridge has been scanned.
pub trait ScanCursorStore: Clone + Send + Sync {
    /// Get the scan cursor of the bridge behind `key`.
    /// if not found, returns `default`.
    fn get_scan_cursor(
        &self,
        key: CursorKey,
        default: ScanCursor,
    ) -> crate::Result<ScanCursor>;
}

/// ProposalLedgerStore keeps one [`ProposalRecord`] per transfer event.
pub trait ProposalLedgerStore: Clone + Send + Sync {
    /// Get the ledger entry of the transfer event `id`, if any.
    fn get_proposal_record(
        &self,
        id: &TransferEventId,
    ) -> crate::Result<Option<ProposalRecord>>;

    /// Insert or replace the ledger entry of `record`, and make it durable
    /// before returning.
    fn record_status(&self, record: &ProposalRecord) -> crate::Result<()>;

    /// Every ledger entry, ordered by transfer event id.
    fn proposal_records(&self) -> crate::Result<Vec<ProposalRecord>>;

    /// Every ledger entry whose status is of kind `kind`.
    fn records_with_status(
        &self,
        kind: StatusKind,
    ) -> crate::Result<Vec<ProposalRecord>> {
        Ok(self
            .proposal_records()?
            .into_iter()
            .filter(|r| r.status.kind() == kind)
            .collect())
    }

    /// Moves a `Failed` record back to `Pending`, so the next pass proposes it
    /// again. Returns false if there is no such failed record.
    fn requeue_failed(&self, id: &TransferEventId) -> crate::Result<bool> {
        match self.get_proposal_record(id)? {
            Some(record)
                if matches!(record.status, ProposalStatus::Failed { .. }) =>
            {
                let requeued = record.with_status(ProposalStatus::Pending {
                    attempts: 0,
                    last_tx_hash: None,
                });
                self.record_status(&requeued)?;
                tracing::info!(%id, "requeued failed proposal");
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// The full store of one federator instance.
pub trait FederatorStore: ScanCursorStore + ProposalLedgerStore + Debug {
    /// Writes `records` and moves the cursor of `key` to `cursor` in one atomic step.
    ///
    /// The cursor never moves back: if `cursor` is behind the stored one, the
    /// stored height is kept. Returns the cursor as persisted.
    fn commit_window(
        &self,
        key: CursorKey,
        cursor: ScanCursor,
        records: &[ProposalRecord],
    ) -> crate::Result<ScanCursor>;

    /// Bytes used by the store on disk.
    fn data_stored_size(&self) -> u64 {
        0
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use ethers::types::{Address, Bytes, H256, U256};
    use federator_types::{TransferEvent, TransferEventId};

    pub fn transfer_event(block_number: u64, log_index: u64) -> TransferEvent {
        TransferEvent {
            id: TransferEventId::new(
                31,
                H256::from_low_u64_be(block_number),
                log_index,
            ),
            bridge: Address::repeat_byte(0xb),
            token: Address::repeat_byte(0x7),
            sender: Address::repeat_byte(0xa),
            receiver: Address::repeat_byte(0xc),
            amount: U256::exp10(18),
            block_number,
            block_hash: H256::repeat_byte(block_number as u8),
            user_data: Bytes::default(),
        }
    }
}

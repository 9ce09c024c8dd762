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

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use federator_types::{CursorKey, ProposalRecord, ScanCursor, TransferEventId};
use parking_lot::RwLock;

use super::{FederatorStore, ProposalLedgerStore, ScanCursorStore};

#[derive(Default)]
struct MemState {
    scan_cursors: HashMap<CursorKey, ScanCursor>,
    proposal_records: BTreeMap<TransferEventId, ProposalRecord>,
}

/// InMemoryStore keeps the scan cursors and the proposal ledger in memory.
///
/// Clones share the same state, which lets tests restart a federator on top of
/// the state left by a previous one.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemState>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish()
    }
}

impl ScanCursorStore for InMemoryStore {
    #[tracing::instrument(skip(self))]
    fn get_scan_cursor(
        &self,
        key: CursorKey,
        default: ScanCursor,
    ) -> crate::Result<ScanCursor> {
        let guard = self.state.read();
        Ok(guard.scan_cursors.get(&key).copied().unwrap_or(default))
    }
}

impl ProposalLedgerStore for InMemoryStore {
    #[tracing::instrument(skip(self), fields(id = %id))]
    fn get_proposal_record(
        &self,
        id: &TransferEventId,
    ) -> crate::Result<Option<ProposalRecord>> {
        Ok(self.state.read().proposal_records.get(id).cloned())
    }

    #[tracing::instrument(skip_all, fields(id = %record.id()))]
    fn record_status(&self, record: &ProposalRecord) -> crate::Result<()> {
        self.state
            .write()
            .proposal_records
            .insert(record.id(), record.clone());
        Ok(())
    }

    fn proposal_records(&self) -> crate::Result<Vec<ProposalRecord>> {
        Ok(self.state.read().proposal_records.values().cloned().collect())
    }
}

impl FederatorStore for InMemoryStore {
    #[tracing::instrument(skip(self, records), fields(records = records.len()))]
    fn commit_window(
        &self,
        key: CursorKey,
        cursor: ScanCursor,
        records: &[ProposalRecord],
    ) -> crate::Result<ScanCursor> {
        let mut guard = self.state.write();
        for record in records {
            guard.proposal_records.insert(record.id(), record.clone());
        }
        let next = match guard.scan_cursors.get(&key) {
            Some(current) => ScanCursor {
                confirmations: cursor.confirmations,
                ..*current
            }
            .advanced_to(cursor.last_processed_block),
            None => cursor,
        };
        guard.scan_cursors.insert(key, next);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::transfer_event;
    use ethers::types::Address;
    use federator_types::{ProposalStatus, StatusKind};

    #[test]
    fn clones_share_state() {
        let store = InMemoryStore::default();
        let restarted = store.clone();
        let key = CursorKey::new(31, Address::repeat_byte(1));
        let cursor = ScanCursor {
            last_processed_block: 10,
            confirmations: 1,
        };
        store.commit_window(key, cursor, &[]).unwrap();
        let loaded = restarted
            .get_scan_cursor(key, ScanCursor::starting_at(1, 1))
            .unwrap();
        assert_eq!(loaded, cursor);
    }

    #[test]
    fn records_are_filtered_by_status() {
        let store = InMemoryStore::default();
        let pending = ProposalRecord::new(
            transfer_event(1, 0),
            ProposalStatus::Pending {
                attempts: 1,
                last_tx_hash: None,
            },
        );
        let confirmed = ProposalRecord::new(
            transfer_event(2, 0),
            ProposalStatus::Confirmed { tx_hash: None },
        );
        store.record_status(&pending).unwrap();
        store.record_status(&confirmed).unwrap();
        let found = store.records_with_status(StatusKind::Pending).unwrap();
        assert_eq!(found, vec![pending]);
        assert_eq!(store.proposal_records().unwrap().len(), 2);
    }
}

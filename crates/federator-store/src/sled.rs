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

use std::path::Path;

use federator_types::{CursorKey, ProposalRecord, ScanCursor, TransferEventId};
use federator_utils::Error;
use sled::Transactional;

use super::{FederatorStore, ProposalLedgerStore, ScanCursorStore};

const SCAN_CURSORS_TREE: &str = "scan_cursors";
const PROPOSAL_RECORDS_TREE: &str = "proposal_records";

/// SledStore is a store that keeps the scan cursor and the proposal ledger in a
/// [Sled](https://sled.rs)-based database.
///
/// Sled holds an exclusive file lock on its directory, so a second process
/// opening the same storage path fails instead of sharing the ledger.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

impl SledStore {
    /// Create a new SledStore.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Ok(Self { db })
    }

    /// Creates a temporary SledStore, removed when the last handle is dropped.
    pub fn temporary() -> crate::Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Ok(Self { db })
    }

    /// Gets the total amount of data stored on disk
    pub fn get_data_stored_size(&self) -> u64 {
        self.db.size_on_disk().unwrap_or_default()
    }

    fn decode_cursor(key: CursorKey, bytes: &[u8]) -> crate::Result<ScanCursor> {
        serde_json::from_slice(bytes).map_err(|e| {
            Error::StoreCorrupt(format!("scan cursor of {key}: {e}"))
        })
    }

    fn decode_record(key: &[u8], bytes: &[u8]) -> crate::Result<ProposalRecord> {
        let record: ProposalRecord =
            serde_json::from_slice(bytes).map_err(|e| {
                Error::StoreCorrupt(format!(
                    "proposal record {}: {e}",
                    describe_key(key)
                ))
            })?;
        if record.id().to_key().as_slice() != key {
            return Err(Error::StoreCorrupt(format!(
                "proposal record {} is stored under {}",
                record.id(),
                describe_key(key)
            )));
        }
        Ok(record)
    }
}

fn describe_key(key: &[u8]) -> String {
    TransferEventId::from_key(key)
        .map(|id| id.to_string())
        .unwrap_or_else(|| format!("<{} byte key>", key.len()))
}

impl ScanCursorStore for SledStore {
    #[tracing::instrument(skip(self))]
    fn get_scan_cursor(
        &self,
        key: CursorKey,
        default: ScanCursor,
    ) -> crate::Result<ScanCursor> {
        let tree = self.db.open_tree(SCAN_CURSORS_TREE)?;
        match tree.get(key.to_key())? {
            Some(v) => Self::decode_cursor(key, &v),
            None => Ok(default),
        }
    }
}

impl ProposalLedgerStore for SledStore {
    #[tracing::instrument(skip(self), fields(id = %id))]
    fn get_proposal_record(
        &self,
        id: &TransferEventId,
    ) -> crate::Result<Option<ProposalRecord>> {
        let tree = self.db.open_tree(PROPOSAL_RECORDS_TREE)?;
        let key = id.to_key();
        tree.get(key)?
            .map(|v| Self::decode_record(&key, &v))
            .transpose()
    }

    #[tracing::instrument(skip_all, fields(id = %record.id()))]
    fn record_status(&self, record: &ProposalRecord) -> crate::Result<()> {
        let tree = self.db.open_tree(PROPOSAL_RECORDS_TREE)?;
        let bytes = serde_json::to_vec(record)?;
        tree.insert(record.id().to_key(), bytes)?;
        // the record must be on disk before the next broadcast.
        self.db.flush()?;
        tracing::trace!(status = ?record.status, "recorded proposal status");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn proposal_records(&self) -> crate::Result<Vec<ProposalRecord>> {
        let tree = self.db.open_tree(PROPOSAL_RECORDS_TREE)?;
        tree.iter()
            .map(|entry| {
                let (k, v) = entry?;
                Self::decode_record(&k, &v)
            })
            .collect()
    }
}

impl FederatorStore for SledStore {
    #[tracing::instrument(skip(self, records), fields(records = records.len()))]
    fn commit_window(
        &self,
        key: CursorKey,
        cursor: ScanCursor,
        records: &[ProposalRecord],
    ) -> crate::Result<ScanCursor> {
        let cursors = self.db.open_tree(SCAN_CURSORS_TREE)?;
        let proposals = self.db.open_tree(PROPOSAL_RECORDS_TREE)?;
        let cursor_key = key.to_key();
        let next = match cursors.get(cursor_key)? {
            Some(v) => {
                let current = Self::decode_cursor(key, &v)?;
                if cursor.last_processed_block < current.last_processed_block
                {
                    tracing::warn!(
                        %key,
                        current = current.last_processed_block,
                        requested = cursor.last_processed_block,
                        "ignoring scan cursor move backwards",
                    );
                }
                ScanCursor {
                    confirmations: cursor.confirmations,
                    ..current
                }
                .advanced_to(cursor.last_processed_block)
            }
            None => cursor,
        };
        let cursor_bytes = serde_json::to_vec(&next)?;
        let record_entries = records
            .iter()
            .map(|r| Ok((r.id().to_key(), serde_json::to_vec(r)?)))
            .collect::<crate::Result<Vec<_>>>()?;
        // statuses and cursor land together, or not at all.
        Transactional::<std::io::Error>::transaction(
            &(&cursors, &proposals),
            |(cursors, proposals)| {
                for (k, v) in &record_entries {
                    proposals.insert(&k[..], v.as_slice())?;
                }
                cursors.insert(&cursor_key[..], cursor_bytes.as_slice())?;
                Ok(())
            },
        )?;
        self.db.flush()?;
        Ok(next)
    }

    fn data_stored_size(&self) -> u64 {
        self.get_data_stored_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::transfer_event;
    use ethers::types::{Address, H256};
    use federator_types::{ProposalStatus, StatusKind};

    fn cursor_key() -> CursorKey {
        CursorKey::new(31, Address::repeat_byte(0xb))
    }

    #[test]
    fn get_scan_cursor_should_return_default() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SledStore::open(tmp.path()).unwrap();
        let default = ScanCursor::starting_at(100, 5);
        let cursor = store.get_scan_cursor(cursor_key(), default).unwrap();
        assert_eq!(cursor.last_processed_block, 99);
    }

    #[test]
    fn commit_window_should_persist_cursor_and_records() {
        let tmp = tempfile::tempdir().unwrap();
        let event = transfer_event(105, 0);
        {
            let store = SledStore::open(tmp.path()).unwrap();
            let record = ProposalRecord::new(
                event.clone(),
                ProposalStatus::Submitted {
                    tx_hash: Some(H256::repeat_byte(1)),
                },
            );
            let cursor = ScanCursor {
                last_processed_block: 110,
                confirmations: 5,
            };
            store.commit_window(cursor_key(), cursor, &[record]).unwrap();
        }
        // reopen, as a restarted process would.
        let store = SledStore::open(tmp.path()).unwrap();
        let cursor = store
            .get_scan_cursor(cursor_key(), ScanCursor::starting_at(1, 5))
            .unwrap();
        assert_eq!(cursor.last_processed_block, 110);
        let record = store.get_proposal_record(&event.id).unwrap().unwrap();
        assert_eq!(record.status.kind(), StatusKind::Submitted);
    }

    #[test]
    fn commit_window_should_never_move_cursor_back() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SledStore::open(tmp.path()).unwrap();
        let at = |block| ScanCursor {
            last_processed_block: block,
            confirmations: 2,
        };
        store.commit_window(cursor_key(), at(120), &[]).unwrap();
        let persisted = store.commit_window(cursor_key(), at(90), &[]).unwrap();
        assert_eq!(persisted.last_processed_block, 120);
        let cursor = store.get_scan_cursor(cursor_key(), at(0)).unwrap();
        assert_eq!(cursor.last_processed_block, 120);
    }

    #[test]
    fn undecodable_record_is_store_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SledStore::open(tmp.path()).unwrap();
        let event = transfer_event(7, 1);
        let tree = store.db.open_tree(PROPOSAL_RECORDS_TREE).unwrap();
        tree.insert(event.id.to_key(), &b"not json"[..]).unwrap();
        let err = store.get_proposal_record(&event.id).unwrap_err();
        assert!(matches!(err, Error::StoreCorrupt(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn requeue_failed_should_reset_to_pending() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SledStore::open(tmp.path()).unwrap();
        let event = transfer_event(42, 3);
        let failed = ProposalRecord::new(
            event.clone(),
            ProposalStatus::Failed {
                reason: "execution reverted".into(),
            },
        );
        store.record_status(&failed).unwrap();
        assert_eq!(store.records_with_status(StatusKind::Failed).unwrap().len(), 1);

        assert!(store.requeue_failed(&event.id).unwrap());
        let record = store.get_proposal_record(&event.id).unwrap().unwrap();
        assert_eq!(
            record.status,
            ProposalStatus::Pending {
                attempts: 0,
                last_tx_hash: None
            }
        );
        // only failed records can be requeued.
        assert!(!store.requeue_failed(&event.id).unwrap());
    }

    #[test]
    fn second_open_of_same_path_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let _first = SledStore::open(tmp.path()).unwrap();
        assert!(SledStore::open(tmp.path()).is_err());
    }
}

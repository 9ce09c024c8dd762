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

use std::time::{SystemTime, UNIX_EPOCH};

use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

use crate::transfer::{TransferEvent, TransferEventId};

/// Where a transfer event stands on its destination chain, as far as one
/// federator instance knows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ProposalStatus {
    /// Not yet acknowledged on the destination. Written before every broadcast.
    #[serde(rename_all = "camelCase")]
    Pending {
        attempts: u32,
        last_tx_hash: Option<H256>,
    },
    /// This instance's vote landed. The hash is unknown when the vote was
    /// only observed on-chain, e.g. after a crash before the receipt was stored.
    #[serde(rename_all = "camelCase")]
    Submitted { tx_hash: Option<H256> },
    /// The destination already reached quorum for this transfer.
    #[serde(rename_all = "camelCase")]
    Confirmed { tx_hash: Option<H256> },
    /// The destination rejected the proposal. Only an operator requeue moves it back.
    Failed { reason: String },
}

impl ProposalStatus {
    /// Submitted, Confirmed and Failed records are never proposed again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProposalStatus::Pending { .. })
    }

    pub fn kind(&self) -> StatusKind {
        match self {
            ProposalStatus::Pending { .. } => StatusKind::Pending,
            ProposalStatus::Submitted { .. } => StatusKind::Submitted,
            ProposalStatus::Confirmed { .. } => StatusKind::Confirmed,
            ProposalStatus::Failed { .. } => StatusKind::Failed,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            ProposalStatus::Pending { attempts, .. } => *attempts,
            _ => 0,
        }
    }

    /// The most recent transaction hash known for this proposal.
    pub fn tx_hash(&self) -> Option<H256> {
        match self {
            ProposalStatus::Pending { last_tx_hash, .. } => *last_tx_hash,
            ProposalStatus::Submitted { tx_hash }
            | ProposalStatus::Confirmed { tx_hash } => *tx_hash,
            ProposalStatus::Failed { .. } => None,
        }
    }
}

/// The variant of a [`ProposalStatus`], used to filter the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    Pending,
    Submitted,
    Confirmed,
    Failed,
}

/// One entry of the proposal ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalRecord {
    pub event: TransferEvent,
    pub status: ProposalStatus,
    /// Milliseconds since the unix epoch.
    pub updated_at: u64,
}

impl ProposalRecord {
    pub fn new(event: TransferEvent, status: ProposalStatus) -> Self {
        Self {
            event,
            status,
            updated_at: now_millis(),
        }
    }

    pub fn id(&self) -> TransferEventId {
        self.event.id
    }

    /// A copy of this record carrying `status`.
    pub fn with_status(&self, status: ProposalStatus) -> Self {
        Self::new(self.event.clone(), status)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// A contract call on the destination chain, as built by a federation backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

impl CallRequest {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
            value: U256::zero(),
        }
    }
}

/// The receipt of a transaction that was mined successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub tx_hash: H256,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_is_retried() {
        let pending = ProposalStatus::Pending {
            attempts: 1,
            last_tx_hash: None,
        };
        assert!(!pending.is_terminal());
        assert!(ProposalStatus::Submitted { tx_hash: None }.is_terminal());
        assert!(ProposalStatus::Confirmed { tx_hash: None }.is_terminal());
        assert!(ProposalStatus::Failed {
            reason: "reverted".into()
        }
        .is_terminal());
    }

    #[test]
    fn status_is_tagged_in_json() {
        let status = ProposalStatus::Pending {
            attempts: 2,
            last_tx_hash: Some(H256::repeat_byte(1)),
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["status"], "pending");
        assert_eq!(value["attempts"], 2);
        assert_eq!(status.tx_hash(), Some(H256::repeat_byte(1)));
    }
}

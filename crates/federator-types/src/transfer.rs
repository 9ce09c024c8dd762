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

use std::fmt;
use std::str::FromStr;

use ethers::types::{Address, Bytes, H256, U256};
use federator_utils::Error;
use serde::{Deserialize, Serialize};

/// Identifies one transfer event across every chain: the origin chain, the
/// transaction that emitted it and its position in that transaction's block.
///
/// The textual form is `<chain_id>:<tx_hash>:<log_index>`, e.g.
/// `31:0xabc...def:3`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
pub struct TransferEventId {
    pub chain_id: u64,
    pub tx_hash: H256,
    pub log_index: u64,
}

impl TransferEventId {
    /// Length of [`TransferEventId::to_key`].
    pub const KEY_LEN: usize = 8 + 32 + 8;

    pub fn new(chain_id: u64, tx_hash: H256, log_index: u64) -> Self {
        Self {
            chain_id,
            tx_hash,
            log_index,
        }
    }

    /// Big-endian key bytes, so that ids of one chain sort together.
    pub fn to_key(&self) -> [u8; Self::KEY_LEN] {
        let mut key = [0u8; Self::KEY_LEN];
        key[..8].copy_from_slice(&self.chain_id.to_be_bytes());
        key[8..40].copy_from_slice(self.tx_hash.as_bytes());
        key[40..].copy_from_slice(&self.log_index.to_be_bytes());
        key
    }

    pub fn from_key(key: &[u8]) -> Option<Self> {
        if key.len() != Self::KEY_LEN {
            return None;
        }
        let mut chain_id = [0u8; 8];
        chain_id.copy_from_slice(&key[..8]);
        let mut log_index = [0u8; 8];
        log_index.copy_from_slice(&key[40..]);
        Some(Self {
            chain_id: u64::from_be_bytes(chain_id),
            tx_hash: H256::from_slice(&key[8..40]),
            log_index: u64::from_be_bytes(log_index),
        })
    }
}

impl fmt::Display for TransferEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:#x}:{}", self.chain_id, self.tx_hash, self.log_index)
    }
}

impl FromStr for TransferEventId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidTransferEventId(s.to_owned());
        let mut parts = s.trim().split(':');
        let (Some(chain_id), Some(tx_hash), Some(log_index), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        Ok(Self {
            chain_id: chain_id.parse().map_err(|_| invalid())?,
            tx_hash: H256::from_str(tx_hash).map_err(|_| invalid())?,
            log_index: log_index.parse().map_err(|_| invalid())?,
        })
    }
}

/// A `Cross` event emitted by the bridge of the origin chain, decoded and
/// ready to be proposed on the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferEvent {
    pub id: TransferEventId,
    /// The bridge contract that emitted the event.
    pub bridge: Address,
    /// The token address on the origin chain.
    pub token: Address,
    pub sender: Address,
    pub receiver: Address,
    pub amount: U256,
    pub block_number: u64,
    pub block_hash: H256,
    #[serde(default)]
    pub user_data: Bytes,
}

impl TransferEvent {
    /// The order events are processed in: block height, then log index.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.id.log_index)
    }
}

/// Identifies the scan cursor of one bridge on one origin chain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct CursorKey {
    pub chain_id: u64,
    pub bridge: Address,
}

impl CursorKey {
    pub const KEY_LEN: usize = 8 + 20;

    pub fn new(chain_id: u64, bridge: Address) -> Self {
        Self { chain_id, bridge }
    }

    pub fn to_key(&self) -> [u8; Self::KEY_LEN] {
        let mut key = [0u8; Self::KEY_LEN];
        key[..8].copy_from_slice(&self.chain_id.to_be_bytes());
        key[8..].copy_from_slice(self.bridge.as_bytes());
        key
    }
}

impl fmt::Display for CursorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:#x}", self.chain_id, self.bridge)
    }
}

/// How far a federator instance has scanned its origin chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanCursor {
    /// Every block up to and including this one has been fully processed.
    pub last_processed_block: u64,
    /// The confirmation depth the cursor was scanned with.
    pub confirmations: u64,
}

impl ScanCursor {
    /// The cursor of a bridge that was never scanned: the block right before its
    /// deployment is the last one considered processed.
    pub fn starting_at(deployed_at: u64, confirmations: u64) -> Self {
        Self {
            last_processed_block: deployed_at.saturating_sub(1),
            confirmations,
        }
    }

    /// Returns the cursor moved to `height`, unless that would move it back.
    pub fn advanced_to(self, height: u64) -> Self {
        Self {
            last_processed_block: self.last_processed_block.max(height),
            ..self
        }
    }
}

/// An inclusive range of blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockWindow {
    pub from: u64,
    pub to: u64,
}

impl BlockWindow {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }

    pub fn contains(&self, block: u64) -> bool {
        self.from <= block && block <= self.to
    }
}

impl fmt::Display for BlockWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

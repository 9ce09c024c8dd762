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

use std::sync::Arc;

use ethers::contract::LogMeta;
use ethers::providers::Middleware;
use ethers::types::Address;
use federator_types::contracts::{BridgeContract, CrossFilter};
use federator_types::{TransferEvent, TransferEventId};
use federator_utils::{Error, Result};

use crate::BridgeLogSource;

/// Reads the `Cross` events of a bridge contract through an ethers client.
#[derive(Debug)]
pub struct EvmBridgeLogSource<M: Middleware> {
    chain_id: u64,
    client: Arc<M>,
    contract: BridgeContract<M>,
}

impl<M: Middleware> EvmBridgeLogSource<M> {
    pub fn new(chain_id: u64, bridge: Address, client: Arc<M>) -> Self {
        let contract = BridgeContract::new(bridge, client.clone());
        Self {
            chain_id,
            client,
            contract,
        }
    }
}

/// Builds the [`TransferEvent`] of a decoded `Cross` log.
pub fn transfer_event_from_log(
    chain_id: u64,
    bridge: Address,
    event: CrossFilter,
    meta: &LogMeta,
) -> TransferEvent {
    TransferEvent {
        id: TransferEventId::new(
            chain_id,
            meta.transaction_hash,
            meta.log_index.low_u64(),
        ),
        bridge,
        token: event.token_address,
        sender: event.from,
        receiver: event.to,
        amount: event.amount,
        block_number: meta.block_number.as_u64(),
        block_hash: meta.block_hash,
        user_data: event.user_data,
    }
}

#[async_trait::async_trait]
impl<M: Middleware + 'static> BridgeLogSource for EvmBridgeLogSource<M> {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn bridge_address(&self) -> Address {
        self.contract.address()
    }

    async fn latest_block(&self) -> Result<u64> {
        self.client
            .get_block_number()
            .await
            .map(|b| b.as_u64())
            .map_err(|e| Error::chain_unavailable(self.chain_id, e))
    }

    #[tracing::instrument(skip(self), fields(chain_id = self.chain_id))]
    async fn transfer_events(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<TransferEvent>> {
        let found_events = self
            .contract
            .cross_filter()
            .from_block(from)
            .to_block(to)
            .query_with_meta()
            .await
            .map_err(|e| Error::chain_unavailable(self.chain_id, e))?;
        let bridge = self.contract.address();
        Ok(found_events
            .into_iter()
            .map(|(event, meta)| {
                transfer_event_from_log(self.chain_id, bridge, event, &meta)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Bytes, Log, H256, U256, U64};

    #[test]
    fn cross_log_maps_to_transfer_event() {
        let log = Log {
            address: Address::repeat_byte(0xb),
            block_number: Some(U64::from(105)),
            block_hash: Some(H256::repeat_byte(0x10)),
            transaction_hash: Some(H256::repeat_byte(0xab)),
            transaction_index: Some(U64::from(0)),
            log_index: Some(U256::from(3)),
            ..Default::default()
        };
        let meta = LogMeta::from(&log);
        let event = CrossFilter {
            token_address: Address::repeat_byte(0x7),
            from: Address::repeat_byte(0xa),
            to: Address::repeat_byte(0xc),
            amount: U256::from(2),
            user_data: Bytes::from(vec![1, 2]),
        };
        let transfer =
            transfer_event_from_log(31, meta.address, event, &meta);
        assert_eq!(transfer.id.chain_id, 31);
        assert_eq!(transfer.id.tx_hash, H256::repeat_byte(0xab));
        assert_eq!(transfer.id.log_index, 3);
        assert_eq!(transfer.block_number, 105);
        assert_eq!(transfer.sender, Address::repeat_byte(0xa));
        assert_eq!(transfer.user_data.as_ref(), &[1, 2]);
    }
}

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

//! # Federator Loop 🌉
//!
//! One [`Federator`] drives one federator instance: it watches the bridge of
//! the origin chain and proposes every confirmed transfer on the destination
//! chain, through the destination's federation backend.
//!
//! A pass ([`Federator::run_once`]) walks through the states
//! `Idle → Scanning → Filtering → Proposing → Advancing → Idle`:
//!
//! * **Scanning** reads the confirmed events after the scan cursor.
//! * **Filtering** drops events the ledger already settled, and asks the
//!   destination about the rest: transfers with quorum are `Confirmed`,
//!   transfers this key already voted for are `Submitted`.
//! * **Proposing** builds, simulates and sends one vote per remaining event,
//!   in order.
//! * **Advancing** commits the final statuses and the new cursor atomically.
//!   The cursor stops right before the first event that is still pending.

use std::time::Duration;

use federator_config::evm::EvmChainConfig;
use federator_config::federator::FederatorInstanceConfig;
use federator_types::{BlockWindow, CursorKey};

mod federator;

pub use federator::Federator;

/// What a [`Federator`] needs to know about the instance it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSettings {
    /// The configured name of the instance, used in logs and metrics.
    pub name: String,
    /// The origin bridge, whose cursor this instance owns.
    pub cursor_key: CursorKey,
    /// The block the origin bridge was deployed at.
    pub deployed_at: u64,
    /// Blocks that must be built on top of an event before it is proposed.
    pub confirmations: u64,
    pub max_blocks_per_pass: u64,
    /// How many times an unconfirmed proposal is sent again in one pass.
    pub max_unconfirmed_retries: usize,
    /// Zero disables the sync progress log.
    pub print_progress_interval: Duration,
    /// The pause between two passes when the instance runs periodically.
    pub polling_interval: Duration,
}

impl InstanceSettings {
    pub fn from_config(
        instance: &FederatorInstanceConfig,
        origin: &EvmChainConfig,
        destination: &EvmChainConfig,
    ) -> Self {
        Self {
            name: instance.name.clone(),
            cursor_key: CursorKey::new(origin.chain_id, origin.bridge.address),
            deployed_at: origin.bridge.deployed_at,
            confirmations: origin.block_confirmations,
            max_blocks_per_pass: origin.events_watcher.max_blocks_per_pass,
            max_unconfirmed_retries: destination
                .tx_sender
                .max_unconfirmed_retries,
            print_progress_interval: Duration::from_millis(
                origin.events_watcher.print_progress_interval,
            ),
            polling_interval: Duration::from_millis(
                origin.events_watcher.polling_interval,
            ),
        }
    }
}

/// The states of a federator pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum FederatorState {
    #[default]
    #[display(fmt = "idle")]
    Idle,
    #[display(fmt = "scanning")]
    Scanning,
    #[display(fmt = "filtering")]
    Filtering,
    #[display(fmt = "proposing")]
    Proposing,
    #[display(fmt = "advancing")]
    Advancing,
}

/// The outcome of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    /// The confirmed blocks that were scanned. Empty if there was nothing new.
    pub window: BlockWindow,
    /// Events found in the window.
    pub scanned: usize,
    /// Events the ledger had already settled.
    pub skipped: usize,
    /// Events the destination already had quorum for.
    pub confirmed: usize,
    /// Events this key voted for, in this pass or before it.
    pub submitted: usize,
    pub failed: usize,
    /// Events left pending, to be tried again by the next pass.
    pub pending: usize,
    /// The last processed block after the pass.
    pub advanced_to: u64,
    /// Why the pass stopped before handling every event, if it did.
    pub interrupted: Option<String>,
}

impl PassReport {
    fn new(window: BlockWindow, cursor: u64) -> Self {
        Self {
            window,
            scanned: 0,
            skipped: 0,
            confirmed: 0,
            submitted: 0,
            failed: 0,
            pending: 0,
            advanced_to: cursor,
            interrupted: None,
        }
    }
}

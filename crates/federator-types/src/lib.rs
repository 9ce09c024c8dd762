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

//! Types shared by every federator crate: transfer events and their ids, the
//! scan cursor, proposal statuses and the on-chain bindings of the bridge.

use ethers::providers;
use federator_utils::multi_provider::MultiProvider;

/// Contract bindings of the source bridge, the federation gate and the multisig wallet.
pub mod contracts;
mod env;
pub mod private_key;
/// Proposal statuses kept in the ledger, and the calls that carry them.
pub mod proposal;
pub mod rpc_url;
/// Transfer events, their ids and the scan cursor.
pub mod transfer;

pub use proposal::{
    CallRequest, ProposalRecord, ProposalStatus, StatusKind, SubmitReceipt,
};
pub use transfer::{
    BlockWindow, CursorKey, ScanCursor, TransferEvent, TransferEventId,
};

/// Ethereum client using Ethers, that includes a retry strategy and round-robins over
/// every configured endpoint.
pub type EthersClient =
    providers::Provider<providers::RetryClient<MultiProvider<providers::Http>>>;

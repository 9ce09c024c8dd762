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

use derive_more::Display;
/// Target for logger
pub const TARGET: &str = "federator_probe";

/// The Kind of the Probe.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// When the Lifecycle of the Federator changes, like starting or shutting down.
    #[display(fmt = "lifecycle")]
    Lifecycle,
    /// Scan progress of a federator instance on its origin chain.
    #[display(fmt = "sync")]
    Sync,
    /// A federator loop moved from one state to the next.
    #[display(fmt = "state")]
    State,
    /// Transaction sender updates on the destination chain.
    #[display(fmt = "tx_sender")]
    TxSender,
    /// Quorum checks and votes on the federation backend.
    #[display(fmt = "federation")]
    Federation,
    /// Proposal ledger and scan cursor updates.
    #[display(fmt = "store")]
    Store,
    /// When the federator will retry to do something.
    #[display(fmt = "retry")]
    Retry,
}

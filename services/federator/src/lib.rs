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

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Bridge Federator 🌉
//!
//! A federator watches the bridge contract of one chain and votes every
//! confirmed transfer on the federation of another chain. Once enough
//! federators voted, the destination bridge releases the tokens.
//!
//! ## Overview
//!
//! Every configured federator instance (an origin, a destination and a key)
//! runs its own loop:
//!
//!   1. read the `Cross` events of the origin bridge, `block-confirmations`
//!      blocks behind the head;
//!   2. drop the ones the local proposal ledger already settled;
//!   3. ask the destination federation whether each transfer already has a
//!      quorum, or a vote from this key;
//!   4. vote the rest, and record the outcome;
//!   5. move the scan cursor past every settled block.
//!
//! The ledger and the cursor are written in a way that a crash at any point
//! neither skips a transfer nor votes it twice.
//!
//! # Features
//!
//! * `cli`: The command line of the `bridge-federator` binary. Enabled by default.
//! * `integration-tests`: JSON logs, easy to parse from a test harness.

/// Builds and runs the federator instances.
pub mod service;

pub use federator_utils::{Error, Result};

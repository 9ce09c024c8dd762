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

#![warn(missing_docs)]

//! # Federator Configuration Module 🕸️
//!
//! A module for configuring the federator.
//!
//! ## Overview
//!
//! Possible configuration include:
//! * `port`: The port the metrics server will listen on. Defaults to 9955
//! * `evm`: EVM based networks, their bridge and federation contracts, and
//!   how to talk to them. See [config/rsk-ethereum](../../config/rsk-ethereum)
//!   for an example.
//! * `federator`: The federator instances to run, one key and one storage path each.
//! * `scheduler`: How the instances are started.

/// CLI configuration
#[cfg(feature = "cli")]
pub mod cli;
/// Default values of the configuration
pub mod defaults;
/// EVM configuration
pub mod evm;
/// Federator instance configuration
pub mod federator;
/// Utils for processing configuration
pub mod utils;

use evm::EvmChainConfig;
use federator::FederatorInstanceConfig;
use federator_utils::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// FederatorConfig is the configuration for the bridge federator.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct FederatorConfig {
    /// Metrics Server Port number
    ///
    /// default to 9955
    #[serde(default = "defaults::port", skip_serializing)]
    pub port: u16,
    /// EVM based networks and the configuration.
    ///
    /// a map between chain name and its configuration.
    #[serde(default)]
    pub evm: HashMap<String, EvmChainConfig>,
    /// The federator instances, each watching one origin chain and voting on
    /// one destination chain.
    #[serde(default, rename = "federator")]
    pub federators: Vec<FederatorInstanceConfig>,
    /// How the instances are scheduled.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl FederatorConfig {
    /// Returns the enabled chain configured under `name`.
    pub fn chain(&self, name: &str) -> federator_utils::Result<&EvmChainConfig> {
        self.evm
            .get(&name.to_lowercase())
            .ok_or_else(|| Error::ChainNotFound {
                chain_id: name.to_owned(),
            })
    }

    /// Returns the federator instance called `name`.
    pub fn federator(
        &self,
        name: &str,
    ) -> federator_utils::Result<&FederatorInstanceConfig> {
        self.federators
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| Error::FederatorNotFound {
                name: name.to_owned(),
            })
    }
}

/// SchedulerConfig controls how the federator instances are started.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SchedulerConfig {
    /// Milliseconds between the start of two consecutive instances.
    #[serde(rename(serialize = "staggerInterval"))]
    pub stagger_interval: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stagger_interval: defaults::stagger_interval(),
        }
    }
}

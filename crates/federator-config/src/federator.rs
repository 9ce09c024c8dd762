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

use std::path::PathBuf;

use federator_types::private_key::PrivateKey;
use serde::{Deserialize, Serialize};

use crate::defaults;

/// FederatorInstanceConfig is the configuration of one federator instance.
///
/// The reverse direction of a bridge is simply another instance with `origin`
/// and `destination` swapped, and its own storage path.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FederatorInstanceConfig {
    /// Unique name of the instance, used in logs and metrics.
    pub name: String,
    /// Whether this instance runs at all.
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    /// Key of the chain whose bridge events are watched.
    pub origin: String,
    /// Key of the chain the proposals are sent to.
    pub destination: String,
    /// The Private Key of this federator member.
    ///
    /// 1. if it starts with '0x' then this would be raw (64 bytes) hex encoded
    ///    private key.
    /// 2. if it starts with '$' then it would be considered as an Enviroment variable
    ///    of a hex-encoded private key.
    ///    Example: $FEDERATOR_1_PRIVATE_KEY
    #[serde(skip_serializing)]
    pub private_key: PrivateKey,
    /// Directory of the instance's database. No two instances may share one.
    #[serde(rename(serialize = "storagePath"))]
    pub storage_path: PathBuf,
}

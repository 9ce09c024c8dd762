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

use config::{Config, File};
use federator_utils::Error;
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use crate::FederatorConfig;

/// A helper function that will search for all config files in the given directory and return them as a vec
/// of the paths.
///
/// Supported file extensions are:
/// - `.toml`.
/// - `.json`.
pub fn search_config_files<P: AsRef<Path>>(
    base_dir: P,
) -> federator_utils::Result<Vec<PathBuf>> {
    // A pattern that covers all toml or json files in the config directory and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", base_dir.as_ref().display());
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let toml_files = glob::glob(&toml_pattern)?;
    let json_files = glob::glob(&json_pattern)?;
    toml_files
        .chain(json_files)
        .map(|v| v.map_err(Error::from))
        .collect()
}

/// Try to parse the [`FederatorConfig`] from the given config file(s).
pub fn parse_from_files(
    files: &[PathBuf],
) -> federator_utils::Result<FederatorConfig> {
    let mut builder = Config::builder();
    for config_file in files {
        tracing::trace!("Loading config file: {}", config_file.display());
        let ext = config_file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder = builder
            .add_source(File::from(config_file.as_path()).format(format));
    }

    deserialize(builder)
}

/// Parses a [`FederatorConfig`] from a TOML document, without touching the disk.
pub fn parse_from_str(
    content: &str,
) -> federator_utils::Result<FederatorConfig> {
    let builder = Config::builder()
        .add_source(File::from_str(content, config::FileFormat::Toml));
    deserialize(builder)
}

fn deserialize(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> federator_utils::Result<FederatorConfig> {
    // also merge in the environment (with a prefix of FEDERATOR).
    let builder = builder.add_source(
        config::Environment::with_prefix("FEDERATOR").separator("_"),
    );
    let cfg = builder.build()?;
    let config: Result<
        FederatorConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Load the configuration files and
///
/// Returns `Ok(FederatorConfig)` on success, or `Err(Error)` on failure.
///
/// it is the same as using the [`search_config_files`] and [`parse_from_files`] functions combined.
pub fn load<P: AsRef<Path>>(
    path: P,
) -> federator_utils::Result<FederatorConfig> {
    parse_from_files(&search_config_files(path)?)
}

/// Lexically normalized form of `path`, so `./db/fed-1` and `db//fed-1/` compare equal.
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// The postloading_process exists to validate configuration and standardize
/// the format of the configuration
pub fn postloading_process(
    mut config: FederatorConfig,
) -> federator_utils::Result<FederatorConfig> {
    tracing::trace!("Checking configration sanity ...");

    // make all chain names lower case, and keep only the enabled ones.
    let evm = std::mem::take(&mut config.evm);
    config.evm = evm
        .into_iter()
        .filter(|(_, chain)| chain.enabled)
        .map(|(name, chain)| (name.to_lowercase(), chain))
        .collect::<HashMap<_, _>>();

    for (name, chain) in &config.evm {
        let watcher = &chain.events_watcher;
        if watcher.max_blocks_per_step == 0 || watcher.max_blocks_per_pass == 0
        {
            return Err(Error::Configuration(format!(
                "chain {name}: max-blocks-per-step and max-blocks-per-pass must be positive"
            )));
        }
        let sender = &chain.tx_sender;
        if sender.gas_limit_multiplier <= 0.0
            || sender.gas_price_multiplier <= 0.0
        {
            return Err(Error::Configuration(format!(
                "chain {name}: gas multipliers must be positive"
            )));
        }
    }

    config.federators.retain(|f| f.enabled);
    let mut names = HashSet::new();
    let mut storage_paths = HashMap::new();
    for federator in config.federators.iter_mut() {
        federator.origin = federator.origin.to_lowercase();
        federator.destination = federator.destination.to_lowercase();
        if !names.insert(federator.name.clone()) {
            return Err(Error::Configuration(format!(
                "federator name {} is used more than once",
                federator.name
            )));
        }
        for chain in [&federator.origin, &federator.destination] {
            if !config.evm.contains_key(chain) {
                return Err(Error::Configuration(format!(
                    "federator {} uses chain {chain}, which is not configured or not enabled",
                    federator.name
                )));
            }
        }
        if federator.origin == federator.destination {
            return Err(Error::Configuration(format!(
                "federator {} has the same origin and destination",
                federator.name
            )));
        }
        let path = normalize(&federator.storage_path);
        if let Some(other) =
            storage_paths.insert(path.clone(), federator.name.clone())
        {
            return Err(Error::Configuration(format!(
                "federators {other} and {} share the storage path {}",
                federator.name,
                path.display()
            )));
        }
    }
    if config.federators.is_empty() {
        tracing::warn!("!!WARNING!!: no federator instance is configured");
    }

    tracing::trace!(
        "postloaded config: {}",
        serde_json::to_string_pretty(&config)?
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_1: &str =
        "0x8f2a55949038a9610f50fb23b5883af3b4ecb3c3bb792cbcefbd1542c692be63";
    const KEY_2: &str =
        "0xc87509a1c067bbde78beb793e6fa76530b6382a4c0241e5e4a9ec0a0f44dc0d3";

    fn chains() -> String {
        r#"
[evm.RSK]
name = "rsk"
http-endpoint = "http://127.0.0.1:4444"
chain-id = 31
block-confirmations = 2
bridge = { address = "0x1684a1c35a2a7a2cd3a4f0c7d4a2a2b1e5c0f2d1", deployed-at = 100 }
federation = { type = "Federation", address = "0x5d2bc5a0c4fb2bbe1f1f0a2b1e0d4c2f8b7a6e51" }

[evm.ethereum]
name = "ethereum"
http-endpoint = "http://127.0.0.1:8545"
fallback-http-endpoints = ["http://127.0.0.1:8546"]
chain-id = 1
bridge = { address = "0x2b2a3e0b1e4c5f3a8d7c6b5a4f3e2d1c0b9a8f7e", deployed-at = 5 }
federation = { type = "MultiSig", address = "0x3c3a4f1c2f5d6a4b9e8d7c6b5a4f3e2d1c0b9a8f", lookback = 20 }
tx-sender = { receipt-timeout = 1000 }

[evm.disabled]
name = "disabled"
enabled = false
http-endpoint = "http://127.0.0.1:9545"
chain-id = 7
bridge = { address = "0x2b2a3e0b1e4c5f3a8d7c6b5a4f3e2d1c0b9a8f7e", deployed-at = 5 }
federation = { type = "Federation", address = "0x5d2bc5a0c4fb2bbe1f1f0a2b1e0d4c2f8b7a6e51" }
"#
        .to_owned()
    }

    fn federator(name: &str, key: &str, path: &str, origin: &str) -> String {
        let destination = if origin == "rsk" { "ethereum" } else { "rsk" };
        format!(
            r#"
[[federator]]
name = "{name}"
origin = "{origin}"
destination = "{destination}"
private-key = "{key}"
storage-path = "{path}"
"#
        )
    }

    fn parse(content: &str) -> federator_utils::Result<FederatorConfig> {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), content).unwrap();
        load(dir.path())
    }

    #[test]
    fn loads_chains_and_instances() {
        let content = chains()
            + &federator("fed-1", KEY_1, "db/fed-1", "rsk")
            + &federator("rev-fed-1", KEY_1, "db/rev-fed-1", "ethereum");
        let config = parse(&content).unwrap();
        assert_eq!(config.evm.len(), 2);
        let rsk = config.chain("RSK").unwrap();
        assert_eq!(rsk.chain_id, 31);
        assert_eq!(rsk.block_confirmations, 2);
        assert_eq!(rsk.bridge.deployed_at, 100);
        let ethereum = config.chain("ethereum").unwrap();
        assert_eq!(ethereum.endpoints().count(), 2);
        assert_eq!(ethereum.tx_sender.receipt_timeout, 1000);
        assert_eq!(ethereum.tx_sender.max_unconfirmed_retries, 3);
        assert!(matches!(
            ethereum.federation,
            crate::evm::FederationBackendConfig::MultiSig(ref m) if m.lookback == 20
        ));
        assert_eq!(config.federators.len(), 2);
        assert_eq!(config.federator("rev-fed-1").unwrap().origin, "ethereum");
        assert!(config.chain("disabled").is_err());
    }

    #[test]
    fn rejects_shared_storage_path() {
        let content = chains()
            + &federator("fed-1", KEY_1, "db/fed-1", "rsk")
            + &federator("fed-2", KEY_2, "./db/fed-1", "rsk");
        let err = parse(&content).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)), "{err}");
    }

    #[test]
    fn rejects_duplicate_names() {
        let content = chains()
            + &federator("fed-1", KEY_1, "db/fed-1", "rsk")
            + &federator("fed-1", KEY_2, "db/fed-2", "rsk");
        assert!(matches!(
            parse(&content).unwrap_err(),
            Error::Configuration(_)
        ));
    }

    #[test]
    fn rejects_unknown_or_disabled_chain() {
        let content = chains()
            + &federator("fed-1", KEY_1, "db/fed-1", "disabled");
        assert!(matches!(
            parse(&content).unwrap_err(),
            Error::Configuration(_)
        ));
    }
}

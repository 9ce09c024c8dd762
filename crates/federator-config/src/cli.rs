use crate::federator::FederatorInstanceConfig;
use crate::FederatorConfig;
use anyhow::Context;
use directories_next::ProjectDirs;
use federator_types::TransferEventId;
use std::path::{Path, PathBuf};
use structopt::StructOpt;

/// Package identifier, where the default configuration is defined.
/// If the user does not start the federator with the `--config-dir`
/// it will default to read from the default location depending on the OS.
pub const PACKAGE_ID: [&str; 3] = ["tools", "webb", "bridge-federator"];

/// The Bridge Federator Command-line tool
///
/// Start the federator from a config directory:
///
/// $ bridge-federator -vvv -c <CONFIG_DIR_PATH>
#[derive(StructOpt)]
#[structopt(name = "Bridge Federator")]
pub struct Opts {
    /// A level of verbosity, and can be used multiple times
    #[structopt(short, long, parse(from_occurrences))]
    pub verbose: i32,
    /// Directory that contains configration files.
    #[structopt(
        short = "c",
        long = "config-dir",
        value_name = "PATH",
        parse(from_os_str)
    )]
    pub config_dir: Option<PathBuf>,
    /// Create the Database Stores in a temporary directory.
    /// and will be deleted when the process exits.
    #[structopt(long)]
    pub tmp: bool,
    /// Run one pass of every federator instance, one after the other, then exit.
    #[structopt(long)]
    pub once: bool,
    /// Move a failed proposal back to pending, then exit.
    ///
    /// Format: `<federator>:<chain_id>:<tx_hash>:<log_index>`
    #[structopt(long, value_name = "FEDERATOR:EVENT_ID")]
    pub requeue_failed: Option<String>,
}

/// Splits a `--requeue-failed` argument into the instance name and the event id.
pub fn parse_requeue_target(
    value: &str,
) -> anyhow::Result<(String, TransferEventId)> {
    let (name, id) = value
        .split_once(':')
        .context("expected <federator>:<chain_id>:<tx_hash>:<log_index>")?;
    let id = id.parse::<TransferEventId>()?;
    Ok((name.to_owned(), id))
}

/// Loads the configuration from the given directory.
///
/// Returns `Ok(Config)` on success, or `Err(anyhow::Error)` on failure.
pub fn load_config<P>(
    config_dir: Option<P>,
) -> Result<FederatorConfig, anyhow::Error>
where
    P: AsRef<Path>,
{
    tracing::debug!("Getting default dirs for bridge federator");
    let dirs = ProjectDirs::from(PACKAGE_ID[0], PACKAGE_ID[1], PACKAGE_ID[2])
        .context("failed to get config")?;
    let path = match config_dir {
        Some(p) => p.as_ref().to_path_buf(),
        None => dirs.config_dir().to_path_buf(),
    };
    // return an error if the path is not a directory.
    if !path.is_dir() {
        return Err(anyhow::anyhow!("{} is not a directory", path.display()));
    }
    tracing::trace!("Loading Config from {} ..", path.display());
    let v = crate::utils::load(path)?;
    tracing::trace!("Config loaded..");
    Ok(v)
}

/// Sets up the logger for the federator, based on the verbosity level passed in.
///
/// `0` only shows errors, every extra `-v` shows one more level down to `TRACE`.
pub fn setup_logger(verbosity: i32) -> anyhow::Result<()> {
    use tracing::Level;
    let log_level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("federator={log_level}").parse()?)
        .add_directive(format!("bridge_federator={log_level}").parse()?)
        .add_directive(format!("federation_backends={log_level}").parse()?);
    let logger = tracing_subscriber::fmt()
        .with_target(true)
        .with_max_level(log_level)
        .with_env_filter(env_filter);
    // if we are not compiling for integration tests, we should use pretty logs
    #[cfg(not(feature = "integration-tests"))]
    let logger = logger.pretty();
    // otherwise, we should use json, which is easy to parse.
    #[cfg(feature = "integration-tests")]
    let logger = logger.json().flatten_event(true).with_current_span(false);

    logger.init();
    Ok(())
}

/// Opens the database store of one federator instance.
///
/// With `tmp`, the store lives in a temporary directory instead of the
/// instance's `storage-path`.
pub fn create_store(
    federator: &FederatorInstanceConfig,
    tmp: bool,
) -> anyhow::Result<federator_store::SledStore> {
    if tmp {
        tracing::debug!(federator = %federator.name, "Using temp dir for store");
        let store = federator_store::SledStore::temporary()?;
        return Ok(store);
    }
    let store = federator_store::SledStore::open(&federator.storage_path)
        .with_context(|| {
            format!(
                "failed to open the store of {} at {} (is another federator using it?)",
                federator.name,
                federator.storage_path.display()
            )
        })?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requeue_target_is_split_on_first_colon() {
        let hash = format!("0x{}", "ab".repeat(32));
        let (name, id) =
            parse_requeue_target(&format!("fed-1:31:{hash}:4")).unwrap();
        assert_eq!(name, "fed-1");
        assert_eq!(id.chain_id, 31);
        assert_eq!(id.log_index, 4);
        assert!(parse_requeue_target("fed-1").is_err());
    }
}

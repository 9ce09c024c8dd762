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

//! Bridge Federator Binary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;

use bridge_federator::service::{self, Store};
use federator_config::cli::{
    create_store, load_config, parse_requeue_target, setup_logger, Opts,
};
use federator_config::federator::FederatorInstanceConfig;
use federator_config::FederatorConfig;
use federator_context::FederatorContext;
use federator_store::ProposalLedgerStore;
use federator_utils::probe;
use federator_utils::retry::ConstantWithMaxRetryCount;
use tokio::signal::unix;

/// How long a stopping federator may take to finish the pass it is in.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// The main entry point for the federator.
///
/// # Arguments
///
/// * `args` - The command line arguments.
#[paw::main]
#[tokio::main]
async fn main(args: Opts) -> anyhow::Result<()> {
    setup_logger(args.verbose)?;
    match dotenv::dotenv() {
        Ok(_) => {
            tracing::trace!("Loaded .env file");
        }
        Err(e) => {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }

    // The configuration is validated and configured from the given directory
    let config = load_config(args.config_dir.clone())?;

    if let Some(target) = &args.requeue_failed {
        return requeue(&config, target);
    }

    let ctx = FederatorContext::new(config)?;
    let mut federators = Vec::with_capacity(ctx.config.federators.len());
    for instance in &ctx.config.federators {
        let store = open_store(instance, args.tmp).await?;
        federators.push(service::build_federator(&ctx, instance, store)?);
    }

    if args.once {
        let outcomes = service::run_once_all(&ctx, &mut federators).await;
        let failures = outcomes
            .iter()
            .filter_map(|(name, outcome)| {
                outcome.as_ref().err().map(|e| format!("{name}: {e}"))
            })
            .collect::<Vec<_>>();
        if !failures.is_empty() {
            anyhow::bail!(
                "{} pass(es) failed: {}",
                failures.len(),
                failures.join("; ")
            );
        }
        return Ok(());
    }

    let metrics_server =
        tokio::spawn(service::build_metrics_service(ctx.clone()));
    // this does not block, will fire the federators on background tasks.
    let handles = service::ignite(&ctx, federators);
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        started = true
    );

    // watch for signals
    let mut ctrlc_signal = unix::signal(unix::SignalKind::interrupt())?;
    let mut termination_signal = unix::signal(unix::SignalKind::terminate())?;
    let mut quit_signal = unix::signal(unix::SignalKind::quit())?;
    tokio::select! {
        _ = ctrlc_signal.recv() => {
            tracing::warn!("Interrupted (Ctrl+C) ...");
        },
        _ = termination_signal.recv() => {
            tracing::warn!("Got Terminate signal ...");
        },
        _ = quit_signal.recv() => {
            tracing::warn!("Quitting ...");
        },
    }

    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        shutdown = true
    );
    tracing::warn!("Shutting down...");
    // send shutdown signal to all of the application.
    ctx.shutdown();
    metrics_server.abort();
    let stopped = tokio::time::timeout(
        SHUTDOWN_GRACE,
        futures::future::join_all(handles),
    )
    .await;
    if stopped.is_err() {
        tracing::warn!("Some federators did not stop in time");
    }
    tracing::info!("Clean Exit ..");
    Ok(())
}

/// Opens the store of `instance`, waiting for a previous process that still
/// holds its lock to exit.
async fn open_store(
    instance: &FederatorInstanceConfig,
    tmp: bool,
) -> anyhow::Result<Store> {
    let policy = ConstantWithMaxRetryCount::new(Duration::from_secs(1), 5);
    backoff::future::retry(policy, || async {
        create_store(instance, tmp).map_err(|e| {
            tracing::warn!(
                federator = %instance.name,
                error = %e,
                "Store not ready",
            );
            backoff::Error::transient(e)
        })
    })
    .await
}

/// Moves one failed proposal of a federator instance back to pending.
fn requeue(config: &FederatorConfig, target: &str) -> anyhow::Result<()> {
    let (name, id) = parse_requeue_target(target)?;
    let instance = config.federator(&name)?;
    let store = create_store(instance, false)?;
    if !store.requeue_failed(&id)? {
        anyhow::bail!("{name} has no failed proposal for {id}");
    }
    println!("{id} requeued, {name} proposes it on its next pass");
    Ok(())
}

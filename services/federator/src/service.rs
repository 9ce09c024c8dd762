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

//! # Federator Service Module 🌉
//!
//! Builds a [`Federator`] for every configured instance and runs them, either
//! periodically on background tasks or once, one after the other.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use federation_backends::FederationBackendSelector;
use federator_chain_reader::evm::EvmBridgeLogSource;
use federator_chain_reader::{ChainReader, ChainReaderConfig};
use federator_config::federator::FederatorInstanceConfig;
use federator_context::{FederatorContext, Shutdown};
use federator_core::{Federator, InstanceSettings, PassReport};
use federator_tx_sender::{
    EvmTransactionSender, TransactionSubmitter, TxSenderSettings,
};
use federator_types::EthersClient;
use federator_utils::probe;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Type alias for [Sled](https://sled.rs)-based database store
pub type Store = federator_store::SledStore;

/// A federator instance wired to live chains.
pub type EvmFederator = Federator<
    Store,
    EvmBridgeLogSource<EthersClient>,
    FederationBackendSelector<EthersClient>,
    EvmTransactionSender<EthersClient>,
>;

/// Wires the federator instance `instance` to its chains, on top of `store`.
///
/// Nothing is read from the chains yet, so this does not fail on an
/// unreachable endpoint.
pub fn build_federator(
    ctx: &FederatorContext,
    instance: &FederatorInstanceConfig,
    store: Store,
) -> crate::Result<EvmFederator> {
    let origin = ctx.config.chain(&instance.origin)?;
    let destination = ctx.config.chain(&instance.destination)?;
    let origin_client = ctx.evm_provider(&instance.origin)?;
    let destination_client = ctx.evm_provider(&instance.destination)?;

    let watcher = &origin.events_watcher;
    let source = EvmBridgeLogSource::new(
        origin.chain_id,
        origin.bridge.address,
        origin_client,
    );
    let reader = ChainReader::new(
        source,
        ChainReaderConfig {
            max_blocks_per_step: watcher.max_blocks_per_step,
            max_retries: watcher.max_retries,
            retry_interval: Duration::from_millis(watcher.retry_interval),
        },
    );
    let federation = FederationBackendSelector::from_config(
        destination,
        destination_client.clone(),
    );
    let submitter = EvmTransactionSender::new(
        destination.chain_id,
        destination_client,
        ctx.evm_wallet(instance)?,
        TxSenderSettings::from_config(
            &destination.tx_sender,
            destination.explorer.clone(),
        ),
    );
    tracing::info!(
        federator = %instance.name,
        origin = %origin.name,
        destination = %destination.name,
        voter = ?submitter.address(),
        "Federator instance ready",
    );

    let federator = Federator::builder()
        .settings(InstanceSettings::from_config(instance, origin, destination))
        .store(store)
        .reader(reader)
        .federation(federation)
        .submitter(submitter)
        .metrics(ctx.metrics.clone())
        .build();
    Ok(federator)
}

/// Starts every federator on its own background task.
///
/// The `i`-th federator starts `i * stagger-interval` after the first one, then
/// runs a pass every `polling-interval` of its origin chain until the shutdown
/// signal fires. A pass in flight is finished before the task returns.
pub fn ignite(
    ctx: &FederatorContext,
    federators: Vec<EvmFederator>,
) -> Vec<JoinHandle<()>> {
    let stagger = Duration::from_millis(ctx.config.scheduler.stagger_interval);
    federators
        .into_iter()
        .enumerate()
        .map(|(i, federator)| {
            let delay = stagger.saturating_mul(i as u32);
            let shutdown = ctx.shutdown_signal();
            tokio::task::spawn(run_periodically(federator, delay, shutdown))
        })
        .collect()
}

async fn run_periodically(
    mut federator: EvmFederator,
    delay: Duration,
    mut shutdown: Shutdown,
) {
    let name = federator.settings().name.clone();
    tokio::select! {
        biased;
        _ = shutdown.recv() => return,
        _ = time::sleep(delay) => {},
    }
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        federator = %name,
        started = true,
    );
    let mut ticker = time::interval(federator.settings().polling_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                tracing::info!(federator = %name, "Stopping federator");
                break;
            }
            _ = ticker.tick() => {},
        }
        match federator.run_once().await {
            Ok(report) => log_report(&name, &report),
            Err(e) if e.is_fatal() => {
                tracing::error!(
                    federator = %name,
                    error = %e,
                    "Federator stopped on a fatal error",
                );
                break;
            }
            // already logged by the pass, retried on the next tick.
            Err(_) => {}
        }
    }
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        federator = %name,
        shutdown = true,
    );
}

/// Runs one pass of every federator, one after the other, sleeping
/// `stagger-interval` between two of them.
///
/// Returns the outcome of every pass, in the order of `federators`. A failed
/// pass does not keep the next federators from running.
pub async fn run_once_all(
    ctx: &FederatorContext,
    federators: &mut [EvmFederator],
) -> Vec<(String, crate::Result<PassReport>)> {
    let stagger = Duration::from_millis(ctx.config.scheduler.stagger_interval);
    let mut outcomes = Vec::with_capacity(federators.len());
    for (i, federator) in federators.iter_mut().enumerate() {
        if i > 0 {
            time::sleep(stagger).await;
        }
        let name = federator.settings().name.clone();
        let outcome = federator.run_once().await;
        if let Ok(report) = &outcome {
            log_report(&name, report);
        }
        outcomes.push((name, outcome));
    }
    outcomes
}

fn log_report(name: &str, report: &PassReport) {
    let noteworthy = report.submitted + report.failed > 0
        || report.interrupted.is_some();
    if noteworthy {
        tracing::info!(
            federator = %name,
            window = %report.window,
            submitted = report.submitted,
            failed = report.failed,
            pending = report.pending,
            interrupted = ?report.interrupted,
            "Pass finished",
        );
    } else {
        tracing::debug!(
            federator = %name,
            window = %report.window,
            scanned = report.scanned,
            "Pass finished",
        );
    }
}

/// Serves the federator metrics at `GET /metrics` on the configured port.
pub async fn build_metrics_service(
    ctx: FederatorContext,
) -> anyhow::Result<()> {
    let socket_addr = SocketAddr::new([0, 0, 0, 0].into(), ctx.config.port);
    let app = Router::new()
        .route("/metrics", get(handle_metrics))
        .with_state(Arc::new(ctx));

    tracing::info!("Starting the metrics server on {}", socket_addr);
    axum::Server::bind(&socket_addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

async fn handle_metrics(
    State(ctx): State<Arc<FederatorContext>>,
) -> Result<String, (StatusCode, String)> {
    ctx.metrics
        .gather_metrics()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

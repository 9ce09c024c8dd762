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
//! The context every federator instance runs in.
//!
//! It owns the loaded configuration, the metrics registry and the shutdown
//! broadcast, and knows how to build providers and wallets from the config.

use std::sync::Arc;
use std::time::Duration;

use ethers::providers::{Http, Provider, RetryClientBuilder};
use ethers::signers::{LocalWallet, Signer};
use federator_config::federator::FederatorInstanceConfig;
use federator_config::FederatorConfig;
use federator_types::EthersClient;
use federator_utils::metric::Metrics;
use federator_utils::multi_provider::MultiProvider;
use federator_utils::Result;
use tokio::sync::broadcast;

mod ethers_retry_policy;

pub use ethers_retry_policy::FederatorHttpRetryPolicy;

/// How many times a rate limited request is retried by the provider.
const RATE_LIMIT_RETRIES: u32 = 10;
/// How many times a timed out request is retried by the provider.
const TIMEOUT_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const PROVIDER_POLLING_INTERVAL: Duration = Duration::from_millis(1_000);

/// FederatorContext contains the federator's configuration and the shutdown signal.
#[derive(Clone)]
pub struct FederatorContext {
    /// The configuration of the federator.
    pub config: FederatorConfig,
    /// Broadcasts a shutdown signal to all active tasks.
    ///
    /// When a task is spawned, it is passed a broadcast receiver handle. When
    /// a graceful shutdown is initiated, a `()` value is sent via the
    /// broadcast::Sender. Each active task receives it, reaches a safe
    /// terminal state, and completes the task.
    notify_shutdown: broadcast::Sender<()>,
    /// Represents the metrics for the federator
    pub metrics: Arc<Metrics>,
}

impl FederatorContext {
    /// Creates a new FederatorContext.
    pub fn new(config: FederatorConfig) -> Result<Self> {
        let (notify_shutdown, _) = broadcast::channel(2);
        let metrics = Arc::new(Metrics::new()?);
        Ok(Self {
            config,
            notify_shutdown,
            metrics,
        })
    }

    /// Returns a broadcast receiver handle for the shutdown signal.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown::new(self.notify_shutdown.subscribe())
    }

    /// Sends a shutdown signal to all subscribed tasks/connections.
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(());
    }

    /// Returns a provider of the chain named `chain_name`, round-robin over all
    /// of its endpoints, retrying rate limited requests.
    pub fn evm_provider(&self, chain_name: &str) -> Result<Arc<EthersClient>> {
        let chain = self.config.chain(chain_name)?;
        let endpoints = chain
            .endpoints()
            .map(|url| Http::new(url.as_url().clone()))
            .collect::<Vec<_>>();
        tracing::debug!(
            chain = %chain.name,
            endpoints = endpoints.len(),
            "Building provider",
        );
        let client = RetryClientBuilder::default()
            .rate_limit_retries(RATE_LIMIT_RETRIES)
            .timeout_retries(TIMEOUT_RETRIES)
            .initial_backoff(INITIAL_BACKOFF)
            .build(
                MultiProvider::new(Arc::new(endpoints)),
                FederatorHttpRetryPolicy::boxed(),
            );
        let provider =
            Provider::new(client).interval(PROVIDER_POLLING_INTERVAL);
        Ok(Arc::new(provider))
    }

    /// Returns the wallet of `instance`, bound to its destination chain.
    pub fn evm_wallet(
        &self,
        instance: &FederatorInstanceConfig,
    ) -> Result<LocalWallet> {
        let destination = self.config.chain(&instance.destination)?;
        let wallet = LocalWallet::from_bytes(instance.private_key.as_bytes())?
            .with_chain_id(destination.chain_id);
        Ok(wallet)
    }
}

/// Listens for the server shutdown signal.
///
/// Shutdown is signalled using a `broadcast::Receiver`. Only a single value is
/// ever sent. Once a value has been sent via the broadcast channel, the server
/// should shutdown.
///
/// The `Shutdown` struct listens for the signal and tracks that the signal has
/// been received. Callers may query for whether the shutdown signal has been
/// received or not.
#[derive(Debug)]
pub struct Shutdown {
    /// `true` if the shutdown signal has been received
    shutdown: bool,
    /// The receive half of the channel used to listen for shutdown.
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Create a new `Shutdown` backed by the given `broadcast::Receiver`.
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    /// Returns `true` if the shutdown signal has been received.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Receive the shutdown notice, waiting if necessary.
    pub async fn recv(&mut self) {
        // If the shutdown signal has already been received, then return
        // immediately.
        if self.shutdown {
            return;
        }

        // Cannot receive a "lag error" as only one value is ever sent.
        let _ = self.notify.recv().await;

        // Remember that the signal has been received.
        self.shutdown = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use federator_config::utils::parse_from_str;

    const CONFIG: &str = r#"
        [evm.rsk]
        name = "rsk"
        http-endpoint = "http://localhost:4444"
        fallback-http-endpoints = ["http://localhost:4445"]
        chain-id = 31
        bridge = { address = "0x0000000000000000000000000000000000000b01", deployed-at = 100 }
        federation = { type = "Federation", address = "0x00000000000000000000000000000000000000fe" }

        [evm.ethereum]
        name = "ethereum"
        http-endpoint = "http://localhost:8545"
        chain-id = 5777
        bridge = { address = "0x0000000000000000000000000000000000000b02", deployed-at = 1 }
        federation = { type = "Federation", address = "0x00000000000000000000000000000000000000ff" }

        [[federator]]
        name = "rsk-to-eth"
        origin = "rsk"
        destination = "ethereum"
        private-key = "0x000000000000000000000000000000000000000000000000000000000000beef"
        storage-path = "/tmp/federator-context-test"
    "#;

    fn context() -> FederatorContext {
        FederatorContext::new(parse_from_str(CONFIG).unwrap()).unwrap()
    }

    #[test]
    fn wallet_is_bound_to_the_destination_chain() {
        let ctx = context();
        let instance = ctx.config.federator("rsk-to-eth").unwrap();
        let wallet = ctx.evm_wallet(instance).unwrap();
        assert_eq!(wallet.chain_id(), 5777);
    }

    #[test]
    fn unknown_chain_has_no_provider() {
        let ctx = context();
        assert!(ctx.evm_provider("rsk").is_ok());
        assert!(matches!(
            ctx.evm_provider("polygon"),
            Err(federator_utils::Error::ChainNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn shutdown_reaches_every_subscriber() {
        let ctx = context();
        let mut first = ctx.shutdown_signal();
        let mut second = ctx.shutdown_signal();
        ctx.shutdown();
        first.recv().await;
        second.recv().await;
        assert!(first.is_shutdown() && second.is_shutdown());
    }
}

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

//! # Chain Reader 🔭
//!
//! Reads the `Cross` events of a bridge contract, only once they are buried
//! under enough blocks.
//!
//! The reader pages through a block window, retries failed reads with an
//! exponential backoff, and reports [`Error::ChainUnavailable`] once the retries
//! are exhausted. Events are always yielded ordered by block height, then log
//! index.

use std::time::Duration;

use ethers::types::Address;
use federator_types::{BlockWindow, TransferEvent};
use federator_utils::probe;
use federator_utils::retry::ExponentialWithMaxRetryCount;
use federator_utils::{Error, Result};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

/// Reads bridge events from an EVM chain through ethers.
pub mod evm;
/// An in-memory log source, for tests and local runs.
pub mod mocked;

/// A source of bridge transfer events: one bridge contract on one chain.
#[async_trait::async_trait]
pub trait BridgeLogSource: Send + Sync {
    /// The chain this source reads from.
    fn chain_id(&self) -> u64;
    /// The bridge contract whose events are read.
    fn bridge_address(&self) -> Address;
    /// The current head of the chain.
    async fn latest_block(&self) -> Result<u64>;
    /// Every transfer event emitted by the bridge in blocks `[from, to]`.
    async fn transfer_events(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<TransferEvent>>;
}

/// How a [`ChainReader`] pages and retries.
#[derive(Debug, Clone, Copy)]
pub struct ChainReaderConfig {
    /// The maximum number of blocks to fetch in one request.
    pub max_blocks_per_step: u64,
    /// How many times a failed read is retried.
    pub max_retries: usize,
    /// The wait before the first retry, doubled on every retry after it.
    pub retry_interval: Duration,
}

impl Default for ChainReaderConfig {
    fn default() -> Self {
        Self {
            max_blocks_per_step: 500,
            max_retries: 5,
            retry_interval: Duration::from_secs(1),
        }
    }
}

/// Reads confirmed transfer events from a [`BridgeLogSource`].
#[derive(Debug)]
pub struct ChainReader<S> {
    source: S,
    config: ChainReaderConfig,
}

impl<S: BridgeLogSource> ChainReader<S> {
    pub fn new(source: S, config: ChainReaderConfig) -> Self {
        Self { source, config }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn chain_id(&self) -> u64 {
        self.source.chain_id()
    }

    /// The window of `[from, to]` whose blocks have at least `confirmations`
    /// blocks on top of them, i.e. `[from, to - confirmations]`. Empty when
    /// `to` is lower than `confirmations`.
    pub fn confirmed_window(
        from: u64,
        to: u64,
        confirmations: u64,
    ) -> BlockWindow {
        match to.checked_sub(confirmations) {
            Some(upper) => BlockWindow::new(from, upper),
            None => BlockWindow::new(1, 0),
        }
    }

    /// The current head of the chain.
    pub async fn latest_block(&self) -> Result<u64> {
        self.with_retry("latest_block", || self.source.latest_block())
            .await
    }

    /// The highest block with `confirmations` blocks on top of it.
    pub async fn safe_head(&self, confirmations: u64) -> Result<u64> {
        Ok(self.latest_block().await?.saturating_sub(confirmations))
    }

    /// A lazy stream of the transfer events emitted in the confirmed part of
    /// `[from, to]`, see [`ChainReader::confirmed_window`].
    ///
    /// The stream is finite, and can be started again from scratch. The first
    /// read that fails even after retrying ends it with an error.
    pub fn transfer_events(
        &self,
        from: u64,
        to: u64,
        confirmations: u64,
    ) -> BoxStream<'_, Result<TransferEvent>> {
        let window = Self::confirmed_window(from, to, confirmations);
        let step = self.config.max_blocks_per_step.max(1);
        let start = (!window.is_empty()).then_some(window.from);
        stream::try_unfold(start, move |next| async move {
            let Some(page_from) = next else {
                return Ok::<_, Error>(None);
            };
            let page_to = page_from.saturating_add(step - 1).min(window.to);
            let page = self.fetch_page(page_from, page_to).await?;
            let next = page_to.checked_add(1).filter(|n| *n <= window.to);
            Ok::<_, Error>(Some((page, next)))
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, Error>)))
        .try_flatten()
        .boxed()
    }

    #[tracing::instrument(skip(self), fields(chain_id = self.chain_id()))]
    async fn fetch_page(&self, from: u64, to: u64) -> Result<Vec<TransferEvent>> {
        let mut events = self
            .with_retry("transfer_events", || {
                self.source.transfer_events(from, to)
            })
            .await?;
        events.sort_by_key(TransferEvent::position);
        tracing::trace!("Found #{} events", events.len());
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::TRACE,
            kind = %probe::Kind::Sync,
            chain_id = self.chain_id(),
            from,
            to,
            events = events.len(),
        );
        Ok(events)
    }

    /// Runs `op` until it succeeds or the retries are exhausted, in which
    /// case the chain is reported as unavailable.
    async fn with_retry<T, F, Fut>(&self, what: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let chain_id = self.chain_id();
        let backoff = ExponentialWithMaxRetryCount::new(
            self.config.retry_interval,
            self.config.retry_interval * 32,
            self.config.max_retries,
        );
        let task = || async {
            op().await.map_err(|e| {
                if e.is_fatal() {
                    backoff::Error::permanent(e)
                } else {
                    backoff::Error::transient(e)
                }
            })
        };
        let notify = |e: Error, after: Duration| {
            tracing::warn!(%chain_id, %e, "{what} failed, retrying in {}ms", after.as_millis());
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Retry,
                %chain_id,
                what,
                wait_ms = after.as_millis() as u64,
            );
        };
        backoff::future::retry_notify(backoff, task, notify)
            .await
            .map_err(|e| match e {
                Error::ChainUnavailable { .. } => e,
                e if e.is_fatal() => e,
                e => Error::chain_unavailable(chain_id, e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocked::MockedLogSource;

    fn reader(source: MockedLogSource) -> ChainReader<MockedLogSource> {
        ChainReader::new(
            source,
            ChainReaderConfig {
                max_blocks_per_step: 3,
                max_retries: 2,
                retry_interval: Duration::from_millis(1),
            },
        )
    }

    #[test]
    fn confirmed_window_saturates() {
        let w = ChainReader::<MockedLogSource>::confirmed_window(100, 110, 5);
        assert_eq!(w, BlockWindow::new(100, 105));
        let w = ChainReader::<MockedLogSource>::confirmed_window(0, 3, 5);
        assert!(w.is_empty());
        let w = ChainReader::<MockedLogSource>::confirmed_window(10, 12, 5);
        assert!(w.is_empty());
    }

    #[tokio::test]
    async fn events_are_paged_and_ordered() {
        let source = MockedLogSource::new(31, 200);
        source.emit(104, 2);
        source.emit(101, 0);
        source.emit(104, 0);
        source.emit(108, 1);
        let reader = reader(source);
        let events: Vec<_> = reader
            .transfer_events(100, 110, 0)
            .try_collect()
            .await
            .unwrap();
        let positions: Vec<_> = events.iter().map(|e| e.position()).collect();
        assert_eq!(positions, vec![(101, 0), (104, 0), (104, 2), (108, 1)]);
        // 11 blocks in pages of 3.
        assert_eq!(reader.source().log_requests(), 4);
    }

    #[tokio::test]
    async fn events_within_confirmations_are_not_surfaced() {
        let source = MockedLogSource::new(31, 110);
        source.emit(105, 0);
        source.emit(106, 0);
        let reader = reader(source);
        let events: Vec<_> = reader
            .transfer_events(100, 110, 5)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].block_number, 105);
        assert_eq!(reader.safe_head(5).await.unwrap(), 105);
    }

    #[tokio::test]
    async fn empty_window_yields_nothing() {
        let reader = reader(MockedLogSource::new(31, 10));
        let events: Vec<_> =
            reader.transfer_events(8, 10, 5).try_collect().await.unwrap();
        assert!(events.is_empty());
        assert_eq!(reader.source().log_requests(), 0);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn transient_failures_are_retried() {
        let source = MockedLogSource::new(31, 200);
        source.emit(101, 0);
        source.fail_next_requests(2);
        let reader = reader(source);
        let events: Vec<_> = reader
            .transfer_events(100, 102, 0)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert!(logs_contain("retrying"));
    }

    #[tokio::test]
    async fn exhausted_retries_are_chain_unavailable() {
        let source = MockedLogSource::new(31, 200);
        source.fail_next_requests(10);
        let reader = reader(source);
        let result: Result<Vec<_>> =
            reader.transfer_events(100, 110, 0).try_collect().await;
        assert!(matches!(
            result,
            Err(Error::ChainUnavailable { chain_id: 31, .. })
        ));
    }
}

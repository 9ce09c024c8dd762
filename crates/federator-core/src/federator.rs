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

use std::sync::Arc;
use std::time::Instant;

use federation_backends::FederationBackend;
use federator_chain_reader::{BridgeLogSource, ChainReader};
use federator_store::FederatorStore;
use federator_tx_sender::TransactionSubmitter;
use federator_types::{
    BlockWindow, ProposalRecord, ProposalStatus, ScanCursor, StatusKind,
    TransferEvent,
};
use federator_utils::metric::Metrics;
use federator_utils::{probe, Error, Result};
use futures::TryStreamExt;
use typed_builder::TypedBuilder;

use crate::{FederatorState, InstanceSettings, PassReport};

/// An event picked for this pass, with what the ledger knows about it.
struct Candidate {
    event: TransferEvent,
    existing: Option<ProposalRecord>,
}

/// The events of one pass that are not settled yet, and where that holds the
/// cursor back.
struct Open {
    window: BlockWindow,
    lowest: Option<u64>,
}

impl Open {
    fn new(window: BlockWindow) -> Self {
        Self {
            window,
            lowest: None,
        }
    }

    /// Only window events hold the cursor, backlog events are behind it already.
    fn keep(&mut self, event: &TransferEvent) {
        if self.window.contains(event.block_number) {
            let block = event.block_number;
            self.lowest = Some(self.lowest.map_or(block, |l| l.min(block)));
        }
    }

    /// The last block the cursor may move to.
    fn advance_bound(&self) -> u64 {
        match self.lowest {
            Some(block) => block.saturating_sub(1),
            None => self.window.to,
        }
    }
}

/// Runs the passes of one federator instance.
#[derive(TypedBuilder)]
pub struct Federator<S, R, F, T> {
    settings: InstanceSettings,
    store: S,
    reader: ChainReader<R>,
    federation: F,
    submitter: T,
    metrics: Arc<Metrics>,
    #[builder(default, setter(skip))]
    state: FederatorState,
    #[builder(default = Instant::now(), setter(skip))]
    last_progress: Instant,
}

impl<S, R, F, T> Federator<S, R, F, T>
where
    S: FederatorStore,
    R: BridgeLogSource,
    F: FederationBackend,
    T: TransactionSubmitter,
{
    pub fn settings(&self) -> &InstanceSettings {
        &self.settings
    }

    pub fn state(&self) -> FederatorState {
        self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn transition(&mut self, to: FederatorState) {
        let from = std::mem::replace(&mut self.state, to);
        tracing::debug!(
            federator = %self.settings.name,
            cursor_key = %self.settings.cursor_key,
            %from,
            %to,
            "state transition",
        );
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::State,
            federator = %self.settings.name,
            chain_id = self.settings.cursor_key.chain_id,
            %from,
            %to,
        );
    }

    /// Runs one pass over the confirmed blocks after the scan cursor.
    ///
    /// Fails without touching the cursor if the origin chain can not be read.
    /// A destination failure while filtering or proposing only interrupts the
    /// pass: what was settled before it is committed, and the cursor stops
    /// before the first unsettled event.
    #[tracing::instrument(
        skip_all,
        fields(
            federator = %self.settings.name,
            cursor_key = %self.settings.cursor_key,
        ),
    )]
    pub async fn run_once(&mut self) -> Result<PassReport> {
        self.metrics.passes.inc();
        self.transition(FederatorState::Scanning);
        let outcome = self.pass().await;
        if let Err(e) = &outcome {
            if matches!(e, Error::ChainUnavailable { .. }) {
                self.metrics.chain_unavailable.inc();
            }
            tracing::error!(error = %e, "pass failed");
        }
        self.transition(FederatorState::Idle);
        outcome
    }

    async fn pass(&mut self) -> Result<PassReport> {
        let key = self.settings.cursor_key;
        let default = ScanCursor::starting_at(
            self.settings.deployed_at,
            self.settings.confirmations,
        );
        let cursor = self.store.get_scan_cursor(key, default)?;
        let (latest, window, events) = self.scan(cursor).await?;
        let backlog = self.backlog(cursor)?;
        let mut report =
            PassReport::new(window, cursor.last_processed_block);
        report.scanned = events.len();
        self.metrics.events_scanned.inc_by(events.len() as f64);
        if window.is_empty() && backlog.is_empty() {
            tracing::trace!("nothing to do");
            return Ok(report);
        }

        self.transition(FederatorState::Filtering);
        let mut open = Open::new(window);
        let mut finals = Vec::new();
        let mut halted: Option<Error> = None;
        let mut to_propose = Vec::new();
        for event in backlog.into_iter().chain(events) {
            if halted.is_some() {
                open.keep(&event);
                report.pending += 1;
                continue;
            }
            let existing = self.store.get_proposal_record(&event.id)?;
            let kind = existing.as_ref().map(|r| r.status.kind());
            // a vote of ours inside the window may have reached quorum since
            let awaiting_quorum = kind == Some(StatusKind::Submitted)
                && window.contains(event.block_number);
            if kind.map_or(false, |k| k != StatusKind::Pending)
                && !awaiting_quorum
            {
                tracing::trace!(event = %event.id, "already settled");
                report.skipped += 1;
                continue;
            }
            match self.verify(&event, existing.as_ref()).await {
                Ok(status) if awaiting_quorum => match status {
                    Some(status @ ProposalStatus::Confirmed { .. }) => {
                        self.count(&mut report, &status);
                        finals.push(ProposalRecord::new(event, status));
                    }
                    _ => {
                        tracing::trace!(event = %event.id, "no quorum yet");
                        report.skipped += 1;
                    }
                },
                Ok(Some(status)) => {
                    self.count(&mut report, &status);
                    finals.push(ProposalRecord::new(event, status));
                }
                Ok(None) => to_propose.push(Candidate { event, existing }),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(event = %event.id, error = %e, "could not verify transfer");
                    open.keep(&event);
                    report.pending += 1;
                    halted = Some(e);
                }
            }
        }

        self.transition(FederatorState::Proposing);
        for Candidate { event, existing } in to_propose {
            if halted.is_some() {
                open.keep(&event);
                report.pending += 1;
                continue;
            }
            match self.propose(&event, existing).await {
                Ok(status) => {
                    self.count(&mut report, &status);
                    if !status.is_terminal() {
                        open.keep(&event);
                    }
                    // submitted records are already durable
                    if status.kind() != StatusKind::Submitted {
                        finals.push(ProposalRecord::new(event, status));
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(event = %event.id, error = %e, "proposing interrupted");
                    open.keep(&event);
                    report.pending += 1;
                    halted = Some(e);
                }
            }
        }

        self.transition(FederatorState::Advancing);
        let target = if window.is_empty() {
            cursor.last_processed_block
        } else {
            open.advance_bound()
        };
        let persisted = self.store.commit_window(
            key,
            cursor.advanced_to(target),
            &finals,
        )?;
        report.advanced_to = persisted.last_processed_block;
        self.metrics.set_last_processed_block(
            &self.settings.name,
            persisted.last_processed_block,
        );
        self.metrics
            .total_amount_of_data_stored
            .set(self.store.data_stored_size() as f64);
        self.print_progress(latest, persisted.last_processed_block);

        if let Some(e) = halted {
            if matches!(e, Error::ChainUnavailable { .. }) {
                self.metrics.chain_unavailable.inc();
            }
            report.interrupted = Some(e.to_string());
        }
        tracing::info!(
            window = %report.window,
            scanned = report.scanned,
            skipped = report.skipped,
            confirmed = report.confirmed,
            submitted = report.submitted,
            failed = report.failed,
            pending = report.pending,
            advanced_to = report.advanced_to,
            "pass done",
        );
        Ok(report)
    }

    /// Reads the confirmed events of the next window, returning the chain head
    /// and the window along with them.
    async fn scan(
        &self,
        cursor: ScanCursor,
    ) -> Result<(u64, BlockWindow, Vec<TransferEvent>)> {
        let confirmations = self.settings.confirmations;
        let from = cursor.last_processed_block.saturating_add(1);
        let latest = self.reader.latest_block().await?;
        let cap = cursor
            .last_processed_block
            .saturating_add(self.settings.max_blocks_per_pass)
            .saturating_add(confirmations);
        let to = latest.min(cap);
        let window = ChainReader::<R>::confirmed_window(from, to, confirmations);
        let events: Vec<TransferEvent> = self
            .reader
            .transfer_events(from, to, confirmations)
            .try_collect()
            .await?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Sync,
            federator = %self.settings.name,
            chain_id = self.settings.cursor_key.chain_id,
            %window,
            events = events.len(),
        );
        Ok((latest, window, events))
    }

    /// Pending ledger entries behind the cursor, i.e. requeued by an operator.
    fn backlog(&self, cursor: ScanCursor) -> Result<Vec<TransferEvent>> {
        let key = self.settings.cursor_key;
        let mut events = self
            .store
            .records_with_status(StatusKind::Pending)?
            .into_iter()
            .map(|r| r.event)
            .filter(|e| {
                e.id.chain_id == key.chain_id
                    && e.bridge == key.bridge
                    && e.block_number <= cursor.last_processed_block
            })
            .collect::<Vec<_>>();
        events.sort_by_key(TransferEvent::position);
        if !events.is_empty() {
            tracing::debug!(count = events.len(), "retrying requeued proposals");
        }
        Ok(events)
    }

    /// Asks the destination whether `event` is already taken care of.
    async fn verify(
        &self,
        event: &TransferEvent,
        existing: Option<&ProposalRecord>,
    ) -> Result<Option<ProposalStatus>> {
        let known_tx = existing.and_then(|r| r.status.tx_hash());
        if self.federation.has_quorum(event).await? {
            tracing::debug!(event = %event.id, "destination has quorum");
            return Ok(Some(ProposalStatus::Confirmed { tx_hash: known_tx }));
        }
        if self
            .federation
            .has_voted(event, self.submitter.address())
            .await?
        {
            tracing::debug!(event = %event.id, "already voted");
            return Ok(Some(ProposalStatus::Submitted { tx_hash: known_tx }));
        }
        Ok(None)
    }

    /// Builds, simulates and sends the vote for `event`, sending again while it
    /// stays unconfirmed.
    #[tracing::instrument(skip_all, fields(event = %event.id))]
    async fn propose(
        &self,
        event: &TransferEvent,
        existing: Option<ProposalRecord>,
    ) -> Result<ProposalStatus> {
        let voter = self.submitter.address();
        let mut attempts = existing.as_ref().map_or(0, |r| r.status.attempts());
        let mut last_tx_hash = existing.as_ref().and_then(|r| r.status.tx_hash());
        for retry in 0..=self.settings.max_unconfirmed_retries {
            if retry > 0 {
                self.metrics.unconfirmed_retries.inc();
                // the previous attempt may have landed after all
                if self.federation.has_voted(event, voter).await? {
                    let status = ProposalStatus::Submitted {
                        tx_hash: last_tx_hash,
                    };
                    self.store.record_status(&ProposalRecord::new(
                        event.clone(),
                        status.clone(),
                    ))?;
                    tracing::info!(tx_hash = ?last_tx_hash, "unconfirmed vote landed");
                    return Ok(status);
                }
            }
            let call = match self.federation.submit_or_vote(event, voter).await {
                Ok(call) => call,
                Err(Error::Rejected { reason }) => return Ok(self.failed(event, reason)),
                Err(e) => return Err(e),
            };
            attempts += 1;
            let pending = ProposalStatus::Pending {
                attempts,
                last_tx_hash,
            };
            self.store
                .record_status(&ProposalRecord::new(event.clone(), pending))?;

            match self.submitter.simulate(&call).await {
                Ok(()) => {}
                Err(Error::Rejected { reason }) => return Ok(self.failed(event, reason)),
                Err(e) => return Err(e),
            }
            match self.submitter.send(&call).await {
                Ok(receipt) => {
                    let status = ProposalStatus::Submitted {
                        tx_hash: Some(receipt.tx_hash),
                    };
                    self.store.record_status(&ProposalRecord::new(
                        event.clone(),
                        status.clone(),
                    ))?;
                    tracing::info!(tx_hash = ?receipt.tx_hash, "proposal submitted");
                    return Ok(status);
                }
                Err(Error::Rejected { reason }) => return Ok(self.failed(event, reason)),
                Err(Error::Unconfirmed { tx_hash }) => {
                    tracing::warn!(?tx_hash, attempts, "proposal unconfirmed");
                    last_tx_hash = Some(tx_hash);
                }
                Err(e) => return Err(e),
            }
        }
        tracing::warn!(attempts, "proposal still unconfirmed, leaving it pending");
        Ok(ProposalStatus::Pending {
            attempts,
            last_tx_hash,
        })
    }

    fn failed(&self, event: &TransferEvent, reason: String) -> ProposalStatus {
        tracing::error!(event = %event.id, %reason, "proposal rejected");
        ProposalStatus::Failed { reason }
    }

    fn count(&self, report: &mut PassReport, status: &ProposalStatus) {
        match status {
            ProposalStatus::Pending { .. } => report.pending += 1,
            ProposalStatus::Submitted { .. } => {
                self.metrics.proposals_submitted.inc();
                report.submitted += 1
            }
            ProposalStatus::Confirmed { .. } => {
                self.metrics.proposals_confirmed.inc();
                report.confirmed += 1
            }
            ProposalStatus::Failed { .. } => {
                self.metrics.proposals_failed.inc();
                report.failed += 1
            }
        }
    }

    fn print_progress(&mut self, latest: u64, currently_at: u64) {
        let interval = self.settings.print_progress_interval;
        if interval.is_zero() || self.last_progress.elapsed() < interval {
            return;
        }
        let target = latest.saturating_sub(self.settings.confirmations);
        let progress = if target == 0 {
            100.0
        } else {
            currently_at as f64 / target as f64 * 100.0
        };
        tracing::info!(
            target_block = target,
            currently_at,
            diff = target.saturating_sub(currently_at),
            is_syncing = progress < 99.99,
            progress,
            chain_id = self.settings.cursor_key.chain_id,
        );
        self.last_progress = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;
    use federation_backends::mocked::MockedFederation;
    use federator_chain_reader::mocked::MockedLogSource;
    use federator_chain_reader::ChainReaderConfig;
    use federator_store::InMemoryStore;
    use federator_tx_sender::mocked::MockedSubmitter;
    use federator_types::CursorKey;
    use std::time::Duration;

    #[test]
    fn open_events_hold_the_cursor_before_the_lowest_one() {
        let source = MockedLogSource::new(31, 200);
        let mut open = Open::new(BlockWindow::new(100, 110));
        assert_eq!(open.advance_bound(), 110);
        open.keep(&source.emit(105, 0));
        open.keep(&source.emit(103, 2));
        assert_eq!(open.advance_bound(), 102);
        // a requeued event behind the window
        open.keep(&source.emit(40, 0));
        assert_eq!(open.advance_bound(), 102);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn pass_before_deployment_only_goes_back_to_idle() {
        let source = MockedLogSource::new(31, 50);
        let settings = InstanceSettings {
            name: "idle".into(),
            cursor_key: CursorKey::new(31, source.bridge_address()),
            deployed_at: 100,
            confirmations: 5,
            max_blocks_per_pass: 100,
            max_unconfirmed_retries: 1,
            print_progress_interval: Duration::ZERO,
            polling_interval: Duration::from_secs(1),
        };
        let submitter = MockedSubmitter::new(5777, Address::repeat_byte(0xf1));
        let mut federator = Federator::builder()
            .settings(settings)
            .store(InMemoryStore::default())
            .reader(ChainReader::new(source, ChainReaderConfig::default()))
            .federation(MockedFederation::new(
                5777,
                Address::repeat_byte(0xfe),
                1,
            ))
            .submitter(submitter.clone())
            .metrics(Arc::new(Metrics::new().unwrap()))
            .build();

        let report = federator.run_once().await.unwrap();
        assert!(report.window.is_empty());
        assert_eq!(report.advanced_to, 99);
        assert_eq!(federator.state(), FederatorState::Idle);
        assert!(submitter.sent().is_empty());
        assert!(logs_contain("state transition"));
    }
}

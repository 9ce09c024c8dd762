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

use prometheus::core::{AtomicF64, GenericCounter, GenericGauge};
use prometheus::{
    register_counter_with_registry, register_gauge_vec_with_registry,
    register_gauge_with_registry, Encoder, GaugeVec, Registry, TextEncoder,
};

/// A struct definition for collecting metrics in the federator.
///
/// Every context owns its own [`Registry`], so several federator contexts can live in the
/// same process (as they do in tests) without clashing on metric names.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    /// Federator loop passes that ran to completion.
    pub passes: GenericCounter<AtomicF64>,
    /// Transfer events read from origin chains.
    pub events_scanned: GenericCounter<AtomicF64>,
    /// Proposals whose transaction got a successful receipt.
    pub proposals_submitted: GenericCounter<AtomicF64>,
    /// Proposals that already had quorum on the destination.
    pub proposals_confirmed: GenericCounter<AtomicF64>,
    /// Proposals rejected by the destination.
    pub proposals_failed: GenericCounter<AtomicF64>,
    /// Broadcasts that timed out and were sent again.
    pub unconfirmed_retries: GenericCounter<AtomicF64>,
    /// Passes aborted because a chain endpoint was unreachable.
    pub chain_unavailable: GenericCounter<AtomicF64>,
    /// Total amount of data stored metric
    pub total_amount_of_data_stored: GenericGauge<AtomicF64>,
    last_processed_block: GaugeVec,
}

impl Metrics {
    /// Instantiates the various metrics and their counters, also creates a registry for the
    /// counters and registers the counters
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let passes = register_counter_with_registry!(
            "federator_passes",
            "The total number of federator loop passes",
            registry
        )?;

        let events_scanned = register_counter_with_registry!(
            "federator_events_scanned",
            "The total number of transfer events read from origin chains",
            registry
        )?;

        let proposals_submitted = register_counter_with_registry!(
            "federator_proposals_submitted",
            "The total number of proposals submitted to destination chains",
            registry
        )?;

        let proposals_confirmed = register_counter_with_registry!(
            "federator_proposals_confirmed",
            "The total number of proposals found with quorum already reached",
            registry
        )?;

        let proposals_failed = register_counter_with_registry!(
            "federator_proposals_failed",
            "The total number of proposals rejected by destination chains",
            registry
        )?;

        let unconfirmed_retries = register_counter_with_registry!(
            "federator_unconfirmed_retries",
            "How many times a broadcast timed out and was sent again",
            registry
        )?;

        let chain_unavailable = register_counter_with_registry!(
            "federator_chain_unavailable",
            "How many passes were aborted by an unreachable chain",
            registry
        )?;

        let total_amount_of_data_stored = register_gauge_with_registry!(
            "total_amount_of_data_stored",
            "The Total number of data stored",
            registry
        )?;

        let last_processed_block = register_gauge_vec_with_registry!(
            "federator_last_processed_block",
            "The last origin block fully processed by a federator instance",
            &["federator"],
            registry
        )?;

        Ok(Self {
            registry,
            passes,
            events_scanned,
            proposals_submitted,
            proposals_confirmed,
            proposals_failed,
            unconfirmed_retries,
            chain_unavailable,
            total_amount_of_data_stored,
            last_processed_block,
        })
    }

    /// Records the cursor height of the federator instance `name`.
    pub fn set_last_processed_block(&self, name: &str, block: u64) {
        self.last_processed_block
            .with_label_values(&[name])
            .set(block as f64);
    }

    /// Gathers the whole federator metrics
    pub fn gather_metrics(&self) -> Result<String, GatherMetricsError> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatherMetricsError {
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    #[error(transparent)]
    FromUtf8Error(#[from] std::string::FromUtf8Error),
}

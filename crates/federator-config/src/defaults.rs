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

/// The default port the metrics server will listen on. Defaults to 9955.
pub const fn port() -> u16 {
    9955
}
/// Chains are enabled unless configured otherwise.
pub const fn enabled() -> bool {
    true
}
/// Wait for `12` blocks on top of an event before acting on it.
pub const fn block_confirmations() -> u64 {
    12
}
/// Poll the origin chain every `30s`.
pub const fn polling_interval() -> u64 {
    30_000
}
/// The maximum blocks per `eth_getLogs` request is set to `500` by default.
pub const fn max_blocks_per_step() -> u64 {
    500
}
/// The maximum blocks scanned in one pass is set to `5_000` by default.
pub const fn max_blocks_per_pass() -> u64 {
    5_000
}
/// The print progress interval is set to `7_000` by default.
pub const fn print_progress_interval() -> u64 {
    7_000
}
/// Chain reads are retried `5` times before the pass is aborted.
pub const fn max_read_retries() -> usize {
    5
}
/// The first retry of a chain read waits `1s`, doubling afterwards.
pub const fn read_retry_interval() -> u64 {
    1_000
}
/// Wait up to `5min` for a receipt.
pub const fn receipt_timeout() -> u64 {
    300_000
}
/// Poll for the receipt every `1s`.
pub const fn receipt_polling_interval() -> u64 {
    1_000
}
/// Gas limit used when the node fails to estimate one.
pub const fn default_gas_limit() -> u64 {
    6_500_000
}
/// Gas estimates are doubled.
pub const fn gas_limit_multiplier() -> f64 {
    2.0
}
/// The node's gas price is used as is.
pub const fn gas_price_multiplier() -> f64 {
    1.0
}
/// An unconfirmed broadcast is sent again `3` times.
pub const fn max_unconfirmed_retries() -> usize {
    3
}
/// Multisig backends look for an existing wallet transaction among the last `100`.
pub const fn multisig_lookback() -> u64 {
    100
}
/// Instances start `5s` apart.
pub const fn stagger_interval() -> u64 {
    5_000
}

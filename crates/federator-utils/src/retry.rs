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

//! Retry logic for async calls

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

/// Constant with Max Retry Count is a backoff policy which always returns
/// a constant duration, until it exceeds the maximum retry count.
#[derive(Debug, Clone)]
pub struct ConstantWithMaxRetryCount {
    interval: Duration,
    max_retry_count: usize,
    count: usize,
}

impl ConstantWithMaxRetryCount {
    /// Creates a new Constant backoff with `interval` and `max_retry_count`.
    pub fn new(interval: Duration, max_retry_count: usize) -> Self {
        Self {
            interval,
            max_retry_count,
            count: 0,
        }
    }
}

impl Backoff for ConstantWithMaxRetryCount {
    fn next_backoff(&mut self) -> Option<Duration> {
        (self.count < self.max_retry_count).then(|| {
            self.count += 1;
            self.interval
        })
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

/// Exponential backoff that gives up after `max_retry_count` retries.
///
/// Chain reads use this one: the wait doubles from `initial_interval` up to
/// `max_interval`, and after the last retry the caller receives the error.
#[derive(Debug)]
pub struct ExponentialWithMaxRetryCount {
    inner: ExponentialBackoff,
    max_retry_count: usize,
    count: usize,
}

impl ExponentialWithMaxRetryCount {
    pub fn new(
        initial_interval: Duration,
        max_interval: Duration,
        max_retry_count: usize,
    ) -> Self {
        let inner = ExponentialBackoff {
            current_interval: initial_interval,
            initial_interval,
            max_interval,
            multiplier: 2.0,
            randomization_factor: 0.1,
            max_elapsed_time: None,
            ..Default::default()
        };
        Self {
            inner,
            max_retry_count,
            count: 0,
        }
    }
}

impl Backoff for ExponentialWithMaxRetryCount {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.count >= self.max_retry_count {
            return None;
        }
        self.count += 1;
        self.inner.next_backoff()
    }

    fn reset(&mut self) {
        self.count = 0;
        self.inner.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_backoff_stops_after_max_retries() {
        let mut backoff =
            ConstantWithMaxRetryCount::new(Duration::from_millis(10), 2);
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(10)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(10)));
        assert_eq!(backoff.next_backoff(), None);
        backoff.reset();
        assert!(backoff.next_backoff().is_some());
    }

    #[test]
    fn exponential_backoff_grows_and_stops() {
        let mut backoff = ExponentialWithMaxRetryCount::new(
            Duration::from_millis(100),
            Duration::from_secs(10),
            3,
        );
        let first = backoff.next_backoff().unwrap();
        let second = backoff.next_backoff().unwrap();
        assert!(second > first);
        assert!(backoff.next_backoff().is_some());
        assert_eq!(backoff.next_backoff(), None);
    }
}

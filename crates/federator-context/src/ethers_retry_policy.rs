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

use std::time::Duration;

use ethers::providers::{JsonRpcError, ProviderError, RetryPolicy};
use federator_utils::probe;

/// Backoff used when the node does not say how long to wait.
const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

/// Retries the requests a public RPC node throttles: HTTP 429, the rate limit
/// codes of Infura (`-32005`) and Alchemy (`429`, `-32016`), and Infura's
/// load balancer `header not found` error.
#[derive(Debug)]
pub struct FederatorHttpRetryPolicy {
    rate_limited: regex::Regex,
}

impl FederatorHttpRetryPolicy {
    /// Creates the policy.
    pub fn new() -> Self {
        Self {
            rate_limited: regex::Regex::new(
                r"(?i)\b(?:rate|limit|429|too many requests)\b",
            )
            .expect("valid regex"),
        }
    }

    /// Creates the policy, boxed as [`ethers::providers::RetryClient`] wants it.
    pub fn boxed() -> Box<Self> {
        Box::new(Self::new())
    }

    fn is_throttled(&self, error: &JsonRpcError) -> bool {
        match error.code {
            429 | -32005 => true,
            -32016 => error.message.contains("rate limit"),
            _ => {
                error.message == "header not found"
                    || self.rate_limited.is_match(&error.message)
            }
        }
    }

    /// Some nodes answer throttled requests with a body that is not a JSON-RPC
    /// response at all, only the text of one.
    fn is_throttled_body(&self, err: &serde_json::Error) -> bool {
        #[derive(serde::Deserialize)]
        struct Body {
            error: JsonRpcError,
        }
        let text = err.to_string();
        let retry = match serde_json::from_str::<Body>(&text) {
            Ok(body) => self.is_throttled(&body.error),
            Err(_) => {
                self.rate_limited.is_match(&text)
                    || text == "expected value at line 1 column 1"
            }
        };
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Retry,
            should_retry = retry,
            error = %text,
        );
        retry
    }
}

impl Default for FederatorHttpRetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicy<ProviderError> for FederatorHttpRetryPolicy {
    fn should_retry(&self, error: &ProviderError) -> bool {
        match error {
            ProviderError::HTTPError(err) => {
                err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS)
            }
            ProviderError::JsonRpcClientError(err) => {
                if let Some(response) = err.as_error_response() {
                    return self.is_throttled(response);
                }
                err.as_serde_error()
                    .map_or(false, |e| self.is_throttled_body(e))
            }
            ProviderError::SerdeJson(err) => self.is_throttled_body(err),
            _ => false,
        }
    }

    fn backoff_hint(&self, error: &ProviderError) -> Option<Duration> {
        // infura puts the requested backoff in the error data
        let requested = match error {
            ProviderError::JsonRpcClientError(err) => err
                .as_error_response()
                .and_then(|e| e.data.as_ref())
                .and_then(|data| data.get("rate"))
                .and_then(|rate| rate.get("backoff_seconds"))
                .and_then(|seconds| seconds.as_f64()),
            _ => None,
        };
        Some(requested.map_or(DEFAULT_BACKOFF, |seconds| {
            Duration::from_secs(seconds.ceil() as u64)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::HttpClientError;

    fn rpc_error(
        code: i64,
        message: &str,
        data: Option<serde_json::Value>,
    ) -> ProviderError {
        ProviderError::from(HttpClientError::JsonRpcError(JsonRpcError {
            code,
            message: message.into(),
            data,
        }))
    }

    #[test]
    fn throttling_is_retried() {
        let policy = FederatorHttpRetryPolicy::new();
        assert!(policy.should_retry(&rpc_error(-32005, "project limit", None)));
        assert!(policy.should_retry(&rpc_error(-32000, "header not found", None)));
        assert!(policy.should_retry(&rpc_error(
            -32016,
            "your IP exceeded the rate limit",
            None
        )));
    }

    #[test]
    fn reverts_are_not_retried() {
        let policy = FederatorHttpRetryPolicy::new();
        assert!(!policy.should_retry(&rpc_error(3, "execution reverted", None)));
        assert!(!policy.should_retry(&ProviderError::CustomError(
            "nonce too low".into()
        )));
    }

    #[test]
    fn backoff_follows_the_node_hint() {
        let policy = FederatorHttpRetryPolicy::new();
        let data = serde_json::json!({ "rate": { "backoff_seconds": 1.5 } });
        let hinted = rpc_error(-32005, "daily request count exceeded", Some(data));
        assert_eq!(policy.backoff_hint(&hinted), Some(Duration::from_secs(2)));
        let plain = rpc_error(-32005, "daily request count exceeded", None);
        assert_eq!(policy.backoff_hint(&plain), Some(DEFAULT_BACKOFF));
    }
}

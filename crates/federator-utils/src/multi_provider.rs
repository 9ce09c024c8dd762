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

use core::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ethers::providers::{JsonRpcClient, ProviderError, RpcError};
use serde::{de::DeserializeOwned, Serialize};

use crate::Error as FederatorError;

/// A JsonRpcClient over several endpoints of the same chain.
///
/// Requests start on the endpoints in turn. When the chosen endpoint fails at
/// the transport level, the same request moves on to the next endpoint, until
/// every endpoint was tried once. A JSON-RPC error response is returned as is:
/// another node would answer the same.
#[derive(Debug, Clone)]
pub struct MultiProvider<P> {
    providers: Arc<Vec<P>>,
    last_used: Arc<AtomicUsize>,
}

impl<P> MultiProvider<P> {
    pub fn new(providers: Arc<Vec<P>>) -> Self {
        Self {
            providers,
            last_used: Default::default(),
        }
    }

    /// Number of endpoints behind this client.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    fn next_start(&self) -> usize {
        self.last_used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last_used| {
                Some(last_used.wrapping_add(1) % self.providers.len())
            })
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl<P: JsonRpcClient> JsonRpcClient for MultiProvider<P>
where
    P::Error: Into<ProviderError>,
{
    type Error = ProviderError;

    async fn request<
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    >(
        &self,
        method: &str,
        params: T,
    ) -> Result<R, Self::Error> {
        let count = self.providers.len();
        if count == 0 {
            return Err(ProviderError::CustomError(
                FederatorError::ProviderNotFound(0).to_string(),
            ));
        }
        let params = serde_json::to_value(params)?;
        let start = self.next_start();
        let mut last_error = None;
        for attempt in 0..count {
            let idx = (start + attempt) % count;
            let Some(provider) = self.providers.get(idx) else {
                return Err(ProviderError::CustomError(
                    FederatorError::ProviderNotFound(idx).to_string(),
                ));
            };
            match provider.request(method, params.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let e: ProviderError = e.into();
                    if e.as_error_response().is_some() {
                        return Err(e);
                    }
                    if attempt + 1 < count {
                        tracing::warn!(
                            endpoint = idx,
                            %method,
                            error = %e,
                            "endpoint failed, trying the next one",
                        );
                    }
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            ProviderError::CustomError(
                FederatorError::ProviderNotFound(start).to_string(),
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::{Http, MockError, MockProvider};
    use ethers::types::U64;
    use std::str::FromStr;

    #[test]
    fn should_hold_every_endpoint() {
        let p1 = Http::from_str("http://127.0.0.1:4444").unwrap();
        let p2 = Http::from_str("http://127.0.0.1:4445").unwrap();

        let multi_provider = MultiProvider::new(vec![p1, p2].into());
        assert_eq!(multi_provider.len(), 2);
        assert_eq!(multi_provider.next_start(), 0);
        assert_eq!(multi_provider.next_start(), 1);
        assert_eq!(multi_provider.next_start(), 0);
    }

    #[tokio::test]
    async fn empty_provider_list_is_an_error() {
        let multi_provider = MultiProvider::<Http>::new(Arc::new(vec![]));
        let result: Result<u64, _> =
            multi_provider.request("eth_blockNumber", ()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn fails_over_to_the_next_endpoint() {
        // an empty mock fails every request without a JSON-RPC response.
        let broken = MockProvider::new();
        let healthy = MockProvider::new();
        healthy.push::<U64, _>(U64::from(42)).unwrap();
        let multi_provider =
            MultiProvider::new(Arc::new(vec![broken, healthy]));
        let block: U64 =
            multi_provider.request("eth_blockNumber", ()).await.unwrap();
        assert_eq!(block, U64::from(42));
    }

    #[test]
    fn empty_mock_is_a_transport_error() {
        let e: ProviderError = MockError::EmptyResponses.into();
        assert!(e.as_error_response().is_none());
    }
}

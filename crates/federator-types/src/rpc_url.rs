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

use serde::{Deserialize, Serialize};

/// An RPC URL Wrapper around [`url::Url`] to support the `serde` deserialization
/// from environment variables.
#[derive(Clone)]
pub struct RpcUrl(url::Url);

impl RpcUrl {
    /// Returns the inner [`url::Url`].
    pub fn as_url(&self) -> &url::Url {
        &self.0
    }
}

impl std::fmt::Display for RpcUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // endpoints often carry an api key in the path or query, so only the
        // origin is shown.
        write!(f, "{}", self.0.scheme())?;
        if let Some(host) = self.0.host_str() {
            write!(f, "://{host}")?;
        }
        if let Some(port) = self.0.port_or_known_default() {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for RpcUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

/// Serializes to the redacted form, the full url never reaches the logs.
impl Serialize for RpcUrl {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<RpcUrl> for url::Url {
    fn from(rpc_url: RpcUrl) -> Self {
        rpc_url.0
    }
}

impl From<url::Url> for RpcUrl {
    fn from(url: url::Url) -> Self {
        RpcUrl(url)
    }
}

impl std::ops::Deref for RpcUrl {
    type Target = url::Url;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for RpcUrl {
    /// Accepts a url, or `$VAR` naming an environment variable that holds one.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let value = String::deserialize(deserializer)?;
        let raw = crate::env::expand::<D::Error>(&value)?;
        let url = url::Url::parse(raw.trim()).map_err(|e| {
            // the url itself is left out, it may carry an api key.
            D::Error::custom(format!("invalid rpc url: {e}"))
        })?;
        Ok(Self(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_hides_path_and_query() {
        let url: RpcUrl = serde_json::from_value(serde_json::json!(
            "https://rsk.example.org/v1/secret-api-key?token=abc"
        ))
        .unwrap();
        assert_eq!(url.to_string(), "https://rsk.example.org:443");
        assert_eq!(url.as_url().path(), "/v1/secret-api-key");
    }

    #[test]
    fn reads_url_from_env() {
        std::env::set_var("FEDERATOR_TEST_RPC_URL", "http://10.0.0.7:8545");
        let url: RpcUrl = serde_json::from_value(serde_json::json!(
            "$FEDERATOR_TEST_RPC_URL"
        ))
        .unwrap();
        assert_eq!(url.as_url().host_str(), Some("10.0.0.7"));
    }
}

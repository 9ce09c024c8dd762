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

use std::fmt;

use ethers::types::H256;
use url::Url;

/// A transaction hash that renders as a terminal hyperlink to the block explorer
/// when one is configured for the chain, and as the bare hash otherwise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxLink {
    hash: String,
    url: Option<Url>,
}

impl TxLink {
    /// Builds the link of `tx_hash` under `explorer`'s `tx/` path.
    pub fn new(explorer: Option<&Url>, tx_hash: H256) -> Self {
        let hash = format!("0x{tx_hash:x}");
        let url = explorer.cloned().map(|mut url| {
            url.set_path(&format!("tx/{hash}"));
            url
        });
        Self { hash, url }
    }
}

impl fmt::Display for TxLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.url {
            Some(url) => write!(
                f,
                "\u{1b}]8;;{}\u{1b}\\{}\u{1b}]8;;\u{1b}\\",
                url, self.hash
            ),
            None => f.write_str(&self.hash),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_hash_without_explorer() {
        let link = TxLink::new(None, H256::repeat_byte(0xab));
        assert_eq!(link.to_string(), format!("0x{}", "ab".repeat(32)));
    }

    #[test]
    fn hyperlink_points_at_the_tx_page() {
        let explorer = Url::parse("https://explorer.rsk.co").unwrap();
        let link = TxLink::new(Some(&explorer), H256::repeat_byte(1));
        let rendered = link.to_string();
        assert!(rendered.contains("https://explorer.rsk.co/tx/0x0101"));
        assert!(rendered.starts_with("\u{1b}]8;;"));
    }
}

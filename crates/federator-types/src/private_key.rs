use std::str::FromStr;

use ethereum_types::Secret;
use serde::Deserialize;

use crate::env::expand;

/// PrivateKey represents the signing key of one federator instance.
///
/// The key is kept in memory only; its `Debug` output never contains the secret.
#[derive(Clone)]
pub struct PrivateKey(Secret);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey").finish()
    }
}

impl From<Secret> for PrivateKey {
    fn from(secret: Secret) -> Self {
        PrivateKey(secret)
    }
}

impl std::ops::Deref for PrivateKey {
    type Target = Secret;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    /// Accepts a `0x` prefixed hex string, or `$VAR` naming an environment
    /// variable that holds one.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let value = String::deserialize(deserializer)?;
        if !value.starts_with("0x") && !value.starts_with('$') {
            return Err(D::Error::custom(
                "private key must be a 0x prefixed hex string or a $ENV_VAR",
            ));
        }
        let hex = expand::<D::Error>(&value)?;
        let hex = hex.trim();
        // the parse error is left out, it may quote the key.
        Secret::from_str(hex).map(PrivateKey).map_err(|_| {
            D::Error::custom(format!(
                "invalid private key: expected 66 chars (including the 0x prefix) but found {}",
                hex.len()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str =
        "0x8f2a55949038a9610f50fb23b5883af3b4ecb3c3bb792cbcefbd1542c692be63";

    #[test]
    fn debug_never_prints_the_secret() {
        let key: PrivateKey =
            serde_json::from_value(serde_json::json!(KEY)).unwrap();
        let printed = format!("{key:?}");
        assert_eq!(printed, "PrivateKey");
        assert!(!printed.contains("8f2a"));
    }

    #[test]
    fn reads_key_from_env() {
        std::env::set_var("FEDERATOR_TEST_PRIVATE_KEY", KEY);
        let key: PrivateKey = serde_json::from_value(serde_json::json!(
            "$FEDERATOR_TEST_PRIVATE_KEY"
        ))
        .unwrap();
        assert_eq!(key.as_bytes()[0], 0x8f);
    }

    #[test]
    fn rejects_bare_strings() {
        let result: Result<PrivateKey, _> =
            serde_json::from_value(serde_json::json!("not a key"));
        assert!(result.is_err());
    }

    #[test]
    fn error_does_not_quote_a_short_key() {
        let err = serde_json::from_value::<PrivateKey>(serde_json::json!(
            "0x8f2a5594"
        ))
        .unwrap_err();
        assert!(!err.to_string().contains("8f2a5594"), "{err}");
    }
}

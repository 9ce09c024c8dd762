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

//! Config values that may name an environment variable instead of holding the
//! value itself.

use std::borrow::Cow;

/// Returns `value`, or the content of the environment variable it names when
/// it starts with `$`.
pub(crate) fn expand<E: serde::de::Error>(
    value: &str,
) -> Result<Cow<'_, str>, E> {
    match value.strip_prefix('$') {
        Some(var) => {
            tracing::trace!("Reading {} from env", var);
            std::env::var(var).map(Cow::Owned).map_err(|e| {
                E::custom(format!("error while loading this env {var}: {e}"))
            })
        }
        None => Ok(Cow::Borrowed(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Error = serde::de::value::Error;

    #[test]
    fn literal_values_are_borrowed() {
        let value = expand::<Error>("http://localhost:4444").unwrap();
        assert!(matches!(value, Cow::Borrowed("http://localhost:4444")));
    }

    #[test]
    fn missing_variable_names_it() {
        let err =
            expand::<Error>("$FEDERATOR_TEST_UNSET_VARIABLE").unwrap_err();
        assert!(err.to_string().contains("FEDERATOR_TEST_UNSET_VARIABLE"));
    }
}

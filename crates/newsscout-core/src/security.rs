//! Provider credentials. Keys are read from the environment variables named
//! in the config and never appear in `Debug` output or provider error text.

use std::env;

use crate::ScoutError;
use crate::config::Config;

const REDACTED: &str = "***redacted***";

/// An API key that only leaves this type through [`SecretValue::expose`].
#[derive(Clone)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Replace every occurrence of the key in `text`, e.g. a provider error
    /// body that echoes the request headers.
    pub fn scrub(&self, text: &str) -> String {
        if self.0.is_empty() {
            return text.to_string();
        }
        text.replace(&self.0, REDACTED)
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(REDACTED)
    }
}

/// Require that a given environment variable is set and non-empty.
pub fn require_env(var: &str) -> Result<SecretValue, ScoutError> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(SecretValue(value.trim().to_string())),
        _ => Err(ScoutError::MissingSecret(var.to_string())),
    }
}

/// Keys for the search provider and the chat model.
#[derive(Debug, Clone)]
pub struct ProviderKeys {
    pub exa: SecretValue,
    pub llm: SecretValue,
}

impl ProviderKeys {
    /// Read both keys, naming every missing variable in one error.
    pub fn from_env(config: &Config) -> Result<Self, ScoutError> {
        let exa = require_env(&config.exa.api_key_env);
        let llm = require_env(&config.llm.api_key_env);
        match (exa, llm) {
            (Ok(exa), Ok(llm)) => Ok(Self { exa, llm }),
            (exa, llm) => {
                let missing: Vec<String> = [exa.err(), llm.err()]
                    .into_iter()
                    .flatten()
                    .filter_map(|err| match err {
                        ScoutError::MissingSecret(var) => Some(var),
                        _ => None,
                    })
                    .collect();
                Err(ScoutError::MissingSecret(missing.join(", ")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_env_missing() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::remove_var("NEWSSCOUT_TEST_SECRET_MISSING") };
        let err = require_env("NEWSSCOUT_TEST_SECRET_MISSING").unwrap_err();
        assert!(matches!(err, ScoutError::MissingSecret(_)));
    }

    #[test]
    fn require_env_rejects_blank_values() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("NEWSSCOUT_TEST_SECRET_BLANK", "   ") };
        assert!(require_env("NEWSSCOUT_TEST_SECRET_BLANK").is_err());
    }

    #[test]
    fn debug_output_and_error_text_are_redacted() {
        let secret = SecretValue::new("sk-live-value");
        assert_eq!(format!("{secret:?}"), "***redacted***");
        assert_eq!(secret.expose(), "sk-live-value");
        assert_eq!(
            secret.scrub("invalid key sk-live-value for x-api-key"),
            "invalid key ***redacted*** for x-api-key"
        );
    }

    #[test]
    fn provider_keys_report_every_missing_variable() {
        let mut config = Config::default();
        config.exa.api_key_env = "NEWSSCOUT_TEST_EXA_KEY_UNSET".into();
        config.llm.api_key_env = "NEWSSCOUT_TEST_LLM_KEY_UNSET".into();
        // SAFETY: the variable names are unique to this test.
        unsafe {
            std::env::remove_var("NEWSSCOUT_TEST_EXA_KEY_UNSET");
            std::env::remove_var("NEWSSCOUT_TEST_LLM_KEY_UNSET");
        }

        let err = ProviderKeys::from_env(&config).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("NEWSSCOUT_TEST_EXA_KEY_UNSET"));
        assert!(message.contains("NEWSSCOUT_TEST_LLM_KEY_UNSET"));
    }
}

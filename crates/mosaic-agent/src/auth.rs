//! API key lookup

use mosaic_core::{MosaicError, Result};
use std::env;

const FALLBACK_ENV: &str = "ANTHROPIC_API_KEY";

/// Read the API key from the configured environment variable
///
/// Falls back to `ANTHROPIC_API_KEY` when a different variable is configured
/// but unset. Empty values count as unset.
pub fn api_key(env_var: &str) -> Result<String> {
    let lookup = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());

    if let Some(key) = lookup(env_var) {
        tracing::debug!(env_var, "Using API key");
        return Ok(key);
    }
    if env_var != FALLBACK_ENV {
        if let Some(key) = lookup(FALLBACK_ENV) {
            tracing::debug!(env_var = FALLBACK_ENV, "Using fallback API key");
            return Ok(key);
        }
    }

    Err(MosaicError::Auth(format!(
        "No API key found. Set {} (or configure models.api_key_env in .mosaic/config.toml)",
        env_var
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serializes env var mutation across tests
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = ENV_LOCK.lock().unwrap();
        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        for (key, value) in vars {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        let result = f();

        for (key, original) in originals {
            match original {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
        result
    }

    #[test]
    fn test_configured_var_wins() {
        with_env_vars(
            &[
                ("MOSAIC_TEST_KEY", Some("configured")),
                ("ANTHROPIC_API_KEY", Some("fallback")),
            ],
            || assert_eq!(api_key("MOSAIC_TEST_KEY").unwrap(), "configured"),
        );
    }

    #[test]
    fn test_falls_back_to_anthropic_key() {
        with_env_vars(
            &[
                ("MOSAIC_TEST_KEY", Some("  ")),
                ("ANTHROPIC_API_KEY", Some("fallback")),
            ],
            || assert_eq!(api_key("MOSAIC_TEST_KEY").unwrap(), "fallback"),
        );
    }

    #[test]
    fn test_missing_key_is_auth_error() {
        with_env_vars(
            &[("MOSAIC_TEST_KEY", None), ("ANTHROPIC_API_KEY", None)],
            || {
                assert!(matches!(
                    api_key("MOSAIC_TEST_KEY"),
                    Err(MosaicError::Auth(_))
                ))
            },
        );
    }
}

//! Shared utility functions for provider adapters.

use candor_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeouts and connection faults map to the transient taxonomy so the
/// caller's retry policy applies; everything else is internal.
pub(crate) fn from_reqwest(provider: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("{provider}: {e}"))
    } else if e.is_connect() || e.is_request() {
        Error::ProviderTransient {
            provider: provider.to_string(),
            message: e.to_string(),
        }
    } else {
        Error::Internal(format!("{provider}: {e}"))
    }
}

/// Fold an HTTP status into the transient/permanent taxonomy.
///
/// 401/403/402/429 are permanent (credentials or quota); 5xx is
/// transient; anything else unexpected is internal.
pub(crate) fn from_status(provider: &str, status: u16, body: &str) -> Error {
    match status {
        401 | 402 | 403 | 429 => Error::ProviderPermanent {
            provider: provider.to_string(),
            message: format!("HTTP {status}: {body}"),
        },
        500..=599 => Error::ProviderTransient {
            provider: provider.to_string(),
            message: format!("HTTP {status}: {body}"),
        },
        _ => Error::Internal(format!("{provider}: unexpected HTTP {status}: {body}")),
    }
}

/// Read the provider API key from the configured environment variable.
pub fn resolve_api_key(env_var: &str) -> Result<String> {
    std::env::var(env_var).map_err(|_| {
        Error::Auth(format!(
            "environment variable '{env_var}' not set or not valid UTF-8"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_api_key_env_var() {
        let var_name = "CANDOR_TEST_RESOLVE_ENV_KEY_1234";
        std::env::set_var(var_name, "env-secret-value");
        assert_eq!(resolve_api_key(var_name).unwrap(), "env-secret-value");
        std::env::remove_var(var_name);
    }

    #[test]
    fn resolve_api_key_missing() {
        let err = resolve_api_key("CANDOR_TEST_NONEXISTENT_VAR_8888").unwrap_err();
        assert!(err.to_string().contains("CANDOR_TEST_NONEXISTENT_VAR_8888"));
    }

    #[test]
    fn status_taxonomy() {
        assert!(matches!(
            from_status("llm", 503, ""),
            Error::ProviderTransient { .. }
        ));
        assert!(matches!(
            from_status("llm", 401, ""),
            Error::ProviderPermanent { .. }
        ));
        assert!(matches!(from_status("llm", 418, ""), Error::Internal(_)));
    }
}

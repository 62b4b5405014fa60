//! Classification of provider failures.
//!
//! Providers report failures as strings (`"Gemini API HTTP 403: ..."`,
//! `"request failed: ..."`). The gateway only needs to know whether the
//! credential was rejected; every other failure is transient from the
//! user's point of view.

/// Coarse failure class of a provider error string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The provider rejected the key (authentication or permission).
    Credential,
    /// Network, quota, malformed response, provider fault, timeout.
    Transient,
}

/// Markers the Generative Language API uses for rejected keys. A bad key
/// comes back as HTTP 400 with `API_KEY_INVALID` in the body, so the status
/// code alone is not enough.
const CREDENTIAL_MARKERS: &[&str] = &[
    "HTTP 401",
    "HTTP 403",
    "PERMISSION_DENIED",
    "UNAUTHENTICATED",
    "API_KEY_INVALID",
    "API key not valid",
];

/// Classify a provider error string.
pub fn classify(error: &str) -> FailureClass {
    if is_credential_error(error) {
        FailureClass::Credential
    } else {
        FailureClass::Transient
    }
}

/// Whether an error string indicates the credential was rejected.
pub fn is_credential_error(error: &str) -> bool {
    CREDENTIAL_MARKERS.iter().any(|m| error.contains(m))
}

/// Whether an error string came from the network layer rather than from
/// an HTTP response.
pub fn is_network_error(error: &str) -> bool {
    let lower = error.to_lowercase();
    [
        "request failed:",
        "connection reset",
        "connection refused",
        "timed out",
        "timeout",
        "broken pipe",
        "network",
    ]
    .iter()
    .any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_errors_detected() {
        assert_eq!(
            classify("Gemini API HTTP 403 Forbidden: {\"error\":{\"status\":\"PERMISSION_DENIED\"}}"),
            FailureClass::Credential
        );
        assert_eq!(
            classify("Gemini API HTTP 401 Unauthorized: {}"),
            FailureClass::Credential
        );
        assert_eq!(
            classify(
                "Gemini API HTTP 400 Bad Request: {\"error\":{\"message\":\"API key not valid. Please pass a valid API key.\",\"details\":[{\"reason\":\"API_KEY_INVALID\"}]}}"
            ),
            FailureClass::Credential
        );
    }

    #[test]
    fn other_errors_are_transient() {
        assert_eq!(
            classify("Gemini API HTTP 429 Too Many Requests: quota"),
            FailureClass::Transient
        );
        assert_eq!(
            classify("Gemini API HTTP 500 Internal Server Error: oops"),
            FailureClass::Transient
        );
        assert_eq!(
            classify("failed to parse response: expected value"),
            FailureClass::Transient
        );
        assert_eq!(classify("request failed: timed out"), FailureClass::Transient);
    }

    #[test]
    fn network_errors_detected() {
        assert!(is_network_error("request failed: connection refused"));
        assert!(is_network_error("model call timed out after 30s"));
        assert!(!is_network_error("Gemini API HTTP 500 Internal Server Error: oops"));
    }
}

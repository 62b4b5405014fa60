//! Configuration for the [`Tutor`](crate::tutor::Tutor).
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! yields a working Spanish-language tutor reading `derivadas.json`.
//!
//! ```ignore
//! let config = TutorConfig::from_file("tutor.json")?
//!     .with_model("gemini-2.0-flash")
//!     .with_credential_source(CredentialSource::preconfigured());
//! ```
//!
//! A config file looks like:
//!
//! ```json
//! {
//!   "catalog_path": "data/derivatives.json",
//!   "field_mapping": { "id": "id", "function": "function", "target": "derivative", "conclusion": "conclusion" },
//!   "credential_source": { "mode": "preconfigured", "env_var": "GEMINI_API_KEY" },
//!   "policy_path": "policy.en.json"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::FieldMapping;
use crate::prompt::PolicyDocument;
use crate::{Credential, DEFAULT_MODEL, DEFAULT_REQUEST_TIMEOUT, GEMINI_API_BASE};

/// Environment variable read in the preconfigured mode unless overridden.
pub const DEFAULT_CREDENTIAL_ENV: &str = "GEMINI_API_KEY";

fn default_env_var() -> String {
    DEFAULT_CREDENTIAL_ENV.to_string()
}

// ── Credential source ──────────────────────────────────────────────

/// Where the provider credential comes from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CredentialSource {
    /// Each session supplies and validates its own key.
    #[default]
    Interactive,
    /// One key for the whole process, read from the environment at startup.
    Preconfigured {
        #[serde(default = "default_env_var")]
        env_var: String,
    },
}

impl CredentialSource {
    /// Preconfigured from [`DEFAULT_CREDENTIAL_ENV`].
    pub fn preconfigured() -> Self {
        Self::Preconfigured {
            env_var: default_env_var(),
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Interactive)
    }

    /// Read the preconfigured key from the process environment.
    pub fn resolve(&self) -> Result<Option<Credential>, String> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Like [`resolve`](Self::resolve) with an explicit variable lookup.
    ///
    /// `Ok(None)` in the interactive mode. A missing or blank variable in
    /// the preconfigured mode is an error.
    pub fn resolve_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Credential>, String> {
        match self {
            Self::Interactive => Ok(None),
            Self::Preconfigured { env_var } => {
                let credential = lookup(env_var)
                    .map(Credential::new)
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| format!("{env_var} is not set"))?;
                Ok(Some(credential))
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Preconfigured { .. } => "preconfigured",
        }
    }
}

// ── Tutor config ───────────────────────────────────────────────────

/// Top-level tutor configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TutorConfig {
    /// Exercise data file. Default: `derivadas.json`.
    pub catalog_path: PathBuf,
    /// JSON keys of the catalog records. Default: the Spanish preset.
    pub field_mapping: FieldMapping,
    pub credential_source: CredentialSource,
    /// Hosted model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,
    /// Provider base URL. Default: [`GEMINI_API_BASE`].
    pub api_base: String,
    /// Upper bound on one model call, in seconds. Default: 30.
    pub request_timeout_secs: u64,
    /// Built-in instruction document, used when `policy_path` is unset.
    pub policy: PolicyDocument,
    /// JSON [`PolicyDocument`] that replaces `policy` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_path: Option<PathBuf>,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("derivadas.json"),
            field_mapping: FieldMapping::default(),
            credential_source: CredentialSource::default(),
            model: DEFAULT_MODEL.to_string(),
            api_base: GEMINI_API_BASE.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            policy: PolicyDocument::default(),
            policy_path: None,
        }
    }
}

impl TutorConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config '{}': {e}", path.display()))?;
        serde_json::from_str(&text)
            .map_err(|e| format!("failed to parse config '{}': {e}", path.display()))
    }

    pub fn with_catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = path.into();
        self
    }

    pub fn with_field_mapping(mut self, mapping: FieldMapping) -> Self {
        self.field_mapping = mapping;
        self
    }

    pub fn with_credential_source(mut self, source: CredentialSource) -> Self {
        self.credential_source = source;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_policy(mut self, policy: PolicyDocument) -> Self {
        self.policy = policy;
        self.policy_path = None;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// The instruction document in effect: the file at `policy_path` if
    /// set, otherwise the inline `policy`.
    pub fn resolve_policy(&self) -> Result<PolicyDocument, String> {
        match &self.policy_path {
            Some(path) => PolicyDocument::from_file(path),
            None => Ok(self.policy.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config: TutorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, TutorConfig::default());
        assert_eq!(config.catalog_path, PathBuf::from("derivadas.json"));
        assert_eq!(config.model, "gemma-3-27b-it");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.credential_source.is_interactive());
        assert_eq!(config.field_mapping, FieldMapping::spanish());
    }

    #[test]
    fn preconfigured_source_parses_with_default_env_var() {
        let config: TutorConfig =
            serde_json::from_str(r#"{"credential_source": {"mode": "preconfigured"}}"#).unwrap();
        assert_eq!(config.credential_source, CredentialSource::preconfigured());

        let custom: CredentialSource =
            serde_json::from_str(r#"{"mode": "preconfigured", "env_var": "TUTOR_KEY"}"#).unwrap();
        assert_eq!(
            custom,
            CredentialSource::Preconfigured {
                env_var: "TUTOR_KEY".into()
            }
        );
    }

    #[test]
    fn resolve_reads_configured_variable() {
        let source = CredentialSource::Preconfigured {
            env_var: "TUTOR_KEY".into(),
        };
        let credential = source
            .resolve_with(|name| (name == "TUTOR_KEY").then(|| " secret ".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(credential.expose(), "secret");
    }

    #[test]
    fn resolve_rejects_missing_or_blank_key() {
        let source = CredentialSource::preconfigured();
        let err = source.resolve_with(|_| None).unwrap_err();
        assert!(err.contains("GEMINI_API_KEY"));
        assert!(source.resolve_with(|_| Some("   ".into())).is_err());
    }

    #[test]
    fn interactive_resolves_to_none() {
        assert_eq!(
            CredentialSource::Interactive
                .resolve_with(|_| Some("ignored".into()))
                .unwrap(),
            None
        );
    }

    #[test]
    fn policy_path_overrides_inline_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        let english = PolicyDocument::english();
        std::fs::write(&path, serde_json::to_string(&english).unwrap()).unwrap();

        let config = TutorConfig {
            policy_path: Some(path),
            ..TutorConfig::default()
        };
        assert_eq!(config.resolve_policy().unwrap(), english);
        assert_eq!(
            TutorConfig::default().resolve_policy().unwrap(),
            PolicyDocument::spanish()
        );
    }

    #[test]
    fn from_file_reports_path_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tutor.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = TutorConfig::from_file(&path).unwrap_err();
        assert!(err.contains("tutor.json"));
    }

    #[test]
    fn builders_override_fields() {
        let config = TutorConfig::default()
            .with_catalog_path("data.json")
            .with_model("gemini-2.0-flash")
            .with_field_mapping(FieldMapping::english())
            .with_request_timeout(Duration::from_secs(5));
        assert_eq!(config.catalog_path, PathBuf::from("data.json"));
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.field_mapping.target, "derivative");
        assert_eq!(config.request_timeout_secs, 5);
    }
}

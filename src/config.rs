use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_WORKFLOW_URL: &str =
    "http://127.0.0.1:7860/api/v1/run/88f676c8-7484-438a-807a-e9aa15ca0b2c?stream=false";
pub const DEFAULT_WORKFLOW_FILE_SLOT: &str = "TextInput-MOtin";
pub const DEFAULT_GATEWAY_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Which external call answers an analysis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisBackend {
    /// Image sent inline (base64) to `generateContent`.
    Inline,
    /// Image uploaded to the Files API, then a workflow engine is invoked with its URI.
    Workflow,
}

impl AnalysisBackend {
    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "inline" | "gemini" | "direct" => Some(AnalysisBackend::Inline),
            "workflow" | "langflow" | "upload" => Some(AnalysisBackend::Workflow),
            _ => None,
        }
    }
}

impl std::fmt::Display for AnalysisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AnalysisBackend::Inline => "inline",
            AnalysisBackend::Workflow => "workflow",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Missing key is not fatal at startup; every analysis request fails fast instead.
    pub api_key: Option<String>,
    pub backend: AnalysisBackend,
    pub gemini_api_base: String,
    pub gemini_model: String,
    pub workflow_url: String,
    pub workflow_file_slot: String,
    pub upstream_timeout: Duration,
    pub max_upload_bytes: usize,
    pub bind_addr: String,
    pub scratch_dir: PathBuf,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = match get("ANALYSIS_BACKEND") {
            Some(raw) => AnalysisBackend::from_string(&raw)
                .with_context(|| format!("Unknown ANALYSIS_BACKEND '{}'", raw))?,
            None => AnalysisBackend::Inline,
        };

        let upstream_timeout_secs = match get("UPSTREAM_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("UPSTREAM_TIMEOUT_SECS must be a number, got '{}'", raw))?,
            None => DEFAULT_UPSTREAM_TIMEOUT_SECS,
        };
        if upstream_timeout_secs == 0 {
            anyhow::bail!("UPSTREAM_TIMEOUT_SECS must be greater than zero");
        }

        let max_upload_bytes = match get("MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("MAX_UPLOAD_BYTES must be a number, got '{}'", raw))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            api_key: get("GOOGLE_AI_API_KEY").map(|k| k.trim().to_string()),
            backend,
            gemini_api_base: get("GEMINI_API_BASE")
                .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            workflow_url: get("WORKFLOW_URL").unwrap_or_else(|| DEFAULT_WORKFLOW_URL.to_string()),
            workflow_file_slot: get("WORKFLOW_FILE_SLOT")
                .unwrap_or_else(|| DEFAULT_WORKFLOW_FILE_SLOT.to_string()),
            upstream_timeout: Duration::from_secs(upstream_timeout_secs),
            max_upload_bytes,
            bind_addr: get("GATEWAY_ADDR").unwrap_or_else(|| DEFAULT_GATEWAY_ADDR.to_string()),
            scratch_dir: get("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_credential() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();

        assert!(config.api_key.is_none());
        assert_eq!(config.backend, AnalysisBackend::Inline);
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.workflow_file_slot, "TextInput-MOtin");
        assert_eq!(config.upstream_timeout, Duration::from_secs(60));
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_blank_credential_counts_as_missing() {
        let config = GatewayConfig::from_lookup(lookup(&[("GOOGLE_AI_API_KEY", "   ")])).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_workflow_backend_and_overrides() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("GOOGLE_AI_API_KEY", "key-123"),
            ("ANALYSIS_BACKEND", "Workflow"),
            ("GEMINI_API_BASE", "http://localhost:9999/"),
            ("UPSTREAM_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.api_key.as_deref(), Some("key-123"));
        assert_eq!(config.backend, AnalysisBackend::Workflow);
        assert_eq!(config.gemini_api_base, "http://localhost:9999");
        assert_eq!(config.upstream_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(GatewayConfig::from_lookup(lookup(&[("ANALYSIS_BACKEND", "carrier-pigeon")])).is_err());
        assert!(GatewayConfig::from_lookup(lookup(&[("UPSTREAM_TIMEOUT_SECS", "soon")])).is_err());
        assert!(GatewayConfig::from_lookup(lookup(&[("UPSTREAM_TIMEOUT_SECS", "0")])).is_err());
        assert!(GatewayConfig::from_lookup(lookup(&[("MAX_UPLOAD_BYTES", "-1")])).is_err());
    }
}

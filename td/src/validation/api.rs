//! API Validator
//!
//! If the project ships an OpenAPI (or equivalent) manifest, probes a small,
//! representative set of endpoints — a health check plus one GET per
//! resource — and reports how many responses fell outside 2xx.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{ProjectCapabilities, Validator, ValidatorContext, ValidatorResult};

/// Minimal manifest shape this validator needs: a base URL and a list of
/// probe routes. The real OpenAPI document is produced out of scope; this
/// struct is the distilled probe list derived from it.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiManifest {
    pub base_url: String,
    #[serde(default)]
    pub health_path: Option<String>,
    #[serde(default)]
    pub resource_paths: Vec<String>,
}

impl ApiManifest {
    fn load(path: &std::path::Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

pub struct ApiValidator {
    manifest_relative_path: PathBuf,
}

impl ApiValidator {
    pub const NAME: &'static str = "api";

    pub fn new() -> Self {
        Self {
            manifest_relative_path: PathBuf::from(".auto-claude/api_manifest.json"),
        }
    }
}

impl Default for ApiValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Validator for ApiValidator {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn selectable(&self, capabilities: &ProjectCapabilities) -> bool {
        capabilities.has_api
    }

    async fn run(&self, context: &ValidatorContext) -> ValidatorResult {
        let manifest_path = context.worktree_path.join(&self.manifest_relative_path);
        let manifest = match ApiManifest::load(&manifest_path) {
            Ok(manifest) => manifest,
            Err(e) => {
                debug!(?manifest_path, error = %e, "ApiValidator::run: no manifest found");
                return ValidatorResult::skipped(Self::NAME, format!("no API manifest at {}: {}", manifest_path.display(), e));
            }
        };

        let client = match reqwest::Client::builder().timeout(std::time::Duration::from_secs(10)).build() {
            Ok(client) => client,
            Err(e) => return ValidatorResult::skipped(Self::NAME, format!("failed to build HTTP client: {}", e)),
        };

        let mut routes: Vec<String> = Vec::new();
        if let Some(health) = &manifest.health_path {
            routes.push(health.clone());
        }
        routes.extend(manifest.resource_paths.iter().cloned());

        if routes.is_empty() {
            return ValidatorResult::skipped(Self::NAME, "manifest names no probe routes");
        }

        let mut failures = Vec::new();
        for route in &routes {
            let url = format!("{}{}", manifest.base_url.trim_end_matches('/'), route);
            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => failures.push(json!({ "route": route, "status": response.status().as_u16() })),
                Err(e) => failures.push(json!({ "route": route, "error": e.to_string() })),
            }
        }

        if failures.is_empty() {
            ValidatorResult::pass(Self::NAME, format!("{} route(s) returned 2xx", routes.len()))
        } else {
            ValidatorResult::fail(Self::NAME, format!("{}/{} routes failed", failures.len(), routes.len()))
                .with_details(json!({ "failures": failures }))
        }
    }
}

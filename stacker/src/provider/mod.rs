//! Provisioning backend capability.
//!
//! The orchestrator never talks to infrastructure directly. A [`Provider`]
//! describes, creates, updates and destroys stacks by fully qualified name
//! and reports their outputs. The crate ships a file-backed
//! [`LocalProvider`] and an in-memory fake in [`crate::testing`].

mod diff;
mod local;

pub use diff::{Change, ChangeKind, ChangeScope, StackDiff};
pub use local::LocalProvider;

use crate::errors::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// How an update may touch existing resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStrategy {
    /// The provider chooses.
    #[default]
    Default,
    /// Modified resources are replaced rather than patched in place.
    /// Brand-new resources are simply added.
    ReplacementsOnly,
}

/// The current state of a stack as the provider sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteStack {
    /// Fully qualified name.
    pub fqn: String,
    /// The applied template.
    pub template: serde_json::Value,
    /// The applied parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Published outputs.
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
    /// Applied tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// SHA-256 of the applied template.
    #[serde(default)]
    pub fingerprint: String,
}

impl RemoteStack {
    /// Materialises a request as applied state.
    #[must_use]
    pub fn from_request(request: &StackRequest) -> Self {
        Self {
            fqn: request.fqn.clone(),
            template: request.template.clone(),
            parameters: request.parameters.clone(),
            outputs: derive_outputs(&request.template, &request.parameters),
            tags: request.tags.clone(),
            fingerprint: request.fingerprint.clone(),
        }
    }

    /// Returns the outputs as a lookup table.
    #[must_use]
    pub fn output_map(&self) -> HashMap<String, serde_json::Value> {
        self.outputs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// The desired state of a stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackRequest {
    /// Fully qualified name.
    pub fqn: String,
    /// The rendered template.
    pub template: serde_json::Value,
    /// Normalised parameters.
    pub parameters: BTreeMap<String, String>,
    /// Tags from the configuration.
    pub tags: BTreeMap<String, String>,
    /// SHA-256 of the template.
    pub fingerprint: String,
}

impl StackRequest {
    /// Creates a request, fingerprinting the template.
    #[must_use]
    pub fn new(
        fqn: impl Into<String>,
        template: serde_json::Value,
        parameters: BTreeMap<String, String>,
        tags: BTreeMap<String, String>,
    ) -> Self {
        let fingerprint = fingerprint(&template);
        Self {
            fqn: fqn.into(),
            template,
            parameters,
            tags,
            fingerprint,
        }
    }
}

/// A provisioning backend.
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Returns the current state, or `None` if the stack does not exist.
    async fn describe(&self, fqn: &str) -> Result<Option<RemoteStack>, ProviderError>;

    /// Compares applied and desired state.
    fn diff(&self, current: &RemoteStack, desired: &StackRequest) -> StackDiff {
        StackDiff::between(current, desired)
    }

    /// Creates a stack that does not exist.
    async fn create(&self, request: &StackRequest) -> Result<RemoteStack, ProviderError>;

    /// Updates an existing stack.
    async fn update(
        &self,
        request: &StackRequest,
        strategy: UpdateStrategy,
    ) -> Result<RemoteStack, ProviderError>;

    /// Destroys an existing stack.
    async fn destroy(&self, fqn: &str) -> Result<(), ProviderError>;

    /// Returns the published outputs of an existing stack.
    async fn outputs(&self, fqn: &str) -> Result<HashMap<String, serde_json::Value>, ProviderError> {
        self.describe(fqn)
            .await?
            .map(|stack| stack.output_map())
            .ok_or_else(|| ProviderError::does_not_exist(fqn))
    }
}

/// Hex SHA-256 of a template's canonical JSON form.
#[must_use]
pub fn fingerprint(template: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(template.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Computes the outputs a template publishes.
///
/// Each entry under `Outputs` publishes its `Value`; a value of the form
/// `{"Ref": "Param"}` publishes that parameter.
#[must_use]
pub fn derive_outputs(
    template: &serde_json::Value,
    parameters: &BTreeMap<String, String>,
) -> BTreeMap<String, serde_json::Value> {
    let Some(outputs) = template.get("Outputs").and_then(serde_json::Value::as_object) else {
        return BTreeMap::new();
    };

    outputs
        .iter()
        .map(|(name, entry)| {
            let value = entry.get("Value").unwrap_or(entry);
            let value = match value.get("Ref").and_then(serde_json::Value::as_str) {
                Some(param) => parameters
                    .get(param)
                    .map_or(serde_json::Value::Null, |v| serde_json::Value::String(v.clone())),
                None => value.clone(),
            };
            (name.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_fingerprint_is_stable() {
        let a = json!({"Resources": {"Bucket": {"Type": "Bucket"}}});
        let b = json!({"Resources": {"Bucket": {"Type": "Bucket"}}});
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 64);
        assert_ne!(fingerprint(&a), fingerprint(&json!({})));
    }

    #[test]
    fn test_derive_outputs() {
        let template = json!({
            "Outputs": {
                "DummyId": {"Value": "dummy-1234"},
                "Size": {"Value": {"Ref": "Size"}},
                "Missing": {"Value": {"Ref": "Nope"}}
            }
        });
        let params = BTreeMap::from([("Size".to_string(), "large".to_string())]);

        let outputs = derive_outputs(&template, &params);
        assert_eq!(outputs.get("DummyId"), Some(&json!("dummy-1234")));
        assert_eq!(outputs.get("Size"), Some(&json!("large")));
        assert_eq!(outputs.get("Missing"), Some(&serde_json::Value::Null));
    }

    #[test]
    fn test_template_without_outputs() {
        assert!(derive_outputs(&json!({"Resources": {}}), &BTreeMap::new()).is_empty());
    }

    #[test]
    fn test_remote_from_request() {
        let request = StackRequest::new(
            "ns-vpc",
            json!({"Outputs": {"VpcId": {"Value": "vpc-1"}}}),
            BTreeMap::new(),
            BTreeMap::from([("team".to_string(), "infra".to_string())]),
        );
        let remote = RemoteStack::from_request(&request);

        assert_eq!(remote.fqn, "ns-vpc");
        assert_eq!(remote.fingerprint, request.fingerprint);
        assert_eq!(remote.output_map().get("VpcId"), Some(&json!("vpc-1")));
        assert_eq!(remote.tags.get("team").map(String::as_str), Some("infra"));
    }
}

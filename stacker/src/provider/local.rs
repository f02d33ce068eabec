//! File-backed provider.
//!
//! Keeps one JSON document per stack under a state directory, so repeated
//! runs see what earlier runs applied without any cloud API.

use super::{Provider, RemoteStack, StackRequest, UpdateStrategy};
use crate::errors::ProviderError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A provider persisting stack state as JSON files.
#[derive(Debug)]
pub struct LocalProvider {
    state_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalProvider {
    /// Creates a provider rooted at `state_dir`. The directory is created
    /// on first write.
    #[must_use]
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the state directory.
    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn path_for(&self, fqn: &str) -> PathBuf {
        self.state_dir.join(format!("{fqn}.json"))
    }

    async fn read(&self, fqn: &str, operation: &str) -> Result<Option<RemoteStack>, ProviderError> {
        match tokio::fs::read(self.path_for(fqn)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| ProviderError::failed(fqn, operation, format!("corrupt state file: {e}"))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProviderError::failed(fqn, operation, e.to_string())),
        }
    }

    async fn write(&self, stack: &RemoteStack, operation: &str) -> Result<(), ProviderError> {
        let fail = |reason: String| ProviderError::failed(stack.fqn.as_str(), operation, reason);
        tokio::fs::create_dir_all(&self.state_dir)
            .await
            .map_err(|e| fail(e.to_string()))?;
        let body = serde_json::to_vec_pretty(stack).map_err(|e| fail(e.to_string()))?;
        tokio::fs::write(self.path_for(&stack.fqn), body)
            .await
            .map_err(|e| fail(e.to_string()))
    }
}

#[async_trait]
impl Provider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn describe(&self, fqn: &str) -> Result<Option<RemoteStack>, ProviderError> {
        let found = self.read(fqn, "describe").await?;
        debug!(stack = %fqn, exists = found.is_some(), "Described stack");
        Ok(found)
    }

    async fn create(&self, request: &StackRequest) -> Result<RemoteStack, ProviderError> {
        let _guard = self.write_lock.lock().await;
        if self.read(&request.fqn, "create").await?.is_some() {
            return Err(ProviderError::failed(
                request.fqn.as_str(),
                "create",
                "stack already exists",
            ));
        }
        let stack = RemoteStack::from_request(request);
        self.write(&stack, "create").await?;
        info!(stack = %request.fqn, fingerprint = %request.fingerprint, "Created stack");
        Ok(stack)
    }

    async fn update(
        &self,
        request: &StackRequest,
        strategy: UpdateStrategy,
    ) -> Result<RemoteStack, ProviderError> {
        let _guard = self.write_lock.lock().await;
        if self.read(&request.fqn, "update").await?.is_none() {
            return Err(ProviderError::does_not_exist(request.fqn.as_str()));
        }
        let stack = RemoteStack::from_request(request);
        self.write(&stack, "update").await?;
        info!(stack = %request.fqn, ?strategy, fingerprint = %request.fingerprint, "Updated stack");
        Ok(stack)
    }

    async fn destroy(&self, fqn: &str) -> Result<(), ProviderError> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.path_for(fqn)).await {
            Ok(()) => {
                info!(stack = %fqn, "Destroyed stack");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ProviderError::does_not_exist(fqn)),
            Err(e) => Err(ProviderError::failed(fqn, "destroy", e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn request(value: &str) -> StackRequest {
        StackRequest::new(
            "ns-vpc",
            json!({"Outputs": {"VpcId": {"Value": value}}}),
            BTreeMap::new(),
            BTreeMap::new(),
        )
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalProvider::new(dir.path().join("state"));

        assert!(provider.describe("ns-vpc").await.unwrap().is_none());

        provider.create(&request("vpc-1")).await.unwrap();
        let described = provider.describe("ns-vpc").await.unwrap().unwrap();
        assert_eq!(described.outputs.get("VpcId"), Some(&json!("vpc-1")));

        provider
            .update(&request("vpc-2"), UpdateStrategy::Default)
            .await
            .unwrap();
        let outputs = provider.outputs("ns-vpc").await.unwrap();
        assert_eq!(outputs.get("VpcId"), Some(&json!("vpc-2")));

        provider.destroy("ns-vpc").await.unwrap();
        assert!(provider.describe("ns-vpc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_state_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        LocalProvider::new(dir.path())
            .create(&request("vpc-1"))
            .await
            .unwrap();

        let reopened = LocalProvider::new(dir.path());
        assert!(reopened.describe("ns-vpc").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalProvider::new(dir.path());

        let err = provider
            .update(&request("x"), UpdateStrategy::Default)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::StackDoesNotExist { .. }));
        assert!(provider.destroy("ns-vpc").await.is_err());
        assert!(provider.outputs("ns-vpc").await.is_err());

        provider.create(&request("x")).await.unwrap();
        assert!(provider.create(&request("x")).await.is_err());
    }
}

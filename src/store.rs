use crate::resources::{ImageStreamTag, OLSConfig, ObjectKey};
use kube::api::PostParams;
use kube::{Api, Client, ResourceExt};
use std::future::Future;
use thiserror::Error;
use tracing::debug;

const HTTP_CONFLICT: u16 = 409;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The object's resourceVersion changed since it was read
    #[error("resourceVersion conflict")]
    Conflict,
    #[error(transparent)]
    Api(kube::Error),
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ref response) if response.code == HTTP_CONFLICT => StoreError::Conflict,
            other => StoreError::Api(other),
        }
    }
}

/// Read and conditional-write access to the two resource kinds the reconciler touches.
pub trait ResourceStore: Send + Sync + 'static {
    /// `Ok(None)` when the tag does not exist.
    fn get_image_stream_tag(
        &self,
        key: &ObjectKey,
    ) -> impl Future<Output = Result<Option<ImageStreamTag>, StoreError>> + Send;

    /// `Ok(None)` when the config does not exist.
    fn get_ols_config(
        &self,
        key: &ObjectKey,
    ) -> impl Future<Output = Result<Option<OLSConfig>, StoreError>> + Send;

    /// Writes the whole object, conditional on the resourceVersion it carries.
    fn replace_ols_config(
        &self,
        config: &OLSConfig,
    ) -> impl Future<Output = Result<OLSConfig, StoreError>> + Send;
}

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    field_manager: String,
}

impl KubeStore {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }
}

impl ResourceStore for KubeStore {
    async fn get_image_stream_tag(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<ImageStreamTag>, StoreError> {
        let api: Api<ImageStreamTag> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn get_ols_config(&self, key: &ObjectKey) -> Result<Option<OLSConfig>, StoreError> {
        let api: Api<OLSConfig> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn replace_ols_config(&self, config: &OLSConfig) -> Result<OLSConfig, StoreError> {
        let namespace = config.namespace().unwrap_or_default();
        let name = config.name_any();
        debug!(
            "Replacing OLSConfig {}/{} at resourceVersion {:?}",
            namespace,
            name,
            config.resource_version()
        );
        let api: Api<OLSConfig> = Api::namespaced(self.client.clone(), &namespace);
        let params = PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        Ok(api.replace(&name, &params, config).await?)
    }
}


#[cfg(test)]
mod tests {
    use super::memory::InMemoryStore;
    use super::*;
    use crate::resources::fixtures::ols_config;

    fn target() -> ObjectKey {
        ObjectKey::new("openshift-lightspeed", "cluster")
    }

    #[tokio::test]
    async fn test_replace_bumps_resource_version() {
        let store = InMemoryStore::default();
        store.put_config(ols_config("openshift-lightspeed", "cluster", &["old"]));

        let read = store.get_ols_config(&target()).await.unwrap().unwrap();
        let written = store.replace_ols_config(&read).await.unwrap();

        assert_eq!(written.metadata.resource_version.as_deref(), Some("2"));
        assert_eq!(store.replace_count(), 1);
    }

    #[tokio::test]
    async fn test_replace_with_stale_version_conflicts() {
        let store = InMemoryStore::default();
        store.put_config(ols_config("openshift-lightspeed", "cluster", &["old"]));

        let first = store.get_ols_config(&target()).await.unwrap().unwrap();
        let second = first.clone();
        store.replace_ols_config(&first).await.unwrap();

        assert!(matches!(
            store.replace_ols_config(&second).await,
            Err(StoreError::Conflict)
        ));
        assert_eq!(store.replace_count(), 1);
    }

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(
            kube::core::ErrorResponse {
                status: "Failure".to_string(),
                message: format!("operation failed: {}", reason),
                reason: reason.to_string(),
                code,
            }
            .into(),
        )
    }

    #[test]
    fn test_api_conflict_maps_to_conflict() {
        assert!(matches!(
            StoreError::from(api_error(409, "Conflict")),
            StoreError::Conflict
        ));
    }

    #[test]
    fn test_other_api_errors_are_kept() {
        assert!(matches!(
            StoreError::from(api_error(500, "InternalError")),
            StoreError::Api(_)
        ));
        assert!(matches!(
            StoreError::from(api_error(404, "NotFound")),
            StoreError::Api(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_objects_read_as_none() {
        let store = InMemoryStore::default();
        assert!(store.get_ols_config(&target()).await.unwrap().is_none());
        assert!(
            store
                .get_image_stream_tag(&ObjectKey::new("rag-content", "rag:latest"))
                .await
                .unwrap()
                .is_none()
        );
    }
}

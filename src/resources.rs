use crate::error::Error;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{CustomResource, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// OpenShift `image.openshift.io/v1` ImageStreamTag.
///
/// The image API is served by the OpenShift API server rather than as a CRD, and the resource
/// carries its payload at the top level instead of under `spec`, so `Resource` is implemented by hand.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStreamTag {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub image: TagImage,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagImage {
    /// `metadata.name` of an OpenShift Image is its content digest.
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub docker_image_reference: String,
}

impl ImageStreamTag {
    pub fn digest(&self) -> Option<&str> {
        self.image.metadata.name.as_deref()
    }

    pub fn image_reference(&self) -> &str {
        &self.image.docker_image_reference
    }
}

impl Resource for ImageStreamTag {
    type DynamicType = ();
    type Scope = NamespaceResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        "ImageStreamTag".into()
    }

    fn group(_: &()) -> Cow<'_, str> {
        "image.openshift.io".into()
    }

    fn version(_: &()) -> Cow<'_, str> {
        "v1".into()
    }

    fn plural(_: &()) -> Cow<'_, str> {
        "imagestreamtags".into()
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// The subset of the OpenShift Lightspeed `OLSConfig` this controller manages.
///
/// Unknown fields are kept in the flattened maps so a replace round-trips everything
/// other controllers and users wrote.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ols.openshift.io",
    version = "v1alpha1",
    kind = "OLSConfig",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct OLSConfigSpec {
    #[serde(default)]
    pub ols: OLSSpec,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OLSSpec {
    #[serde(default)]
    pub rag: Vec<RagSpec>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RagSpec {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_path: Option<String>,
    #[serde(default, rename = "indexID", skip_serializing_if = "Option::is_none")]
    pub index_id: Option<String>,
}

/// Namespaced identity of an object, the only payload a reconcile request carries.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn for_resource<K: Resource>(resource: &K) -> Result<Self, Error> {
        let name = resource
            .meta()
            .name
            .clone()
            .ok_or(Error::MissingObjectKey(".metadata.name"))?;
        let namespace = resource
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

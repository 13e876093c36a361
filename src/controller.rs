use crate::config::{Config, Retry};
use crate::error::Error;
use crate::filter::DigestTracker;
use crate::image_reference::{ImageReference, ParseError};
use crate::resources::{ImageStreamTag, ObjectKey};
use crate::state::ControllerContext;
use crate::store::{KubeStore, ResourceStore, StoreError};
use crate::webserver::HealthState;
use futures::{StreamExt, TryStreamExt, future};
use kube::runtime::controller::Action;
use kube::runtime::{Controller, WatchStreamExt, reflector, watcher};
use kube::{Api, Client};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What a successful reconcile did.
#[derive(Debug, PartialEq, Eq)]
pub enum Reconciled {
    /// The tag was deleted after the event was queued
    SourceGone,
    UpToDate,
    Updated { image: String },
}

/// How the dispatcher should treat a finished reconcile.
#[derive(Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Success,
    RetryableFailure(String),
    /// The installation or source object is broken; retrying soon will not help
    FatalFailure(String),
}

impl From<&Error> for ReconcileOutcome {
    fn from(error: &Error) -> Self {
        if error.is_retryable() {
            ReconcileOutcome::RetryableFailure(error.to_string())
        } else {
            ReconcileOutcome::FatalFailure(error.to_string())
        }
    }
}

impl ReconcileOutcome {
    pub fn from_result(result: &Result<Reconciled, Error>) -> Self {
        match result {
            Ok(_) => ReconcileOutcome::Success,
            Err(e) => e.into(),
        }
    }

    pub fn action(&self, retry: &Retry) -> Action {
        match self {
            ReconcileOutcome::Success => Action::await_change(),
            ReconcileOutcome::RetryableFailure(_) => Action::requeue(retry.retryable()),
            ReconcileOutcome::FatalFailure(_) => Action::requeue(retry.fatal()),
        }
    }
}

pub async fn create_client() -> anyhow::Result<Client> {
    info!("Initializing K8s client");
    let client = Client::try_default().await?;
    let api_server_info = client.apiserver_version().await?;
    info!(
        "Connected to namespace {}, Kubernetes API server with version {}.{}",
        client.default_namespace(),
        api_server_info.major,
        api_server_info.minor
    );
    Ok(client)
}

/// Copies the tag's current image reference into the configured RAG entry of the OLSConfig.
///
/// Every call re-reads both objects, so repeated or concurrent calls for the same key are safe:
/// an unchanged entry is not written and a lost race surfaces as [`Error::UpdateConflict`].
pub async fn reconcile_key<S: ResourceStore>(
    key: &ObjectKey,
    ctx: &ControllerContext<S>,
) -> Result<Reconciled, Error> {
    let tag = ctx
        .store
        .get_image_stream_tag(key)
        .await
        .map_err(|source| Error::SourceFetch {
            key: key.clone(),
            source,
        })?;
    let Some(tag) = tag else {
        debug!("ImageStreamTag {} no longer exists, nothing to do", key);
        return Ok(Reconciled::SourceGone);
    };

    let desired_image = tag.image_reference();
    info!("Detected update to ImageStreamTag {}", key);
    info!(
        "dockerImageReference {} with image digest {}",
        desired_image,
        tag.digest().unwrap_or("<none>")
    );

    match ImageReference::parse(desired_image) {
        Ok(parsed) => {
            if let (Some(referenced), Some(digest)) = (parsed.digest.as_deref(), tag.digest()) {
                if referenced != digest {
                    warn!(
                        "ImageStreamTag {} references digest {} but resolves to image {}",
                        key, referenced, digest
                    );
                }
            }
        }
        // an empty pointer would wipe the RAG image
        Err(source @ ParseError::Empty) => {
            return Err(Error::InvalidImageReference {
                key: key.clone(),
                reference: desired_image.to_string(),
                source,
            });
        }
        Err(e) => warn!(
            "ImageStreamTag {} has an unqualified dockerImageReference {}, propagating it as-is: {}",
            key, desired_image, e
        ),
    }

    let target_key = ctx.target.key();
    let mut ols_config = ctx
        .store
        .get_ols_config(&target_key)
        .await
        .map_err(|source| Error::TargetConfigFetch {
            key: target_key.clone(),
            source,
        })?
        .ok_or_else(|| Error::TargetConfigNotFound {
            key: target_key.clone(),
        })?;
    info!(
        "Read OLSConfig {} at resourceVersion {}",
        target_key,
        ols_config.metadata.resource_version.as_deref().unwrap_or("<none>")
    );

    let index = ctx.target.rag_index;
    let len = ols_config.spec.ols.rag.len();
    let entry = ols_config
        .spec
        .ols
        .rag
        .get_mut(index)
        .ok_or_else(|| Error::MissingRagEntry {
            key: target_key.clone(),
            index,
            len,
        })?;

    if entry.image == desired_image {
        info!(
            "Skipping OLSConfig {}, RAG image {} is up to date",
            target_key, index
        );
        return Ok(Reconciled::UpToDate);
    }

    info!(
        "Updating OLSConfig {} RAG image {} from {} to {}",
        target_key, index, entry.image, desired_image
    );
    entry.image = desired_image.to_string();

    ctx.store
        .replace_ols_config(&ols_config)
        .await
        .map_err(|e| match e {
            StoreError::Conflict => Error::UpdateConflict {
                key: target_key.clone(),
            },
            source => Error::Update {
                key: target_key.clone(),
                source,
            },
        })?;

    info!("Successfully updated OLSConfig {}", target_key);
    Ok(Reconciled::Updated {
        image: desired_image.to_string(),
    })
}

pub async fn reconcile<S: ResourceStore>(
    tag: Arc<ImageStreamTag>,
    ctx: Arc<ControllerContext<S>>,
) -> Result<Action, Error> {
    let key = ObjectKey::for_resource(&*tag)?;
    let result = reconcile_key(&key, &ctx).await;
    let action = ReconcileOutcome::from_result(&result).action(&ctx.retry);
    result.map(|reconciled| {
        debug!("Reconciled ImageStreamTag {}: {:?}", key, reconciled);
        action
    })
}

pub fn error_policy<S: ResourceStore>(
    tag: Arc<ImageStreamTag>,
    error: &Error,
    ctx: Arc<ControllerContext<S>>,
) -> Action {
    let outcome = ReconcileOutcome::from(error);
    let name = tag.metadata.name.as_deref().unwrap_or("<unknown>");
    match &outcome {
        ReconcileOutcome::RetryableFailure(reason) => {
            warn!(
                "Reconciling ImageStreamTag {} failed, retrying in {}s: {}",
                name, ctx.retry.retryable_seconds, reason
            )
        }
        ReconcileOutcome::FatalFailure(reason) => {
            error!(
                "Reconciling ImageStreamTag {} failed on a configuration error, checking again in {}s: {}",
                name, ctx.retry.fatal_seconds, reason
            )
        }
        ReconcileOutcome::Success => {}
    }
    outcome.action(&ctx.retry)
}

/// Watches ImageStreamTags and reconciles those whose digest changed until SIGINT/SIGTERM.
pub async fn run(client: Client, config: &Config, health: HealthState) -> anyhow::Result<()> {
    let tags: Api<ImageStreamTag> = match &config.watch.namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    };
    if config.watch.is_cluster_wide() {
        warn!(
            "Watching every ImageStreamTag in the cluster, each tag writes its image into the same RAG entry; set watch.namespace or watch.labelSelector"
        );
    }
    let mut watcher_config = watcher::Config::default();
    if let Some(selector) = &config.watch.label_selector {
        watcher_config = watcher_config.labels(selector);
    }

    let ctx = Arc::new(ControllerContext::new(
        KubeStore::new(client, &config.field_manager),
        config.target_config.clone(),
        config.retry.clone(),
    ));

    let (reader, writer) = reflector::store();
    let mut tracker = DigestTracker::new();
    let changed_tags = watcher(tags, watcher_config)
        .default_backoff()
        .reflect(writer)
        .try_filter_map(move |event| {
            let list_done = matches!(event, watcher::Event::InitDone);
            let admitted = tracker.handle(event);
            if list_done {
                info!("ImageStreamTag list complete, tracking {} tags", tracker.tracked());
                health.mark_ready();
            }
            future::ready(Ok(admitted))
        });

    info!(
        "Watching ImageStreamTags in {} for digest changes, propagating to OLSConfig {} RAG image {}",
        config.watch.namespace.as_deref().unwrap_or("all namespaces"),
        config.target_config.key(),
        config.target_config.rag_index
    );

    Controller::for_stream(changed_tags, reader)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((tag, _)) => debug!("Finished reconcile of {}", tag),
                Err(e) => debug!("Reconcile did not complete: {}", e),
            }
        })
        .await;

    info!("Controller stopped");
    Ok(())
}

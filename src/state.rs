use crate::config::{Retry, TargetConfig};
use crate::store::ResourceStore;

/// Shared state handed to every reconcile. The store is the only way the reconciler
/// reaches the cluster, so tests swap in an in-memory one.
pub struct ControllerContext<S: ResourceStore> {
    pub(crate) store: S,
    pub(crate) target: TargetConfig,
    pub(crate) retry: Retry,
}

impl<S: ResourceStore> ControllerContext<S> {
    pub fn new(store: S, target: TargetConfig, retry: Retry) -> Self {
        Self {
            store,
            target,
            retry,
        }
    }
}

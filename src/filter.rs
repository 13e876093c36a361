//! Change detection for watched ImageStreamTags.
//!
//! [`digest_changed`] is the pure update predicate. [`DigestTracker`] sits on the watch stream,
//! remembers the previous version of every tag and hands `(old, new)` pairs to the predicate so
//! only tags that now resolve to different image content reach the reconciler.

use crate::resources::{ImageStreamTag, ObjectKey};
use kube::runtime::watcher::Event;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// A payload delivered by the watch layer.
#[derive(Clone, Debug)]
pub enum WatchedObject {
    ImageStreamTag(ImageStreamTag),
    Unrecognized { kind: String },
}

impl From<ImageStreamTag> for WatchedObject {
    fn from(tag: ImageStreamTag) -> Self {
        WatchedObject::ImageStreamTag(tag)
    }
}

/// Admits an update only when both versions are ImageStreamTags and their image digest differs.
pub fn digest_changed(old: &WatchedObject, new: &WatchedObject) -> bool {
    match (old, new) {
        (WatchedObject::ImageStreamTag(old), WatchedObject::ImageStreamTag(new)) => {
            old.digest() != new.digest()
        }
        (WatchedObject::Unrecognized { kind }, _) | (_, WatchedObject::Unrecognized { kind }) => {
            debug!("Ignoring update for unrecognized kind {}", kind);
            false
        }
    }
}

#[derive(Default)]
pub struct DigestTracker {
    last_seen: HashMap<ObjectKey, WatchedObject>,
    relisted: Option<HashSet<ObjectKey>>,
}

impl DigestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one watch event and returns the tag if it should be reconciled.
    pub fn handle(&mut self, event: Event<ImageStreamTag>) -> Option<ImageStreamTag> {
        match event {
            Event::Init => {
                self.relisted = Some(HashSet::new());
                None
            }
            Event::InitApply(tag) => {
                if let (Some(relisted), Ok(key)) = (self.relisted.as_mut(), ObjectKey::for_resource(&tag)) {
                    relisted.insert(key);
                }
                self.observe(tag)
            }
            Event::InitDone => {
                if let Some(relisted) = self.relisted.take() {
                    self.last_seen.retain(|key, _| relisted.contains(key));
                }
                None
            }
            Event::Apply(tag) => self.observe(tag),
            Event::Delete(tag) => {
                if let Ok(key) = ObjectKey::for_resource(&tag) {
                    debug!("Forgetting deleted ImageStreamTag {}", key);
                    self.last_seen.remove(&key);
                }
                None
            }
        }
    }

    /// First sightings are admitted, later versions only when the digest moved.
    pub fn observe(&mut self, tag: ImageStreamTag) -> Option<ImageStreamTag> {
        let key = match ObjectKey::for_resource(&tag) {
            Ok(key) => key,
            Err(e) => {
                warn!("Ignoring ImageStreamTag without identity: {}", e);
                return None;
            }
        };

        let new = WatchedObject::from(tag.clone());
        let admit = match self.last_seen.get(&key) {
            Some(old) => digest_changed(old, &new),
            None => true,
        };
        self.last_seen.insert(key.clone(), new);

        if admit {
            debug!(
                "ImageStreamTag {} digest is now {}",
                key,
                tag.digest().unwrap_or("<none>")
            );
            Some(tag)
        } else {
            debug!("Dropping event for ImageStreamTag {}, digest unchanged", key);
            None
        }
    }

    pub fn tracked(&self) -> usize {
        self.last_seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::fixtures::image_stream_tag;

    fn tag_with_digest(digest: &str) -> WatchedObject {
        image_stream_tag(
            "rag-content",
            "rag:latest",
            &format!("registry.example/rag@{}", digest),
            digest,
        )
        .into()
    }

    #[test]
    fn test_filter_compares_digests() {
        let digests = ["sha256:aaa", "sha256:bbb", "sha256:ccc"];
        for d1 in digests {
            for d2 in digests {
                assert_eq!(
                    digest_changed(&tag_with_digest(d1), &tag_with_digest(d2)),
                    d1 != d2,
                    "{} -> {}",
                    d1,
                    d2
                );
            }
        }
    }

    #[test]
    fn test_filter_ignores_reference_and_metadata_changes() {
        let old = image_stream_tag("rag-content", "rag:latest", "registry.example/rag:latest", "sha256:aaa");
        let mut new = image_stream_tag("rag-content", "rag:latest", "mirror.example/rag:latest", "sha256:aaa");
        new.metadata.labels = Some([("team".to_string(), "docs".to_string())].into());
        new.metadata.resource_version = Some("2".to_string());

        assert!(!digest_changed(&old.into(), &new.into()));
    }

    #[test]
    fn test_filter_rejects_unrecognized_payloads() {
        let other = WatchedObject::Unrecognized {
            kind: "ConfigMap".to_string(),
        };
        assert!(!digest_changed(&other, &tag_with_digest("sha256:aaa")));
        assert!(!digest_changed(&tag_with_digest("sha256:aaa"), &other));
        assert!(!digest_changed(&other, &other));
    }

    #[test]
    fn test_tracker_admits_first_sighting_then_digest_changes() {
        let mut tracker = DigestTracker::new();
        let bbb = image_stream_tag("rag-content", "rag:latest", "registry.example/rag@sha256:bbb", "sha256:bbb");
        let aaa = image_stream_tag("rag-content", "rag:latest", "registry.example/rag@sha256:aaa", "sha256:aaa");

        assert!(tracker.handle(Event::Apply(bbb.clone())).is_some());
        assert!(tracker.handle(Event::Apply(bbb)).is_none());

        let admitted = tracker.handle(Event::Apply(aaa)).unwrap();
        assert_eq!(admitted.image_reference(), "registry.example/rag@sha256:aaa");
    }

    #[test]
    fn test_tracker_forgets_deleted_tags() {
        let mut tracker = DigestTracker::new();
        let tag = image_stream_tag("rag-content", "rag:latest", "registry.example/rag@sha256:aaa", "sha256:aaa");

        tracker.handle(Event::Apply(tag.clone()));
        assert!(tracker.handle(Event::Delete(tag.clone())).is_none());
        assert_eq!(tracker.tracked(), 0);
        assert!(tracker.handle(Event::Apply(tag)).is_some());
    }

    #[test]
    fn test_tracker_prunes_tags_missing_from_relist() {
        let mut tracker = DigestTracker::new();
        let kept = image_stream_tag("rag-content", "rag:latest", "registry.example/rag@sha256:aaa", "sha256:aaa");
        let gone = image_stream_tag("rag-content", "rag:old", "registry.example/rag@sha256:bbb", "sha256:bbb");

        tracker.handle(Event::Apply(kept.clone()));
        tracker.handle(Event::Apply(gone));
        assert_eq!(tracker.tracked(), 2);

        assert!(tracker.handle(Event::Init).is_none());
        assert!(tracker.handle(Event::InitApply(kept)).is_none());
        assert!(tracker.handle(Event::InitDone).is_none());
        assert_eq!(tracker.tracked(), 1);
    }
}

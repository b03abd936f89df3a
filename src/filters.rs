// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Admission predicates for watch events.
//!
//! These decide which observed changes turn into reconcile requests:
//!
//! - [`ingress_class_matches`] - whether a parent belongs to the configured ingress class
//! - [`proxy_change_hash`] - parent predicate; generation, labels and annotations only
//! - [`ChildEventFilter`] - child events; only generation changes and deletions
//! - [`admit_service_event`] - load-balancer Service events; initial listing is ignored

use crate::crd::HTTPProxy;
use crate::key::ObjectKey;
use crate::labels::{CONTOUR_INGRESS_CLASS_ANNOTATION, INGRESS_CLASS_ANNOTATION};
use kube::runtime::watcher::Event;
use kube::Resource;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Whether a parent belongs to the ingress class `target`.
///
/// The generic annotation, the Contour annotation and `spec.ingressClassName`
/// are each checked when non-empty; any mismatch excludes the parent. A
/// parent with none of the three set is excluded too. An empty `target`
/// admits every parent.
#[must_use]
pub fn ingress_class_matches(proxy: &HTTPProxy, target: &str) -> bool {
    if target.is_empty() {
        return true;
    }

    let sources = [
        proxy.annotation(INGRESS_CLASS_ANNOTATION),
        proxy.annotation(CONTOUR_INGRESS_CLASS_ANNOTATION),
        proxy.spec.ingress_class_name.as_deref(),
    ];
    let set: Vec<&str> = sources
        .into_iter()
        .flatten()
        .filter(|class| !class.is_empty())
        .collect();

    !set.is_empty() && set.iter().all(|class| *class == target)
}

/// Parent change predicate.
///
/// Status-only updates leave generation, labels and annotations untouched and
/// hash identically, so they are filtered out.
pub fn proxy_change_hash(proxy: &HTTPProxy) -> Option<u64> {
    let mut hasher = DefaultHasher::new();
    proxy.metadata.generation.hash(&mut hasher);
    proxy.metadata.labels.hash(&mut hasher);
    proxy.metadata.annotations.hash(&mut hasher);
    Some(hasher.finish())
}

/// Suppresses child events caused by the controller's own writes.
///
/// Creation (first sight of an object, including the initial listing) never
/// admits. Afterwards an object is admitted when its generation changes or
/// it is deleted.
#[derive(Debug, Default)]
pub struct ChildEventFilter {
    generations: HashMap<ObjectKey, Option<i64>>,
}

impl ChildEventFilter {
    /// Returns the object if the event should trigger a parent reconcile.
    pub fn admit<K>(&mut self, event: Event<K>) -> Option<K>
    where
        K: Resource,
    {
        match event {
            Event::Init | Event::InitDone => None,
            Event::InitApply(obj) => {
                let key = Self::key(&obj)?;
                self.generations.insert(key, obj.meta().generation);
                None
            }
            Event::Apply(obj) => {
                let key = Self::key(&obj)?;
                let generation = obj.meta().generation;
                match self.generations.insert(key, generation) {
                    Some(previous) if previous != generation => Some(obj),
                    _ => None,
                }
            }
            Event::Delete(obj) => {
                if let Some(key) = Self::key(&obj) {
                    self.generations.remove(&key);
                }
                Some(obj)
            }
        }
    }

    fn key<K: Resource>(obj: &K) -> Option<ObjectKey> {
        let meta = obj.meta();
        Some(ObjectKey::new(meta.namespace.clone()?, meta.name.clone()?))
    }
}

/// Load-balancer Service events, without the initial listing.
pub fn admit_service_event<K>(event: Event<K>) -> Option<K> {
    match event {
        Event::Apply(obj) | Event::Delete(obj) => Some(obj),
        Event::Init | Event::InitApply(_) | Event::InitDone => None,
    }
}

#[cfg(test)]
#[path = "filters_tests.rs"]
mod filters_tests;

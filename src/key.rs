// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Namespaced object identity.

use crate::errors::Error;
use kube::{Resource, ResourceExt};
use std::fmt;
use std::str::FromStr;

/// `(namespace, name)` of a namespaced object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a namespaced resource.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingMetadata`] if the resource has no namespace or name.
    pub fn of<K>(resource: &K) -> Result<Self, Error>
    where
        K: Resource<DynamicType = ()>,
    {
        let namespace = resource
            .namespace()
            .ok_or_else(|| Error::MissingMetadata {
                kind: K::kind(&()).to_string(),
                field: "namespace",
            })?;
        let name = resource.meta().name.clone().ok_or_else(|| Error::MissingMetadata {
            kind: K::kind(&()).to_string(),
            field: "name",
        })?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ObjectKey {
    type Err = Error;

    /// Parses `namespace/name`; both parts must be non-empty.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(namespace, name))
            }
            _ => Err(Error::InvalidObjectKey(s.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "key_tests.rs"]
mod key_tests;

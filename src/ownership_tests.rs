// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `ownership.rs`

#[cfg(test)]
mod tests {
    use crate::key::ObjectKey;
    use crate::labels::{FINALIZER_HTTP_PROXY, OWNER_ANNOTATION};
    use crate::ownership::*;
    use crate::testing::{proxy, terminating, FakeClusterApi};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn child(namespace: &str, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_same_namespace_child_gets_owner_reference() {
        let api = FakeClusterApi::new().with_proxy(proxy("app", "foo", "foo.example.com"));
        let mut parent = proxy("app", "foo", "foo.example.com");
        let mut meta = child("app", "foo");

        track_ownership(&api, &mut parent, &mut meta).await.unwrap();

        let owners = meta.owner_references.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "HTTPProxy");
        assert_eq!(owners[0].name, "foo");
        assert_eq!(owners[0].controller, Some(true));
        assert_eq!(meta.annotations.unwrap()[OWNER_ANNOTATION], "app/foo");
        assert!(!parent.has_finalizer(FINALIZER_HTTP_PROXY));
        assert!(api.state().proxy_patches.is_empty());
    }

    #[tokio::test]
    async fn test_cross_namespace_child_adds_finalizer_first() {
        let api = FakeClusterApi::new().with_proxy(proxy("app", "foo", "foo.example.com"));
        let mut parent = proxy("app", "foo", "foo.example.com");
        let mut meta = child("dns", "app-foo");

        track_ownership(&api, &mut parent, &mut meta).await.unwrap();

        assert!(meta.owner_references.is_none());
        assert_eq!(meta.annotations.unwrap()[OWNER_ANNOTATION], "app/foo");
        assert!(parent.has_finalizer(FINALIZER_HTTP_PROXY));
        assert!(api
            .proxy(&ObjectKey::new("app", "foo"))
            .unwrap()
            .has_finalizer(FINALIZER_HTTP_PROXY));

        // second cross-namespace child does not patch again
        let mut other = child("dns", "app-foo-delegation");
        track_ownership(&api, &mut parent, &mut other).await.unwrap();
        assert_eq!(api.state().proxy_patches.len(), 1);
    }

    #[test]
    fn test_parse_owner() {
        let mut meta = child("dns", "app-foo");
        assert_eq!(parse_owner(&meta), None);

        meta.annotations = Some(
            [(OWNER_ANNOTATION.to_string(), "app/foo".to_string())]
                .into_iter()
                .collect(),
        );
        assert_eq!(parse_owner(&meta), Some(ObjectKey::new("app", "foo")));
        assert!(is_owned_by(&meta, &ObjectKey::new("app", "foo")));
        assert!(!is_owned_by(&meta, &ObjectKey::new("app", "bar")));

        meta.annotations = Some(
            [(OWNER_ANNOTATION.to_string(), "garbage".to_string())]
                .into_iter()
                .collect(),
        );
        assert_eq!(parse_owner(&meta), None);
    }

    #[test]
    fn test_parent_lifecycle() {
        let active = proxy("app", "foo", "foo.example.com");
        assert_eq!(ParentLifecycle::of(&active), ParentLifecycle::Active);

        let clean = terminating(active.clone());
        assert_eq!(ParentLifecycle::of(&clean), ParentLifecycle::TerminatingClean);

        let mut holding = active;
        holding.metadata.finalizers = Some(vec![FINALIZER_HTTP_PROXY.to_string()]);
        let holding = terminating(holding);
        assert_eq!(
            ParentLifecycle::of(&holding),
            ParentLifecycle::TerminatingWithChildren
        );
    }
}

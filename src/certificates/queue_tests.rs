// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `queue.rs`

#[cfg(test)]
mod tests {
    use crate::certificates::queue::{ApplyQueue, TokenBucket};
    use crate::crd::{Certificate, CertificateSpec};
    use crate::key::ObjectKey;
    use std::time::Duration;
    use tokio::time::Instant;

    fn manifest(name: &str, secret: &str) -> Certificate {
        let mut cert = Certificate::new(
            name,
            CertificateSpec {
                secret_name: secret.to_string(),
                ..Default::default()
            },
        );
        cert.metadata.namespace = Some("default".to_string());
        cert
    }

    #[test]
    fn test_burst_is_at_least_one() {
        assert!((TokenBucket::new(0.2).burst() - 1.0).abs() < f64::EPSILON);
        assert!((TokenBucket::new(2.5).burst() - 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_waits_after_burst() {
        let mut bucket = TokenBucket::new(2.0);
        let now = Instant::now();

        assert_eq!(bucket.reserve(now), Duration::ZERO);
        assert_eq!(bucket.reserve(now), Duration::ZERO);
        assert_eq!(bucket.reserve(now), Duration::from_millis(500));
        assert_eq!(bucket.reserve(now), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_refills() {
        let mut bucket = TokenBucket::new(1.0);
        let start = Instant::now();

        assert_eq!(bucket.reserve(start), Duration::ZERO);
        assert_eq!(
            bucket.reserve(start + Duration::from_secs(1)),
            Duration::ZERO
        );
        // refill never exceeds the burst
        assert_eq!(
            bucket.reserve(start + Duration::from_secs(60)),
            Duration::ZERO
        );
        assert_eq!(
            bucket.reserve(start + Duration::from_secs(60)),
            Duration::from_secs(1)
        );
    }

    #[tokio::test]
    async fn test_push_coalesces_same_key() {
        let queue = ApplyQueue::new(10.0);
        let key = ObjectKey::new("default", "foo");

        assert!(queue.push(key.clone(), manifest("foo", "first")).await);
        assert!(!queue.push(key.clone(), manifest("foo", "second")).await);
        assert_eq!(queue.len().await, 1);

        let pending = queue.pop().await;
        assert_eq!(pending.key, key);
        assert_eq!(pending.manifest.unwrap().spec.secret_name, "second");
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_pop_is_fifo_across_keys() {
        let queue = ApplyQueue::new(10.0);
        queue
            .push(ObjectKey::new("default", "a"), manifest("a", "a"))
            .await;
        queue
            .push(ObjectKey::new("default", "b"), manifest("b", "b"))
            .await;

        assert_eq!(queue.pop().await.key.name, "a");
        assert_eq!(queue.pop().await.key.name, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_respects_rate() {
        let queue = ApplyQueue::new(1.0);
        for name in ["a", "b", "c"] {
            queue
                .push(ObjectKey::new("default", name), manifest(name, name))
                .await;
        }

        let start = Instant::now();
        queue.pop().await;
        queue.pop().await;
        queue.pop().await;
        assert!(Instant::now() - start >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_waits_for_push() {
        let queue = std::sync::Arc::new(ApplyQueue::new(10.0));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!consumer.is_finished());

        queue
            .push(ObjectKey::new("default", "late"), manifest("late", "late"))
            .await;
        let pending = consumer.await.unwrap();
        assert_eq!(pending.key.name, "late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_removes_pending_key() {
        let queue = ApplyQueue::new(10.0);
        let foo = ObjectKey::new("default", "foo");
        let bar = ObjectKey::new("default", "bar");
        queue.push(foo.clone(), manifest("foo", "foo")).await;
        queue.push(bar.clone(), manifest("bar", "bar")).await;

        assert!(queue.cancel(&foo).await);
        assert!(!queue.cancel(&foo).await);
        assert_eq!(queue.len().await, 1);

        let pending = queue.pop().await;
        assert_eq!(pending.key, bar);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_cancel_unknown_key_is_noop() {
        let queue = ApplyQueue::new(10.0);
        assert!(!queue.cancel(&ObjectKey::new("default", "foo")).await);
    }
}

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Rate-limited, coalescing queue of pending certificate applies.
//!
//! Each key is queued at most once; pushing a key that is already waiting
//! only replaces its manifest, so the worker applies whatever was pushed last.
//! Keys are released at the pace of a shared [`TokenBucket`].

use crate::crd::Certificate;
use crate::key::ObjectKey;
use crate::metrics::set_certificate_queue_depth;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// Token bucket with a refill rate in tokens per second.
///
/// Burst capacity is the rate rounded up, and at least one token.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    tokens: f64,
    last: Instant,
}

impl TokenBucket {
    /// Full bucket refilling at `rate` tokens per second. `rate` must be positive.
    #[must_use]
    pub fn new(rate: f64) -> Self {
        let burst = rate.ceil().max(1.0);
        Self {
            rate,
            burst,
            tokens: burst,
            last: Instant::now(),
        }
    }

    #[must_use]
    pub fn burst(&self) -> f64 {
        self.burst
    }

    /// Take one token and return how long the caller must wait before using it.
    ///
    /// Tokens may go negative; later reservations then wait proportionally
    /// longer.
    pub fn reserve(&mut self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.last = now;
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
        self.tokens -= 1.0;

        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(-self.tokens / self.rate).unwrap_or(Duration::MAX)
        }
    }
}

/// An entry released by the queue.
#[derive(Debug)]
pub struct PendingApply {
    pub key: ObjectKey,
    /// `None` only if the manifest was lost, which coalescing rules out
    pub manifest: Option<Certificate>,
}

struct Inner {
    manifests: HashMap<ObjectKey, Certificate>,
    queue: VecDeque<ObjectKey>,
    limiter: TokenBucket,
}

/// Queue shared by the rate-limited applier (producers) and the apply worker
/// (single consumer).
pub struct ApplyQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl ApplyQueue {
    #[must_use]
    pub fn new(rate: f64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                manifests: HashMap::new(),
                queue: VecDeque::new(),
                limiter: TokenBucket::new(rate),
            }),
            notify: Notify::new(),
        }
    }

    /// Store `manifest` as the latest desired state for `key` and queue the key
    /// unless it is already waiting.
    ///
    /// Returns `true` when the key was newly queued.
    pub async fn push(&self, key: ObjectKey, manifest: Certificate) -> bool {
        let mut inner = self.inner.lock().await;
        let queued = inner.manifests.insert(key.clone(), manifest).is_none();
        if queued {
            inner.queue.push_back(key);
            set_certificate_queue_depth(inner.queue.len());
            self.notify.notify_one();
        }
        queued
    }

    /// Drop the pending manifest for `key` and take the key out of the queue.
    ///
    /// Returns `true` when something was pending.
    pub async fn cancel(&self, key: &ObjectKey) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.manifests.remove(key).is_none() {
            return false;
        }
        inner.queue.retain(|queued| queued != key);
        set_certificate_queue_depth(inner.queue.len());
        true
    }

    /// Number of keys waiting.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Wait for a key and a rate token, then hand out the key with its
    /// manifest, removing both.
    ///
    /// Only one task may pop.
    pub async fn pop(&self) -> PendingApply {
        loop {
            let delay = loop {
                let notified = self.notify.notified();
                {
                    let mut inner = self.inner.lock().await;
                    if !inner.queue.is_empty() {
                        break inner.limiter.reserve(Instant::now());
                    }
                }
                notified.await;
            };

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let mut inner = self.inner.lock().await;
            if let Some(key) = inner.queue.pop_front() {
                let manifest = inner.manifests.remove(&key);
                set_certificate_queue_depth(inner.queue.len());
                return PendingApply { key, manifest };
            }
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod queue_tests;

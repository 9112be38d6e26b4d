// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request key bindings.
//!
//! Maps a request correlation id to the key version its token was verified
//! with, so that a second validation of the same request reuses the resolved
//! version instead of reading the token's hint again. A binding is written
//! once and never replaced; entries expire after a TTL and the map is capped
//! by LRU capacity.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct Binding {
    version: u32,
    inserted_at: Instant,
}

/// Correlation id → key version registry.
pub struct KeyBindings {
    entries: Mutex<LruCache<String, Binding>>,
    ttl: Duration,
}

impl KeyBindings {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Version bound to `correlation_id`, if a live binding exists.
    pub fn lookup(&self, correlation_id: &str) -> Option<u32> {
        let mut entries = self.entries.lock().ok()?;
        let (version, live) = entries
            .get(correlation_id)
            .map(|b| (b.version, b.inserted_at.elapsed() < self.ttl))?;
        if live {
            Some(version)
        } else {
            entries.pop(correlation_id);
            None
        }
    }

    /// Bind `correlation_id` to `version` unless a live binding exists.
    ///
    /// Returns the version that ends up bound.
    pub fn publish(&self, correlation_id: &str, version: u32) -> u32 {
        let Ok(mut entries) = self.entries.lock() else {
            return version;
        };
        if let Some(existing) = entries.get(correlation_id) {
            if existing.inserted_at.elapsed() < self.ttl {
                return existing.version;
            }
        }
        entries.put(
            correlation_id.to_string(),
            Binding {
                version,
                inserted_at: Instant::now(),
            },
        );
        version
    }

    /// Drop every expired binding. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, binding)| binding.inserted_at.elapsed() >= self.ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            entries.pop(id);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Periodically sweep expired bindings until `shutdown` is cancelled.
pub async fn run_binding_sweeper(
    bindings: Arc<KeyBindings>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    info!(interval_secs = interval.as_secs(), "Binding sweeper started");
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Binding sweeper shutting down");
                break;
            }
            _ = ticker.tick() => {
                let removed = bindings.sweep_expired();
                if removed > 0 {
                    debug!(removed, remaining = bindings.len(), "Swept expired request bindings");
                }
            }
        }
    }
}

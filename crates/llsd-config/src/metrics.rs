//! Global atomic counters for config generation.
//!
//! Counters are bumped silently at the call site; [`Metrics::flush`] emits
//! the current values as one `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    generations: AtomicU64,
    generation_failures: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    registry_extractions: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            generations: AtomicU64::new(0),
            generation_failures: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            registry_extractions: AtomicU64::new(0),
        }
    }

    pub fn inc_generations(&self) {
        self.generations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "generations", "counter incremented");
    }

    pub fn inc_generation_failures(&self) {
        self.generation_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "generation_failures", "counter incremented");
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cache_hits", "counter incremented");
    }

    pub fn inc_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cache_misses", "counter incremented");
    }

    pub fn inc_registry_extractions(&self) {
        self.registry_extractions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "registry_extractions", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            generations = self.generations(),
            generation_failures = self.generation_failures(),
            cache_hits = self.cache_hits(),
            cache_misses = self.cache_misses(),
            registry_extractions = self.registry_extractions(),
        );
    }

    pub fn generations(&self) -> u64 {
        self.generations.load(Ordering::Relaxed)
    }

    pub fn generation_failures(&self) -> u64 {
        self.generation_failures.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn registry_extractions(&self) -> u64 {
        self.registry_extractions.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (tests).
    pub fn reset(&self) {
        self.generations.store(0, Ordering::Relaxed);
        self.generation_failures.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.registry_extractions.store(0, Ordering::Relaxed);
    }
}

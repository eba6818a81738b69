//! Structured events for the config generation lifecycle.
//!
//! - `generation_span` / `GenerationSpan` scope everything logged during one
//!   run to the distribution being generated
//! - `emit_*` functions record start, base resolution, cache lookups and the
//!   outcome
//!
//! Only secret *references* ever reach this module; values never exist in the
//! pipeline.

use tracing::{info, warn};

/// RAII guard that enters a generation-scoped span.
///
/// ```ignore
/// let _span = GenerationSpan::enter("starter");
/// ```
pub struct GenerationSpan {
    _span: tracing::span::EnteredSpan,
}

impl GenerationSpan {
    pub fn enter(distribution: &str) -> Self {
        Self {
            _span: generation_span(distribution).entered(),
        }
    }
}

/// The generation span itself, for instrumenting futures.
pub fn generation_span(distribution: &str) -> tracing::Span {
    tracing::info_span!("llsd.generate", distribution = %distribution)
}

/// Emit event: generation started, with the config source chosen.
pub fn emit_generation_started(distribution: &str, source: &str) {
    info!(event = "generate.started", distribution = %distribution, source = %source);
}

/// Emit event: base document resolved.
pub fn emit_base_resolved(image: &str, origin: &str, version: i64) {
    info!(
        event = "base.resolved",
        image = %image,
        origin = %origin,
        version = version,
    );
}

/// Emit event: digest cache consulted.
pub fn emit_cache_lookup(digest: &str, hit: bool) {
    info!(event = "base.cache_lookup", digest = %digest, hit = hit);
}

/// Emit event: the merge kept going but something needs attention.
pub fn emit_generation_warning(message: &str) {
    warn!(event = "generate.warning", message = %message);
}

/// Emit event: generation finished.
pub fn emit_generation_finished(
    hash_prefix: &str,
    provider_count: usize,
    resource_count: usize,
    version: i64,
) {
    info!(
        event = "generate.finished",
        hash = %hash_prefix,
        provider_count = provider_count,
        resource_count = resource_count,
        version = version,
    );
}

/// Emit event: generation failed (warning level).
pub fn emit_generation_failed(distribution: &str, error: &dyn std::fmt::Display, retryable: bool) {
    warn!(
        event = "generate.failed",
        distribution = %distribution,
        error = %error,
        retryable = retryable,
    );
}

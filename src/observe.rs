//! Convergence-loop metrics and the observer that turns them into
//! "rollback trigger" warnings. The engine only reports; it never acts on
//! what an observer concludes.

use std::time::Duration;

use serde::Serialize;

use crate::header_footer::CacheStats;

pub const SLOW_ITERATION: Duration = Duration::from_millis(100);
pub const MIN_HIT_RATE: f64 = 0.5;
/// Lookups needed before the hit rate means anything.
pub const MIN_LOOKUPS_FOR_HIT_RATE: u64 = 10;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct IterationMetrics {
    pub iteration: u32,
    pub affected_blocks: usize,
    pub remeasure_time: Duration,
    pub relayout_time: Duration,
    pub resolve_time: Duration,
}

impl IterationMetrics {
    pub fn total_time(&self) -> Duration {
        self.remeasure_time + self.relayout_time + self.resolve_time
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceReason {
    /// No block depends on a token whose value changed.
    Stable,
    IterationCap,
    TimeBudget,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaginationSummary {
    pub converged: bool,
    pub reason: ConvergenceReason,
    pub iterations: u32,
    pub pages: usize,
    pub total_time: Duration,
    pub header_footer_cache: CacheStats,
    pub cache_memory_limit: usize,
}

pub trait LayoutObserver {
    fn on_iteration(&mut self, metrics: &IterationMetrics);
    fn on_complete(&mut self, summary: &PaginationSummary);
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl LayoutObserver for NoopObserver {
    fn on_iteration(&mut self, _metrics: &IterationMetrics) {}
    fn on_complete(&mut self, _summary: &PaginationSummary) {}
}

/// Logs metrics and warns on rollback-trigger conditions.
#[derive(Default)]
pub struct LoggingObserver {
    pub slow_iterations: u32,
    pub triggers: Vec<String>,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn trigger(&mut self, message: String) {
        log::warn!("rollback trigger: {message}");
        self.triggers.push(message);
    }
}

impl LayoutObserver for LoggingObserver {
    fn on_iteration(&mut self, m: &IterationMetrics) {
        log::debug!(
            "iteration {}: {} affected, remeasure {:.1}ms, relayout {:.1}ms, resolve {:.1}ms",
            m.iteration,
            m.affected_blocks,
            m.remeasure_time.as_secs_f64() * 1000.0,
            m.relayout_time.as_secs_f64() * 1000.0,
            m.resolve_time.as_secs_f64() * 1000.0,
        );
        if m.total_time() > SLOW_ITERATION {
            self.slow_iterations += 1;
            self.trigger(format!(
                "iteration {} took {:.1}ms",
                m.iteration,
                m.total_time().as_secs_f64() * 1000.0
            ));
        }
    }

    fn on_complete(&mut self, s: &PaginationSummary) {
        log::info!(
            "pagination: {} pages, {} iterations, converged={} ({:?}), {:.1}ms",
            s.pages,
            s.iterations,
            s.converged,
            s.reason,
            s.total_time.as_secs_f64() * 1000.0
        );
        if !s.converged {
            self.trigger(format!(
                "layout did not converge after {} iterations ({:?})",
                s.iterations, s.reason
            ));
        }
        let cache = &s.header_footer_cache;
        if cache.lookups() >= MIN_LOOKUPS_FOR_HIT_RATE && cache.hit_rate() < MIN_HIT_RATE {
            self.trigger(format!(
                "header/footer cache hit rate {:.2} over {} lookups",
                cache.hit_rate(),
                cache.lookups()
            ));
        }
        if cache.memory_bytes > s.cache_memory_limit {
            self.trigger(format!(
                "header/footer cache holds {} bytes, limit {}",
                cache.memory_bytes, s.cache_memory_limit
            ));
        }
    }
}

mod common;

use std::time::Duration;

use common::*;
use docxide_layout::header_footer::CacheStats;
use docxide_layout::model::{FieldCode, Paragraph};
use docxide_layout::observe::{
    ConvergenceReason, IterationMetrics, LayoutObserver, LoggingObserver, PaginationSummary,
};
use docxide_layout::{DocumentCaches, EngineOptions, LineMeasurer, paginate};

fn summary(converged: bool, cache: CacheStats) -> PaginationSummary {
    PaginationSummary {
        converged,
        reason: if converged {
            ConvergenceReason::Stable
        } else {
            ConvergenceReason::IterationCap
        },
        iterations: 3,
        pages: 2,
        total_time: Duration::from_millis(5),
        header_footer_cache: cache,
        cache_memory_limit: 1024,
    }
}

#[test]
fn healthy_run_has_no_triggers() {
    init_logging();
    let mut observer = LoggingObserver::new();
    observer.on_iteration(&IterationMetrics {
        iteration: 1,
        affected_blocks: 2,
        remeasure_time: Duration::from_millis(3),
        relayout_time: Duration::from_millis(4),
        resolve_time: Duration::from_millis(1),
    });
    observer.on_complete(&summary(
        true,
        CacheStats {
            hits: 18,
            misses: 2,
            ..CacheStats::default()
        },
    ));
    assert!(observer.triggers.is_empty());
    assert_eq!(observer.slow_iterations, 0);
}

#[test]
fn slow_iteration_triggers() {
    init_logging();
    let mut observer = LoggingObserver::new();
    let metrics = IterationMetrics {
        iteration: 2,
        relayout_time: Duration::from_millis(90),
        resolve_time: Duration::from_millis(20),
        ..IterationMetrics::default()
    };
    assert_eq!(metrics.total_time(), Duration::from_millis(110));
    observer.on_iteration(&metrics);
    assert_eq!(observer.slow_iterations, 1);
    assert_eq!(observer.triggers.len(), 1);
}

#[test]
fn cache_health_triggers() {
    init_logging();
    let mut observer = LoggingObserver::new();
    observer.on_complete(&summary(
        true,
        CacheStats {
            hits: 2,
            misses: 10,
            memory_bytes: 4096,
            ..CacheStats::default()
        },
    ));
    assert_eq!(observer.triggers.len(), 2);
    assert!(observer.triggers[0].contains("hit rate"));
    assert!(observer.triggers[1].contains("4096 bytes"));

    // Too few lookups for the hit rate to count.
    let mut quiet = LoggingObserver::new();
    quiet.on_complete(&summary(
        true,
        CacheStats {
            misses: 3,
            ..CacheStats::default()
        },
    ));
    assert!(quiet.triggers.is_empty());
}

#[test]
fn non_convergence_is_reported_by_the_engine() {
    init_logging();
    let mut blocks = lines(0, 10);
    blocks[2] = block(Paragraph::new(2, vec![text("of "), field(FieldCode::NumPages)]));
    let doc = docxide_layout::model::Document::new(blocks);

    let options = EngineOptions {
        max_iterations: 1,
        ..options()
    };
    let mut caches = DocumentCaches::new(1, &options);
    let mut measurer = LineMeasurer::new(FixedAdvance);
    let mut observer = LoggingObserver::new();
    let result = paginate(&doc, 1, &mut caches, &mut measurer, options, &mut observer)
        .expect("pagination");

    assert!(!result.converged);
    assert_eq!(observer.triggers.len(), 1);
    assert!(observer.triggers[0].contains("did not converge"));
}

pub mod convert;
mod error;
pub mod header_footer;
pub mod layout;
pub mod measure;
pub mod model;
pub mod numbering;
pub mod observe;
pub mod paginate;
pub mod sections;
pub mod typeset;
pub mod units;

pub use error::{Error, Result};
pub use layout::Layout;
pub use measure::{ApproxMetrics, BlockMeasurer, FontFaceMetrics, LineMeasurer, TextMeasurer};
pub use model::Document;
pub use observe::{LayoutObserver, LoggingObserver};
pub use paginate::{DocumentCaches, EngineOptions, PaginationEngine, PaginationResult, paginate};

use std::path::Path;
use std::time::Instant;

/// Paginate a JSON document with a fresh set of caches.
pub fn layout_document_json(
    json: &str,
    text: impl TextMeasurer,
    options: EngineOptions,
) -> Result<PaginationResult> {
    let t0 = Instant::now();

    let doc: Document = serde_json::from_str(json)?;
    let t_parse = t0.elapsed();

    let mut caches = DocumentCaches::new(0, &options);
    let mut measurer = LineMeasurer::new(text);
    let mut observer = LoggingObserver::new();
    let result = paginate(&doc, 0, &mut caches, &mut measurer, options, &mut observer)?;
    let t_total = t0.elapsed();

    log::info!(
        "Timing: parse={:.1}ms, paginate={:.1}ms, total={:.1}ms ({} blocks measured, {} pages)",
        t_parse.as_secs_f64() * 1000.0,
        (t_total - t_parse).as_secs_f64() * 1000.0,
        t_total.as_secs_f64() * 1000.0,
        measurer.measured_blocks,
        result.layout.pages.len(),
    );

    Ok(result)
}

/// Read a JSON document from `input` and write its layout as JSON to `output`.
pub fn layout_file(
    input: &Path,
    output: &Path,
    text: impl TextMeasurer,
    options: EngineOptions,
    pretty: bool,
) -> Result<PaginationResult> {
    let json = std::fs::read_to_string(input)?;
    let result = layout_document_json(&json, text, options)?;
    std::fs::write(output, result.layout.to_json(pretty)?)?;
    Ok(result)
}

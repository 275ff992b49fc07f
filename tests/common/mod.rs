#![allow(dead_code)]

use docxide_layout::measure::{LineMetrics, TextMeasurer};
use docxide_layout::model::{
    Document, FieldCode, FlowBlock, MarginsInput, Paragraph, Run, SectionBreakType, SectionMarker,
};
use docxide_layout::observe::NoopObserver;
use docxide_layout::{DocumentCaches, EngineOptions, LineMeasurer, PaginationResult, paginate};

/// Font size used by every test run: 5px per character, 10px per line.
pub const TEST_FONT_SIZE: f32 = 10.0;
pub const CHAR_WIDTH: f32 = TEST_FONT_SIZE * 0.5;
pub const LINE_HEIGHT: f32 = TEST_FONT_SIZE;

/// Every character advances half the font size; lines are one font size tall.
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedAdvance;

impl TextMeasurer for FixedAdvance {
    fn text_width(&self, text: &str, run: &Run) -> Option<f32> {
        Some(text.chars().count() as f32 * run.font_size * 0.5)
    }

    fn line_metrics(&self, run: &Run) -> LineMetrics {
        LineMetrics {
            ascent: run.font_size * 0.8,
            descent: run.font_size * 0.2,
            line_gap: 0.0,
        }
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn text(s: &str) -> Run {
    Run {
        font_size: TEST_FONT_SIZE,
        ..Run::text(s)
    }
}

pub fn field(code: FieldCode) -> Run {
    Run {
        font_size: TEST_FONT_SIZE,
        ..Run::field(code)
    }
}

pub fn tab() -> Run {
    Run {
        font_size: TEST_FONT_SIZE,
        ..Run::tab()
    }
}

pub fn line_break() -> Run {
    Run {
        font_size: TEST_FONT_SIZE,
        ..Run::line_break()
    }
}

pub fn para(id: u32, s: &str) -> Paragraph {
    Paragraph::new(id, vec![text(s)])
}

pub fn block(p: Paragraph) -> FlowBlock {
    FlowBlock::Paragraph(p)
}

/// `count` one-line paragraphs with ids starting at `first_id`.
pub fn lines(first_id: u32, count: u32) -> Vec<FlowBlock> {
    (0..count)
        .map(|i| block(para(first_id + i, &format!("line {}", first_id + i))))
        .collect()
}

/// A section marker that the analyzer will not discard as empty.
pub fn marker(break_type: SectionBreakType) -> SectionMarker {
    SectionMarker {
        child_count: 1,
        margins: Some(MarginsInput {
            top: Some(96.0),
            right: Some(96.0),
            bottom: Some(96.0),
            left: Some(96.0),
            header: Some(48.0),
            footer: Some(48.0),
        }),
        break_type: Some(break_type),
        ..SectionMarker::default()
    }
}

/// Put `m` on the paragraph at `index`, making it the last of its section.
pub fn end_section(blocks: &mut [FlowBlock], index: usize, m: SectionMarker) {
    if let FlowBlock::Paragraph(p) = &mut blocks[index] {
        p.section_marker = Some(m);
    }
}

pub fn options() -> EngineOptions {
    EngineOptions {
        time_budget: std::time::Duration::from_secs(10),
        ..EngineOptions::default()
    }
}

pub fn run_with(doc: &Document, options: EngineOptions) -> PaginationResult {
    init_logging();
    let mut caches = DocumentCaches::new(1, &options);
    let mut measurer = LineMeasurer::new(FixedAdvance);
    paginate(doc, 1, &mut caches, &mut measurer, options, &mut NoopObserver)
        .expect("pagination failed")
}

pub fn run(doc: &Document) -> PaginationResult {
    run_with(doc, options())
}

/// Ids of the blocks that have a fragment on each page.
pub fn page_blocks(result: &PaginationResult) -> Vec<Vec<u32>> {
    result
        .layout
        .pages
        .iter()
        .map(|p| {
            let mut ids: Vec<u32> = p.fragments.iter().map(|f| f.block_id().0).collect();
            ids.dedup();
            ids
        })
        .collect()
}

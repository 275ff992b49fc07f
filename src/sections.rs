//! Section range analysis.
//!
//! Section properties are end-tagged: the paragraph that *ends* a section
//! carries that section's properties, and the body-level descriptor
//! describes the trailing section.

use std::ops::Range;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{
    ColumnsInput, FlowBlock, HeaderFooterRefs, MarginsInput, Orientation, PageNumbering,
    SectionBreakType, SectionMarker, VerticalAlign,
};
use crate::units::{normalize_margin, normalize_page_dimension};

pub const DEFAULT_PAGE_WIDTH: f32 = 816.0; // US Letter
pub const DEFAULT_PAGE_HEIGHT: f32 = 1056.0;
pub const DEFAULT_MARGIN: f32 = 96.0; // 1 inch
pub const DEFAULT_HEADER_MARGIN: f32 = 48.0;
pub const DEFAULT_COLUMN_GAP: f32 = 48.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl Default for PageSize {
    fn default() -> Self {
        Self {
            width: DEFAULT_PAGE_WIDTH,
            height: DEFAULT_PAGE_HEIGHT,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PageMargins {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
    pub header: f32,
    pub footer: f32,
}

impl Default for PageMargins {
    fn default() -> Self {
        Self {
            top: DEFAULT_MARGIN,
            right: DEFAULT_MARGIN,
            bottom: DEFAULT_MARGIN,
            left: DEFAULT_MARGIN,
            header: DEFAULT_HEADER_MARGIN,
            footer: DEFAULT_HEADER_MARGIN,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Column {
    /// Offset from the left page margin.
    pub x: f32,
    pub width: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnLayout {
    pub columns: Vec<Column>,
    pub separator: bool,
}

impl ColumnLayout {
    pub fn single(content_width: f32) -> Self {
        Self {
            columns: vec![Column {
                x: 0.0,
                width: content_width,
            }],
            separator: false,
        }
    }

    fn resolve(input: Option<&ColumnsInput>, content_width: f32) -> Self {
        let Some(cfg) = input else {
            return Self::single(content_width);
        };
        if !cfg.columns.is_empty() {
            let mut x = 0.0;
            let columns = cfg
                .columns
                .iter()
                .map(|c| {
                    let col = Column {
                        x,
                        width: normalize_margin(c.width).max(1.0),
                    };
                    x += col.width + normalize_margin(c.space);
                    col
                })
                .collect();
            return Self {
                columns,
                separator: cfg.separator,
            };
        }
        if cfg.count <= 1 {
            return Self::single(content_width);
        }
        let gap = cfg.gap.map(normalize_margin).unwrap_or(DEFAULT_COLUMN_GAP);
        let n = cfg.count as f32;
        let width = ((content_width - (n - 1.0) * gap) / n).max(1.0);
        let columns = (0..cfg.count)
            .map(|i| Column {
                x: i as f32 * (width + gap),
                width,
            })
            .collect();
        Self {
            columns,
            separator: cfg.separator,
        }
    }

    pub fn count(&self) -> usize {
        self.columns.len()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SectionRange {
    /// Emission order, not the index of the source paragraph.
    pub section_index: usize,
    /// First top-level block of the section (inclusive).
    pub start_paragraph_index: usize,
    /// Block carrying the section marker (inclusive). For a trailing range
    /// with no blocks left this equals `start_paragraph_index`, which then
    /// points past the end of the document.
    pub end_paragraph_index: usize,
    pub margins: PageMargins,
    pub page_size: PageSize,
    pub orientation: Orientation,
    pub columns: ColumnLayout,
    pub break_type: SectionBreakType,
    pub title_pg: bool,
    pub header_refs: HeaderFooterRefs,
    pub footer_refs: HeaderFooterRefs,
    pub numbering: PageNumbering,
    pub v_align: VerticalAlign,
}

impl SectionRange {
    /// Geometry used when a document carries no section information at all.
    pub fn default_for(block_count: usize) -> Self {
        let page_size = PageSize::default();
        let margins = PageMargins::default();
        Self {
            section_index: 0,
            start_paragraph_index: 0,
            end_paragraph_index: block_count.saturating_sub(1),
            columns: ColumnLayout::single(page_size.width - margins.left - margins.right),
            margins,
            page_size,
            orientation: Orientation::Portrait,
            break_type: SectionBreakType::NextPage,
            title_pg: false,
            header_refs: HeaderFooterRefs::default(),
            footer_refs: HeaderFooterRefs::default(),
            numbering: PageNumbering::default(),
            v_align: VerticalAlign::Top,
        }
    }

    /// Blocks of the section, clipped to a document of `len` blocks.
    pub fn block_span(&self, len: usize) -> Range<usize> {
        let start = self.start_paragraph_index.min(len);
        let end = (self.end_paragraph_index + 1).min(len).max(start);
        start..end
    }

    pub fn contains(&self, block_index: usize) -> bool {
        (self.start_paragraph_index..=self.end_paragraph_index).contains(&block_index)
    }

    pub fn content_width(&self) -> f32 {
        (self.page_size.width - self.margins.left - self.margins.right).max(1.0)
    }

    pub fn content_height(&self) -> f32 {
        (self.page_size.height - self.margins.top - self.margins.bottom).max(1.0)
    }

    /// A continuous break still needs a fresh page when the sheet changes.
    pub fn starts_new_page_after(&self, previous: &SectionRange) -> bool {
        match self.break_type {
            SectionBreakType::Continuous => {
                self.page_size != previous.page_size || self.orientation != previous.orientation
            }
            _ => true,
        }
    }
}

/// Empty section markers are noise from the converter, except that the very
/// last one stands in for a missing body descriptor.
fn should_ignore_marker(marker: &SectionMarker, is_last: bool, has_body: bool) -> bool {
    let empty = marker.child_count == 0 && marker.margins.is_none();
    empty && !(is_last && !has_body)
}

fn resolve_margins(input: Option<&MarginsInput>) -> PageMargins {
    let d = PageMargins::default();
    let Some(m) = input else {
        return d;
    };
    let pick = |v: Option<f32>, default: f32| v.map(normalize_margin).unwrap_or(default);
    PageMargins {
        top: pick(m.top, d.top),
        right: pick(m.right, d.right),
        bottom: pick(m.bottom, d.bottom),
        left: pick(m.left, d.left),
        header: pick(m.header, d.header),
        footer: pick(m.footer, d.footer),
    }
}

fn resolve_page(marker: &SectionMarker) -> (PageSize, Orientation) {
    let mut size = marker
        .page_size
        .as_ref()
        .map(|s| PageSize {
            width: normalize_page_dimension(s.width),
            height: normalize_page_dimension(s.height),
        })
        .filter(|s| s.width > 0.0 && s.height > 0.0)
        .unwrap_or_default();
    let orientation = marker.orientation.unwrap_or(if size.width > size.height {
        Orientation::Landscape
    } else {
        Orientation::Portrait
    });
    let needs_swap = match orientation {
        Orientation::Landscape => size.width < size.height,
        Orientation::Portrait => size.width > size.height,
    };
    if needs_swap {
        std::mem::swap(&mut size.width, &mut size.height);
    }
    (size, orientation)
}

fn inherit(refs: &HeaderFooterRefs, previous: Option<&HeaderFooterRefs>) -> HeaderFooterRefs {
    let Some(prev) = previous else {
        return refs.clone();
    };
    HeaderFooterRefs {
        default: refs.default.clone().or_else(|| prev.default.clone()),
        first: refs.first.clone().or_else(|| prev.first.clone()),
        even: refs.even.clone().or_else(|| prev.even.clone()),
    }
}

fn build_range(
    section_index: usize,
    start: usize,
    end: usize,
    marker: &SectionMarker,
    break_type: SectionBreakType,
    previous: Option<&SectionRange>,
) -> SectionRange {
    let margins = resolve_margins(marker.margins.as_ref());
    let (page_size, orientation) = resolve_page(marker);
    let content_width = (page_size.width - margins.left - margins.right).max(1.0);
    SectionRange {
        section_index,
        start_paragraph_index: start,
        end_paragraph_index: end,
        margins,
        page_size,
        orientation,
        columns: ColumnLayout::resolve(marker.columns.as_ref(), content_width),
        break_type,
        title_pg: marker.title_pg,
        header_refs: inherit(&marker.header_refs, previous.map(|p| &p.header_refs)),
        footer_refs: inherit(&marker.footer_refs, previous.map(|p| &p.footer_refs)),
        numbering: marker.numbering.clone().unwrap_or_default(),
        v_align: marker.v_align.unwrap_or_default(),
    }
}

/// Derive page geometry per document region from end-tagged section markers.
pub fn analyze_sections(blocks: &[FlowBlock], body: Option<&SectionMarker>) -> Vec<SectionRange> {
    let markers: Vec<(usize, &SectionMarker)> = blocks
        .iter()
        .enumerate()
        .filter_map(|(i, b)| b.section_marker().map(|m| (i, m)))
        .collect();

    let mut ranges: Vec<SectionRange> = Vec::new();
    let mut next_start = 0usize;

    for (n, &(idx, marker)) in markers.iter().enumerate() {
        let is_last = n + 1 == markers.len();
        if should_ignore_marker(marker, is_last, body.is_some()) {
            log::debug!("ignoring empty section marker on block {idx}");
            continue;
        }
        let range = build_range(
            ranges.len(),
            next_start,
            idx,
            marker,
            marker.break_type.unwrap_or_default(),
            ranges.last(),
        );
        ranges.push(range);
        next_start = idx + 1;
    }

    if let Some(body) = body {
        // Emitted even when nothing follows the last marker: a page-size or
        // orientation change in the trailing section must still break the page.
        let end = blocks.len().max(next_start + 1) - 1;
        let range = build_range(
            ranges.len(),
            next_start,
            end,
            body,
            body.break_type.unwrap_or_default(),
            ranges.last(),
        );
        ranges.push(range);
    } else if let Some(last) = ranges.last()
        && next_start < blocks.len()
    {
        let mut trailing = last.clone();
        trailing.section_index = ranges.len();
        trailing.start_paragraph_index = next_start;
        trailing.end_paragraph_index = blocks.len() - 1;
        trailing.break_type = SectionBreakType::Continuous;
        trailing.title_pg = false;
        trailing.numbering.start = None;
        ranges.push(trailing);
    }

    log::debug!(
        "analyze_sections: {} markers, {} ranges over {} blocks",
        markers.len(),
        ranges.len(),
        blocks.len()
    );
    ranges
}

/// Check caller-supplied ranges: ordered, contiguous indices, sequential section numbers,
/// and every one of `block_count` blocks covered.
pub fn validate_ranges(ranges: &[SectionRange], block_count: usize) -> Result<()> {
    let mut expected_start = 0usize;
    for (i, range) in ranges.iter().enumerate() {
        if range.section_index != i {
            return Err(Error::InvalidSectionRanges(format!(
                "range {i} has section_index {}",
                range.section_index
            )));
        }
        if range.start_paragraph_index != expected_start {
            return Err(Error::InvalidSectionRanges(format!(
                "section {i} starts at block {} but block {expected_start} was expected",
                range.start_paragraph_index
            )));
        }
        if range.end_paragraph_index < range.start_paragraph_index {
            return Err(Error::InvalidSectionRanges(format!(
                "section {i} ends before it starts ({}..={})",
                range.start_paragraph_index, range.end_paragraph_index
            )));
        }
        if range.columns.columns.is_empty() {
            return Err(Error::InvalidSectionRanges(format!("section {i} has no columns")));
        }
        expected_start = range.end_paragraph_index + 1;
    }
    if !ranges.is_empty() && expected_start < block_count {
        return Err(Error::InvalidSectionRanges(format!(
            "blocks {expected_start}..{block_count} are not covered by any section"
        )));
    }
    Ok(())
}

pub fn section_for_block(ranges: &[SectionRange], block_index: usize) -> usize {
    ranges
        .iter()
        .position(|r| r.contains(block_index))
        .unwrap_or(ranges.len().saturating_sub(1))
}

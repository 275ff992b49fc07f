//! Layout output: pages of absolutely positioned fragments, in CSS pixels
//! with the origin at the top-left corner of each page.

pub mod flow;
pub mod table;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::Result;
use crate::measure::LineSegment;
use crate::model::{BlockId, Orientation};
use crate::sections::{PageMargins, PageSize};
use crate::typeset::borders::CellBorders;
use crate::typeset::list::MarkerPlacement;

pub use flow::{FlowInput, FlowOutput, PageStart, layout_blocks, relayout_from};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PositionedLine {
    pub line_index: usize,
    pub x: f32,
    /// Top of the line box.
    pub y: f32,
    pub baseline: f32,
    pub width: f32,
    pub height: f32,
    pub word_spacing: f32,
    pub segments: Vec<LineSegment>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParagraphFragment {
    pub block_id: BlockId,
    pub from_line: usize,
    pub to_line: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub lines: Vec<PositionedLine>,
    /// Only on the fragment holding the paragraph's first line.
    pub marker: Option<MarkerPlacement>,
    pub continues_from_previous: bool,
    pub continues_on_next: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CellParagraph {
    pub block_id: BlockId,
    pub lines: Vec<PositionedLine>,
    pub marker: Option<MarkerPlacement>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CellBox {
    /// First grid column the cell occupies.
    pub col: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub borders: CellBorders,
    pub paragraphs: Vec<CellParagraph>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RowBox {
    pub row_index: usize,
    pub y: f32,
    pub height: f32,
    pub repeated_header: bool,
    pub cells: Vec<CellBox>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TableFragment {
    pub block_id: BlockId,
    pub from_row: usize,
    pub to_row: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub rows: Vec<RowBox>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImageFragment {
    pub block_id: BlockId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fragment {
    Paragraph(ParagraphFragment),
    Table(TableFragment),
    Image(ImageFragment),
}

impl Fragment {
    pub fn block_id(&self) -> BlockId {
        match self {
            Fragment::Paragraph(f) => f.block_id,
            Fragment::Table(f) => f.block_id,
            Fragment::Image(f) => f.block_id,
        }
    }

    pub fn bottom(&self) -> f32 {
        match self {
            Fragment::Paragraph(f) => f.y + f.height,
            Fragment::Table(f) => f.y + f.height,
            Fragment::Image(f) => f.y + f.height,
        }
    }

    pub(crate) fn shift_y(&mut self, dy: f32) {
        match self {
            Fragment::Paragraph(f) => {
                f.y += dy;
                for line in &mut f.lines {
                    line.y += dy;
                    line.baseline += dy;
                }
            }
            Fragment::Table(f) => {
                f.y += dy;
                for row in &mut f.rows {
                    row.y += dy;
                    for cell in &mut row.cells {
                        cell.y += dy;
                        for line in cell.paragraphs.iter_mut().flat_map(|p| p.lines.iter_mut()) {
                            line.y += dy;
                            line.baseline += dy;
                        }
                    }
                }
            }
            Fragment::Image(f) => f.y += dy,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderFooterVariant {
    Default,
    First,
    Even,
}

/// Header or footer content placed on one page.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PageRegion {
    pub variant: HeaderFooterVariant,
    pub ref_id: String,
    pub y: f32,
    pub height: f32,
    pub fragments: Vec<Fragment>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page {
    /// Physical page number, 1-based.
    pub number: u32,
    /// Number as printed, after section restarts and formats.
    pub display_number: String,
    pub section_index: usize,
    pub first_of_section: bool,
    /// Sections with content on this page, in flow order. More than one when
    /// a continuous section starts part way down.
    pub sections: Vec<usize>,
    pub size: PageSize,
    pub margins: PageMargins,
    pub orientation: Orientation,
    /// Inserted to satisfy an odd/even section break.
    pub blank: bool,
    pub fragments: Vec<Fragment>,
    pub header: Option<PageRegion>,
    pub footer: Option<PageRegion>,
}

impl Page {
    pub fn contains_block(&self, id: BlockId) -> bool {
        self.fragments.iter().any(|f| f.block_id() == id)
    }
}

/// Number of pages each section appears on. A page shared by two sections
/// counts for both.
pub fn section_page_counts(pages: &[Page]) -> BTreeMap<usize, usize> {
    let mut counts = BTreeMap::new();
    for page in pages {
        *counts.entry(page.section_index).or_default() += 1;
        for &s in &page.sections {
            if s != page.section_index {
                *counts.entry(s).or_default() += 1;
            }
        }
    }
    counts
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedToken {
    pub key: String,
    /// Value the pages were rendered with.
    pub value: String,
    /// Value read from the final layout, when the loop stopped before
    /// rendering it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Layout {
    pub page_size: Option<PageSize>,
    pub pages: Vec<Page>,
    /// Token values as rendered, sorted by key.
    pub tokens: Vec<ResolvedToken>,
}

impl Layout {
    pub fn to_json(&self, pretty: bool) -> Result<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }

    /// Index of the first page holding a fragment of `id`.
    pub fn page_of(&self, id: BlockId) -> Option<usize> {
        self.pages.iter().position(|p| p.contains_block(id))
    }
}

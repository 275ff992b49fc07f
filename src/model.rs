//! Normalized document model consumed by the layout engine.
//!
//! Everything here is produced by the format converter and treated as
//! immutable for the duration of one layout pass. Lengths are CSS pixels.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    #[serde(alias = "start")]
    Left,
    Center,
    #[serde(alias = "end")]
    Right,
    Justify,
    /// Legacy spelling of `Justify` kept distinct so callers can round-trip it.
    Both,
}

impl Alignment {
    pub fn is_justified(self) -> bool {
        matches!(self, Alignment::Justify | Alignment::Both)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "value", rename_all = "snake_case")]
pub enum LineSpacing {
    Auto(f32),    // multiplier (e.g. 1.0 = single, 1.15 = default)
    Exact(f32),   // fixed height in px
    AtLeast(f32), // minimum height in px
}

impl Default for LineSpacing {
    fn default() -> Self {
        LineSpacing::Auto(1.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCode {
    Page,
    NumPages,
    SectionPages,
    /// Page on which the named bookmark lands (TOC entries, cross references).
    PageRef(String),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    #[default]
    Text,
    Tab,
    LineBreak,
    Field(FieldCode),
}

pub const DEFAULT_FONT_FAMILY: &str = "Calibri";
pub const DEFAULT_FONT_SIZE: f32 = 14.667; // 11pt

fn default_font_family() -> String {
    DEFAULT_FONT_FAMILY.to_string()
}

fn default_font_size() -> f32 {
    DEFAULT_FONT_SIZE
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Run {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub kind: RunKind,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub letter_spacing: f32,
}

impl Default for Run {
    fn default() -> Self {
        Self {
            text: String::new(),
            kind: RunKind::Text,
            font_family: default_font_family(),
            font_size: DEFAULT_FONT_SIZE,
            bold: false,
            italic: false,
            letter_spacing: 0.0,
        }
    }
}

impl Run {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn tab() -> Self {
        Self {
            kind: RunKind::Tab,
            ..Self::default()
        }
    }

    pub fn line_break() -> Self {
        Self {
            kind: RunKind::LineBreak,
            ..Self::default()
        }
    }

    pub fn field(code: FieldCode) -> Self {
        Self {
            kind: RunKind::Field(code),
            ..Self::default()
        }
    }

    pub fn field_code(&self) -> Option<&FieldCode> {
        match &self.kind {
            RunKind::Field(code) => Some(code),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabKind {
    #[default]
    #[serde(alias = "left")]
    Start,
    Center,
    #[serde(alias = "right")]
    End,
    Decimal,
    Bar,
    Clear,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TabStop {
    pub pos: f32,
    #[serde(default)]
    pub kind: TabKind,
    #[serde(default)]
    pub leader: Option<char>,
    #[serde(default)]
    pub decimal_char: Option<char>,
}

impl TabStop {
    pub fn new(pos: f32, kind: TabKind) -> Self {
        Self {
            pos,
            kind,
            leader: None,
            decimal_char: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerJustification {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerSuffix {
    #[default]
    Tab,
    Space,
    Nothing,
}

/// Resolved list marker of one paragraph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListMarkerSpec {
    pub marker_text: Option<String>,
    pub glyph_width_px: Option<f32>,
    /// Width of the marker box as stored by the converter; last resort before zero.
    pub box_width_px: Option<f32>,
    pub justification: MarkerJustification,
    pub suffix: MarkerSuffix,
    pub gutter_width_px: Option<f32>,
    pub first_line_indent_mode: bool,
    pub text_start_x: Option<f32>,
    pub text_start_px: Option<f32>,
    pub tabs_px: Option<Vec<f32>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberingRef {
    pub num_id: String,
    #[serde(default)]
    pub level: u8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NumberFormat {
    #[default]
    Decimal,
    DecimalZero,
    LowerLetter,
    UpperLetter,
    LowerRoman,
    UpperRoman,
    Bullet,
    None,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelDefinition {
    pub level: u8,
    #[serde(default)]
    pub format: NumberFormat,
    /// Level template such as `"%1.%2."`; bullet glyph for `Bullet`.
    #[serde(default)]
    pub text: String,
    #[serde(default = "one")]
    pub start: u32,
    #[serde(default)]
    pub indent_left: f32,
    #[serde(default)]
    pub hanging_indent: f32,
    #[serde(default)]
    pub first_line_indent: f32,
    #[serde(default)]
    pub justification: MarkerJustification,
    #[serde(default)]
    pub suffix: MarkerSuffix,
    #[serde(default)]
    pub first_line_indent_mode: bool,
    #[serde(default)]
    pub text_start_px: Option<f32>,
}

fn one() -> u32 {
    1
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ListDefinition {
    pub levels: Vec<LevelDefinition>,
}

impl ListDefinition {
    pub fn level(&self, level: u8) -> Option<&LevelDefinition> {
        self.levels.iter().find(|l| l.level == level)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SectionBreakType {
    #[default]
    NextPage,
    Continuous,
    OddPage,
    EvenPage,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalAlign {
    #[default]
    Top,
    Center,
    Bottom,
    Both,
}

/// Margin metadata as carried on a section marker. Values may still be in
/// source units; see [`crate::units::normalize_margin`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginsInput {
    pub top: Option<f32>,
    pub right: Option<f32>,
    pub bottom: Option<f32>,
    pub left: Option<f32>,
    pub header: Option<f32>,
    pub footer: Option<f32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageSizeInput {
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnInput {
    pub width: f32,
    #[serde(default)]
    pub space: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnsInput {
    pub count: u32,
    pub gap: Option<f32>,
    /// Explicit unequal columns; when empty the columns are equal width.
    pub columns: Vec<ColumnInput>,
    pub separator: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderFooterRefs {
    pub default: Option<String>,
    pub first: Option<String>,
    pub even: Option<String>,
}

impl HeaderFooterRefs {
    pub fn is_empty(&self) -> bool {
        self.default.is_none() && self.first.is_none() && self.even.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageNumbering {
    pub format: NumberFormat,
    pub start: Option<u32>,
}

/// Section properties attached to the paragraph that ends a section
/// (end-tagged), or to the document body for the trailing section.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionMarker {
    /// Number of raw child elements the source section node had.
    pub child_count: usize,
    pub margins: Option<MarginsInput>,
    pub page_size: Option<PageSizeInput>,
    pub orientation: Option<Orientation>,
    pub columns: Option<ColumnsInput>,
    pub break_type: Option<SectionBreakType>,
    pub title_pg: bool,
    pub header_refs: HeaderFooterRefs,
    pub footer_refs: HeaderFooterRefs,
    pub numbering: Option<PageNumbering>,
    pub v_align: Option<VerticalAlign>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paragraph {
    pub id: BlockId,
    pub runs: Vec<Run>,
    pub alignment: Alignment,
    pub indent_left: f32,
    pub indent_right: f32,
    pub first_line_indent: f32,
    pub hanging_indent: f32,
    pub space_before: f32,
    pub space_after: f32,
    pub line_spacing: Option<LineSpacing>,
    pub tab_stops: Vec<TabStop>,
    pub page_break_before: bool,
    pub column_break_before: bool,
    pub keep_lines: bool,
    pub keep_next: bool,
    pub bookmark: Option<String>,
    pub numbering: Option<NumberingRef>,
    pub marker: Option<ListMarkerSpec>,
    pub section_marker: Option<SectionMarker>,
}

impl Paragraph {
    pub fn new(id: u32, runs: Vec<Run>) -> Self {
        Self {
            id: BlockId(id),
            runs,
            ..Self::default()
        }
    }

    pub fn is_list_item(&self) -> bool {
        self.marker.is_some() || self.numbering.is_some()
    }

    /// A paragraph that ends with a soft break keeps its last visible line justified.
    pub fn ends_with_line_break(&self) -> bool {
        self.runs
            .iter()
            .rev()
            .find(|r| !(r.kind == RunKind::Text && r.text.is_empty()))
            .is_some_and(|r| r.kind == RunKind::LineBreak)
    }
}

/// Raw border as delivered by the converter; sanitized by `typeset::borders`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderValue {
    pub style: Option<String>,
    pub width: Option<f32>,
    pub color: Option<String>,
    pub space: Option<f32>,
    pub none: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableBorders {
    pub top: Option<BorderValue>,
    pub bottom: Option<BorderValue>,
    pub left: Option<BorderValue>,
    pub right: Option<BorderValue>,
    pub inside_h: Option<BorderValue>,
    pub inside_v: Option<BorderValue>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellMargins {
    pub top: f32,
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
}

impl Default for CellMargins {
    fn default() -> Self {
        Self {
            top: 0.0,
            left: 7.2,
            bottom: 0.0,
            right: 7.2,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellVAlign {
    #[default]
    Top,
    Center,
    Bottom,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
    #[serde(default = "one_span")]
    pub grid_span: u16,
    #[serde(default)]
    pub v_align: CellVAlign,
}

fn one_span() -> u16 {
    1
}

impl TableCell {
    pub fn new(paragraphs: Vec<Paragraph>) -> Self {
        Self {
            paragraphs,
            grid_span: 1,
            v_align: CellVAlign::Top,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
    pub height: Option<f32>,
    pub height_exact: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Table {
    pub id: BlockId,
    pub col_widths: Vec<f32>,
    pub rows: Vec<TableRow>,
    pub borders: TableBorders,
    pub indent: f32,
    pub cell_margins: CellMargins,
    /// Leading rows repeated at the top of every continuation page.
    pub header_rows: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageBlock {
    pub id: BlockId,
    pub width: f32,
    pub height: f32,
    pub alignment: Alignment,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowBlock {
    Paragraph(Paragraph),
    Table(Table),
    Image(ImageBlock),
}

impl FlowBlock {
    pub fn id(&self) -> BlockId {
        match self {
            FlowBlock::Paragraph(p) => p.id,
            FlowBlock::Table(t) => t.id,
            FlowBlock::Image(i) => i.id,
        }
    }

    pub fn as_paragraph(&self) -> Option<&Paragraph> {
        match self {
            FlowBlock::Paragraph(p) => Some(p),
            _ => None,
        }
    }

    pub fn section_marker(&self) -> Option<&SectionMarker> {
        self.as_paragraph().and_then(|p| p.section_marker.as_ref())
    }

    /// Every run of the block, including runs nested in table cells.
    pub fn runs(&self) -> Box<dyn Iterator<Item = &Run> + '_> {
        match self {
            FlowBlock::Paragraph(p) => Box::new(p.runs.iter()),
            FlowBlock::Table(t) => Box::new(
                t.rows
                    .iter()
                    .flat_map(|row| row.cells.iter())
                    .flat_map(|cell| cell.paragraphs.iter())
                    .flat_map(|p| p.runs.iter()),
            ),
            FlowBlock::Image(_) => Box::new(std::iter::empty()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderFooterDef {
    pub blocks: Vec<FlowBlock>,
}

fn default_tab_interval() -> f32 {
    48.0 // 0.5 inches
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub blocks: Vec<FlowBlock>,
    #[serde(default)]
    pub body_section: Option<SectionMarker>,
    /// Header and footer parts keyed by the reference ids used in section markers.
    #[serde(default)]
    pub header_footers: BTreeMap<String, HeaderFooterDef>,
    /// List definitions keyed by numbering id.
    #[serde(default)]
    pub lists: BTreeMap<String, ListDefinition>,
    #[serde(default)]
    pub even_and_odd_headers: bool,
    #[serde(default = "default_tab_interval")]
    pub default_tab_interval: f32,
    #[serde(default)]
    pub line_spacing: LineSpacing,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            blocks: Vec::new(),
            body_section: None,
            header_footers: BTreeMap::new(),
            lists: BTreeMap::new(),
            even_and_odd_headers: false,
            default_tab_interval: default_tab_interval(),
            line_spacing: LineSpacing::default(),
        }
    }
}

impl Document {
    pub fn new(blocks: Vec<FlowBlock>) -> Self {
        Self {
            blocks,
            ..Self::default()
        }
    }

    pub fn block_index(&self, id: BlockId) -> Option<usize> {
        self.blocks.iter().position(|b| b.id() == id)
    }
}

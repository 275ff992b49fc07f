//! Block measurement.
//!
//! The engine never shapes text itself; it asks a [`BlockMeasurer`] for a
//! [`Measure`] of each block. [`LineMeasurer`] is the stock implementation:
//! greedy word wrap over a glyph-level [`TextMeasurer`].

pub mod fonts;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{
    BlockId, FieldCode, FlowBlock, ImageBlock, LineSpacing, Paragraph, Run, RunKind, TabKind,
    Table,
};
use crate::numbering::ResolvedList;
use crate::typeset::list::{
    MarkerPlacement, TextIndentParams, calculate_text_start_indent, resolve_list_layout,
    resolve_marker_width,
};
use crate::typeset::tabs::{
    LineItem, resolve_line_tabs, resolve_tab_stop, separator_offsets,
};

pub use fonts::{ApproxMetrics, FontFaceMetrics};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineMetrics {
    pub ascent: f32,
    pub descent: f32,
    pub line_gap: f32,
}

impl LineMetrics {
    pub fn natural_height(&self) -> f32 {
        self.ascent + self.descent + self.line_gap
    }
}

/// Glyph-level measurement service.
pub trait TextMeasurer {
    /// Advance width of `text` in the run's font; `None` when unavailable.
    fn text_width(&self, text: &str, run: &Run) -> Option<f32>;
    fn line_metrics(&self, run: &Run) -> LineMetrics;
}

/// Supplies display text for page-dependent fields while measuring.
pub trait FieldResolver {
    fn field_text(&self, block: BlockId, code: &FieldCode) -> String;
}

/// Every field renders as the same fixed text.
pub struct FixedFields(pub String);

impl FieldResolver for FixedFields {
    fn field_text(&self, _block: BlockId, _code: &FieldCode) -> String {
        self.0.clone()
    }
}

pub struct MeasureContext<'a> {
    /// Width of the column the block is laid out in.
    pub available_width: f32,
    pub fields: &'a dyn FieldResolver,
    pub lists: &'a BTreeMap<BlockId, ResolvedList>,
    pub default_tab_interval: f32,
    pub line_spacing: LineSpacing,
}

/// Block-level measurement collaborator.
pub trait BlockMeasurer {
    fn measure(&mut self, block: &FlowBlock, ctx: &MeasureContext<'_>) -> Measure;
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SegmentKind {
    Text,
    Field,
    Tab { leader: Option<char> },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LineSegment {
    pub run: usize,
    pub kind: SegmentKind,
    pub text: String,
    /// Natural x relative to the column's left edge.
    pub x: f32,
    pub width: f32,
    /// Justifiable spaces to the left of this segment on its line.
    pub space_index: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MeasuredLine {
    pub segments: Vec<LineSegment>,
    /// Text start relative to the column's left edge.
    pub x: f32,
    /// Natural width from `x` to the end of the last segment.
    pub width: f32,
    /// Width between `x` and the right indent.
    pub available_width: f32,
    pub ascent: f32,
    pub height: f32,
    pub space_count: usize,
    pub has_tabs: bool,
    pub ends_with_break: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParagraphMeasure {
    pub lines: Vec<MeasuredLine>,
    pub marker: Option<MarkerPlacement>,
}

impl ParagraphMeasure {
    pub fn height(&self) -> f32 {
        self.lines.iter().map(|l| l.height).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CellMeasure {
    pub paragraphs: Vec<ParagraphMeasure>,
    pub width: f32,
    pub content_height: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RowMeasure {
    pub cells: Vec<CellMeasure>,
    pub height: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TableMeasure {
    pub col_widths: Vec<f32>,
    pub rows: Vec<RowMeasure>,
}

impl TableMeasure {
    pub fn width(&self) -> f32 {
        self.col_widths.iter().sum()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImageMeasure {
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Measure {
    Paragraph(ParagraphMeasure),
    Table(TableMeasure),
    Image(ImageMeasure),
}

impl Measure {
    pub fn height(&self) -> f32 {
        match self {
            Measure::Paragraph(p) => p.height(),
            Measure::Table(t) => t.rows.iter().map(|r| r.height).sum(),
            Measure::Image(i) => i.height,
        }
    }
}

enum Atom {
    Word {
        run: usize,
        text: String,
        width: f32,
        separators: Vec<(char, f32)>,
        field: bool,
    },
    Space {
        width: f32,
    },
    Tab {
        run: usize,
    },
    Break,
}

enum Placed {
    Word {
        run: usize,
        text: String,
        width: f32,
        separators: Vec<(char, f32)>,
        field: bool,
    },
    Space(f32),
    Tab {
        run: usize,
    },
}

struct LineBuilder {
    placed: Vec<Placed>,
    runs: Vec<usize>,
    start_x: f32,
    pen: f32,
    pending_space: f32,
}

impl LineBuilder {
    fn new(start_x: f32) -> Self {
        Self {
            placed: Vec::new(),
            runs: Vec::new(),
            start_x,
            pen: start_x,
            pending_space: 0.0,
        }
    }

    fn has_content(&self) -> bool {
        !self.placed.is_empty()
    }
}

/// Greedy line breaker over a [`TextMeasurer`].
pub struct LineMeasurer<T> {
    text: T,
    /// Blocks measured so far; lets callers verify remeasure is incremental.
    pub measured_blocks: u64,
}

impl<T: TextMeasurer> LineMeasurer<T> {
    pub fn new(text: T) -> Self {
        Self {
            text,
            measured_blocks: 0,
        }
    }

    fn width_of(&self, text: &str, run: &Run) -> f32 {
        let w = self
            .text
            .text_width(text, run)
            .filter(|w| w.is_finite())
            .unwrap_or(0.0);
        w + run.letter_spacing * text.chars().count() as f32
    }

    fn word_atom(&self, run_idx: usize, run: &Run, text: &str, field: bool) -> Atom {
        let width = self.width_of(text, run);
        let separators = separator_offsets(text, |prefix| self.width_of(prefix, run));
        Atom::Word {
            run: run_idx,
            text: text.to_string(),
            width,
            separators,
            field,
        }
    }

    /// Split runs into words, spaces, tabs and breaks. Words from adjacent
    /// runs with no whitespace between them stay glued.
    fn atoms(&self, para: &Paragraph, fields: &dyn FieldResolver) -> Vec<Atom> {
        let mut atoms = Vec::new();
        for (run_idx, run) in para.runs.iter().enumerate() {
            match &run.kind {
                RunKind::Tab => atoms.push(Atom::Tab { run: run_idx }),
                RunKind::LineBreak => atoms.push(Atom::Break),
                RunKind::Field(code) => {
                    let text = fields.field_text(para.id, code);
                    atoms.push(self.word_atom(run_idx, run, &text, true));
                }
                RunKind::Text => {
                    let space_w = self.width_of(" ", run);
                    let mut word_start: Option<usize> = None;
                    let mut in_space = false;
                    for (i, ch) in run.text.char_indices() {
                        if ch.is_whitespace() {
                            if let Some(s) = word_start.take() {
                                atoms.push(self.word_atom(run_idx, run, &run.text[s..i], false));
                            }
                            if !in_space {
                                atoms.push(Atom::Space { width: space_w });
                                in_space = true;
                            }
                        } else {
                            in_space = false;
                            word_start.get_or_insert(i);
                        }
                    }
                    if let Some(s) = word_start {
                        atoms.push(self.word_atom(run_idx, run, &run.text[s..], false));
                    }
                }
            }
        }
        atoms
    }

    fn finish_line(
        &self,
        mut line: LineBuilder,
        para: &Paragraph,
        ctx: &MeasureContext<'_>,
        right_edge: f32,
        ends_with_break: bool,
    ) -> MeasuredLine {
        while matches!(line.placed.last(), Some(Placed::Space(_))) {
            line.placed.pop();
        }

        let items: Vec<LineItem> = line
            .placed
            .iter()
            .map(|p| match p {
                Placed::Word { width, separators, .. } => LineItem::Text {
                    width: *width,
                    separators: separators.clone(),
                },
                Placed::Space(w) => LineItem::text(*w),
                Placed::Tab { .. } => LineItem::Tab,
            })
            .collect();
        let resolution = resolve_line_tabs(
            &items,
            line.start_x,
            &para.tab_stops,
            ctx.default_tab_interval,
        );

        let mut segments = Vec::new();
        let mut spaces = 0usize;
        let mut tab_iter = resolution.tabs.iter();
        for (i, placed) in line.placed.iter().enumerate() {
            let x = resolution.item_x[i];
            match placed {
                Placed::Space(_) => spaces += 1,
                Placed::Word {
                    run,
                    text,
                    width,
                    field,
                    ..
                } => segments.push(LineSegment {
                    run: *run,
                    kind: if *field { SegmentKind::Field } else { SegmentKind::Text },
                    text: text.clone(),
                    x,
                    width: *width,
                    space_index: spaces,
                }),
                Placed::Tab { run } => {
                    if let Some(tab) = tab_iter.next() {
                        segments.push(LineSegment {
                            run: *run,
                            kind: SegmentKind::Tab {
                                leader: tab.stop.leader,
                            },
                            text: String::new(),
                            x: tab.from_x,
                            width: tab.width(),
                            space_index: spaces,
                        });
                    }
                }
            }
        }

        let line_runs: Vec<&Run> = if line.runs.is_empty() {
            para.runs.first().into_iter().collect()
        } else {
            line.runs.iter().filter_map(|&r| para.runs.get(r)).collect()
        };
        let spacing = para.line_spacing.unwrap_or(ctx.line_spacing);
        let (ascent, height) = self.line_height(&line_runs, spacing);

        MeasuredLine {
            x: line.start_x,
            width: (resolution.end_x - line.start_x).max(0.0),
            available_width: (right_edge - line.start_x).max(0.0),
            ascent,
            height,
            space_count: spaces,
            has_tabs: !resolution.tabs.is_empty(),
            ends_with_break,
            segments,
        }
    }

    fn line_height(&self, runs: &[&Run], spacing: LineSpacing) -> (f32, f32) {
        let default_run = Run::default();
        let metrics: Vec<LineMetrics> = if runs.is_empty() {
            vec![self.text.line_metrics(&default_run)]
        } else {
            runs.iter().map(|r| self.text.line_metrics(r)).collect()
        };
        let ascent = metrics.iter().map(|m| m.ascent).fold(0.0f32, f32::max);
        let natural = metrics.iter().map(|m| m.natural_height()).fold(0.0f32, f32::max);
        let height = match spacing {
            LineSpacing::Auto(mult) => natural * mult,
            LineSpacing::Exact(h) => h,
            LineSpacing::AtLeast(min) => natural.max(min),
        };
        (ascent, height)
    }

    pub fn measure_paragraph(&self, para: &Paragraph, ctx: &MeasureContext<'_>) -> ParagraphMeasure {
        let list = ctx.lists.get(&para.id);
        let (indent_left, hanging, first_line) = match list {
            Some(l) => (l.indent_left, l.hanging_indent, l.first_line_indent),
            None => (para.indent_left, para.hanging_indent, para.first_line_indent),
        };
        let right_edge = ctx.available_width - para.indent_right;

        let (marker, first_x, rest_x) = match list {
            Some(l) => {
                let marker_run = para.runs.first().cloned().unwrap_or_default();
                let width =
                    resolve_marker_width(&l.marker, |t| self.text.text_width(t, &marker_run));
                let layout = resolve_list_layout(
                    &l.marker,
                    width,
                    indent_left,
                    first_line,
                    hanging,
                    &para.tab_stops,
                    ctx.default_tab_interval,
                );
                (Some(layout.marker), layout.first_line_text_x, layout.text_x)
            }
            None => {
                let params = TextIndentParams {
                    is_first_line: true,
                    para_indent_left: indent_left,
                    first_line_indent: first_line,
                    hanging_indent: hanging,
                    ..TextIndentParams::default()
                };
                let first = calculate_text_start_indent(&params);
                let rest = calculate_text_start_indent(&TextIndentParams {
                    is_first_line: false,
                    ..params
                });
                (None, first, rest)
            }
        };

        let atoms = self.atoms(para, ctx.fields);
        let mut lines = Vec::new();
        let mut line = LineBuilder::new(first_x);
        let mut glued: Vec<Atom> = Vec::new();

        let flush_glued = |this: &Self,
                           line: &mut LineBuilder,
                           lines: &mut Vec<MeasuredLine>,
                           glued: &mut Vec<Atom>| {
            if glued.is_empty() {
                return;
            }
            let unit_width: f32 = glued
                .iter()
                .map(|a| match a {
                    Atom::Word { width, .. } => *width,
                    _ => 0.0,
                })
                .sum();
            let overflows = line.pen + line.pending_space + unit_width > right_edge + 0.01;
            if line.has_content() && overflows {
                let full = std::mem::replace(line, LineBuilder::new(rest_x));
                lines.push(this.finish_line(full, para, ctx, right_edge, false));
            } else if line.pending_space > 0.0 && line.has_content() {
                line.placed.push(Placed::Space(line.pending_space));
                line.pen += line.pending_space;
            }
            line.pending_space = 0.0;
            for atom in glued.drain(..) {
                if let Atom::Word {
                    run,
                    text,
                    width,
                    separators,
                    field,
                } = atom
                {
                    line.pen += width;
                    line.runs.push(run);
                    line.placed.push(Placed::Word {
                        run,
                        text,
                        width,
                        separators,
                        field,
                    });
                }
            }
        };

        for atom in atoms {
            match atom {
                Atom::Word { .. } => glued.push(atom),
                Atom::Space { width } => {
                    flush_glued(self, &mut line, &mut lines, &mut glued);
                    if line.has_content() {
                        line.pending_space += width;
                    }
                }
                Atom::Tab { run } => {
                    flush_glued(self, &mut line, &mut lines, &mut glued);
                    if line.pending_space > 0.0 {
                        line.placed.push(Placed::Space(line.pending_space));
                        line.pen += line.pending_space;
                        line.pending_space = 0.0;
                    }
                    let stop = resolve_tab_stop(line.pen, &para.tab_stops, ctx.default_tab_interval);
                    if line.has_content() && stop.pos > right_edge + 0.01 {
                        let full = std::mem::replace(&mut line, LineBuilder::new(rest_x));
                        lines.push(self.finish_line(full, para, ctx, right_edge, false));
                    }
                    let stop = resolve_tab_stop(line.pen, &para.tab_stops, ctx.default_tab_interval);
                    if matches!(stop.kind, TabKind::Start | TabKind::Bar) {
                        line.pen = stop.pos.max(line.pen);
                    }
                    line.runs.push(run);
                    line.placed.push(Placed::Tab { run });
                }
                Atom::Break => {
                    flush_glued(self, &mut line, &mut lines, &mut glued);
                    let full = std::mem::replace(&mut line, LineBuilder::new(rest_x));
                    lines.push(self.finish_line(full, para, ctx, right_edge, true));
                }
            }
        }
        flush_glued(self, &mut line, &mut lines, &mut glued);
        if line.has_content() || lines.is_empty() {
            lines.push(self.finish_line(line, para, ctx, right_edge, false));
        }

        ParagraphMeasure { lines, marker }
    }

    fn measure_table(&self, table: &Table, ctx: &MeasureContext<'_>) -> TableMeasure {
        let available = (ctx.available_width - table.indent).max(1.0);
        let total: f32 = table.col_widths.iter().sum();
        let col_widths: Vec<f32> = if total > available && total > 0.0 {
            let scale = available / total;
            table.col_widths.iter().map(|w| w * scale).collect()
        } else {
            table.col_widths.clone()
        };
        let cm = &table.cell_margins;

        let rows = table
            .rows
            .iter()
            .map(|row| {
                let mut grid_col = 0usize;
                let cells: Vec<CellMeasure> = row
                    .cells
                    .iter()
                    .map(|cell| {
                        let span = cell.grid_span.max(1) as usize;
                        let end = col_widths.len().min(grid_col + span);
                        let width: f32 = col_widths[grid_col.min(end)..end].iter().sum();
                        grid_col += span;
                        let cell_ctx = MeasureContext {
                            available_width: (width - cm.left - cm.right).max(1.0),
                            ..*ctx
                        };
                        let paragraphs: Vec<ParagraphMeasure> = cell
                            .paragraphs
                            .iter()
                            .map(|p| self.measure_paragraph(p, &cell_ctx))
                            .collect();
                        let content_height = cm.top
                            + cm.bottom
                            + cell
                                .paragraphs
                                .iter()
                                .zip(&paragraphs)
                                .map(|(p, m)| p.space_before + m.height() + p.space_after)
                                .sum::<f32>();
                        CellMeasure {
                            paragraphs,
                            width,
                            content_height,
                        }
                    })
                    .collect();
                let content_h = cells.iter().map(|c| c.content_height).fold(0.0f32, f32::max);
                let height = match (row.height, row.height_exact) {
                    (Some(h), true) => h,
                    (Some(h), false) => content_h.max(h),
                    _ => content_h,
                };
                RowMeasure { cells, height }
            })
            .collect();

        TableMeasure { col_widths, rows }
    }

    fn measure_image(&self, image: &ImageBlock, ctx: &MeasureContext<'_>) -> ImageMeasure {
        let (w, h) = (image.width.max(0.0), image.height.max(0.0));
        if w > ctx.available_width && w > 0.0 {
            let scale = ctx.available_width / w;
            ImageMeasure {
                width: ctx.available_width,
                height: h * scale,
            }
        } else {
            ImageMeasure { width: w, height: h }
        }
    }
}

impl<T: TextMeasurer> BlockMeasurer for LineMeasurer<T> {
    fn measure(&mut self, block: &FlowBlock, ctx: &MeasureContext<'_>) -> Measure {
        self.measured_blocks += 1;
        match block {
            FlowBlock::Paragraph(p) => Measure::Paragraph(self.measure_paragraph(p, ctx)),
            FlowBlock::Table(t) => Measure::Table(self.measure_table(t, ctx)),
            FlowBlock::Image(i) => Measure::Image(self.measure_image(i, ctx)),
        }
    }
}

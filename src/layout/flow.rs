//! Page flow: places measured blocks into section columns and pages.
//!
//! The layouter records a [`PageStart`] at every page it opens. Everything
//! after a page start is a function of that cursor and the measures of the
//! blocks that follow it, so a relayout can keep the earlier pages and
//! resume from the first page touching a changed block.

use serde::Serialize;

use crate::layout::table::build_row;
use crate::layout::{
    Fragment, ImageFragment, Page, ParagraphFragment, PositionedLine, RowBox, TableFragment,
};
use crate::measure::{ImageMeasure, Measure, ParagraphMeasure, TableMeasure};
use crate::model::{
    Alignment, Document, FlowBlock, ImageBlock, Paragraph, SectionBreakType, Table, VerticalAlign,
};
use crate::numbering::format_page_number;
use crate::sections::SectionRange;
use crate::typeset::borders::{ResolvedTableBorders, resolve_table_borders};
use crate::typeset::justify::{calculate_justify_spacing, should_apply_justify};
use crate::typeset::list::MarkerPlacement;

/// Slack for float noise when testing whether content fits.
const FIT_EPSILON: f32 = 0.01;

pub struct FlowInput<'a> {
    pub doc: &'a Document,
    pub sections: &'a [SectionRange],
    /// One measure per top-level block, same order as `doc.blocks`.
    pub measures: &'a [Measure],
}

/// Where the layouter stood when it opened a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PageStart {
    pub section: usize,
    pub block: usize,
    /// Line (paragraph) or row (table) the page resumes at.
    pub offset: usize,
    pub first_of_section: bool,
    pub blank: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowOutput {
    pub pages: Vec<Page>,
    pub starts: Vec<PageStart>,
}

/// Position lines `from..to` of a paragraph with the first line's top at
/// `top`. Returns the lines and their total height.
pub(crate) fn position_lines(
    para: &Paragraph,
    pm: &ParagraphMeasure,
    from: usize,
    to: usize,
    origin_x: f32,
    top: f32,
) -> (Vec<PositionedLine>, f32) {
    let last = pm.lines.len().saturating_sub(1);
    let mut y = top;
    let mut out = Vec::with_capacity(to.saturating_sub(from));
    for (i, line) in pm.lines.iter().enumerate().take(to).skip(from) {
        let justify = should_apply_justify(
            para.alignment,
            line.has_tabs,
            i == last,
            para.ends_with_line_break(),
            None,
        );
        let word_spacing =
            calculate_justify_spacing(line.width, line.available_width, line.space_count, justify);
        let slack = (line.available_width - line.width).max(0.0);
        let offset = match para.alignment {
            Alignment::Center => slack / 2.0,
            Alignment::Right => slack,
            Alignment::Left | Alignment::Justify | Alignment::Both => 0.0,
        };
        let segments = line
            .segments
            .iter()
            .map(|seg| {
                let mut seg = seg.clone();
                seg.x = origin_x + seg.x + offset + seg.space_index as f32 * word_spacing;
                seg
            })
            .collect();
        out.push(PositionedLine {
            line_index: i,
            x: origin_x + line.x + offset,
            y,
            baseline: y + line.ascent,
            width: if justify { line.available_width } else { line.width },
            height: line.height,
            word_spacing,
            segments,
        });
        y += line.height;
    }
    (out, y - top)
}

fn image_x(image: &ImageBlock, im: &ImageMeasure, col_x: f32, col_w: f32) -> f32 {
    let slack = (col_w - im.width).max(0.0);
    match image.alignment {
        Alignment::Center => col_x + slack / 2.0,
        Alignment::Right => col_x + slack,
        _ => col_x,
    }
}

/// Stack blocks top to bottom without pagination (header and footer content).
pub fn stack_blocks(
    blocks: &[FlowBlock],
    measures: &[Measure],
    x: f32,
    y: f32,
    width: f32,
) -> (Vec<Fragment>, f32) {
    let mut fragments = Vec::new();
    let mut cursor = y;
    let mut prev_after = 0.0f32;
    for (block, measure) in blocks.iter().zip(measures) {
        match (block, measure) {
            (FlowBlock::Paragraph(p), Measure::Paragraph(pm)) => {
                if cursor > y {
                    cursor += prev_after.max(p.space_before);
                }
                let (lines, height) = position_lines(p, pm, 0, pm.lines.len(), x, cursor);
                fragments.push(Fragment::Paragraph(ParagraphFragment {
                    block_id: p.id,
                    from_line: 0,
                    to_line: pm.lines.len(),
                    x,
                    y: cursor,
                    width,
                    height,
                    lines,
                    marker: shifted_marker(pm, x),
                    continues_from_previous: false,
                    continues_on_next: false,
                }));
                cursor += height;
                prev_after = p.space_after;
            }
            (FlowBlock::Table(t), Measure::Table(tm)) => {
                cursor += prev_after;
                let borders = resolve_table_borders(&t.borders);
                let top = cursor;
                let rows: Vec<RowBox> = (0..t.rows.len().min(tm.rows.len()))
                    .map(|r| {
                        let row = build_row(t, tm, &borders, r, x + t.indent, cursor, false);
                        cursor += row.height;
                        row
                    })
                    .collect();
                fragments.push(Fragment::Table(TableFragment {
                    block_id: t.id,
                    from_row: 0,
                    to_row: rows.len(),
                    x: x + t.indent,
                    y: top,
                    width: tm.width(),
                    height: cursor - top,
                    rows,
                }));
                prev_after = 0.0;
            }
            (FlowBlock::Image(i), Measure::Image(im)) => {
                cursor += prev_after;
                fragments.push(Fragment::Image(ImageFragment {
                    block_id: i.id,
                    x: image_x(i, im, x, width),
                    y: cursor,
                    width: im.width,
                    height: im.height,
                }));
                cursor += im.height;
                prev_after = 0.0;
            }
            _ => log::warn!("measure kind does not match block {}", block.id()),
        }
    }
    (fragments, cursor - y)
}

fn shifted_marker(pm: &ParagraphMeasure, x: f32) -> Option<MarkerPlacement> {
    pm.marker.clone().map(|mut m| {
        m.x += x;
        m
    })
}

struct Flow<'a> {
    input: &'a FlowInput<'a>,
    pages: Vec<Page>,
    starts: Vec<PageStart>,
    section: usize,
    col: usize,
    y: f32,
    /// Top of the current column region (moves down after a continuous break).
    region_top: f32,
    /// Lowest point reached by any column of the current region.
    region_bottom: f32,
    prev_space_after: f32,
    /// Nothing placed in the current column yet.
    column_fresh: bool,
    /// An oversized image took the page; the next block starts a new one.
    break_pending: bool,
}

impl<'a> Flow<'a> {
    fn new(input: &'a FlowInput<'a>) -> Self {
        Self {
            input,
            pages: Vec::new(),
            starts: Vec::new(),
            section: 0,
            col: 0,
            y: 0.0,
            region_top: 0.0,
            region_bottom: 0.0,
            prev_space_after: 0.0,
            column_fresh: true,
            break_pending: false,
        }
    }

    fn range(&self) -> &'a SectionRange {
        &self.input.sections[self.section]
    }

    fn column_x(&self) -> f32 {
        let range = self.range();
        let cols = &range.columns.columns;
        range.margins.left + cols.get(self.col).or(cols.last()).map(|c| c.x).unwrap_or(0.0)
    }

    fn column_width(&self) -> f32 {
        let range = self.range();
        let cols = &range.columns.columns;
        cols.get(self.col)
            .or(cols.last())
            .map(|c| c.width)
            .unwrap_or_else(|| range.content_width())
    }

    fn bottom(&self) -> f32 {
        let range = self.range();
        range.page_size.height - range.margins.bottom
    }

    fn page_empty(&self) -> bool {
        self.pages.last().is_none_or(|p| p.fragments.is_empty())
    }

    fn push_fragment(&mut self, fragment: Fragment) {
        self.region_bottom = self.region_bottom.max(fragment.bottom());
        if let Some(page) = self.pages.last_mut() {
            if !page.sections.contains(&self.section) {
                page.sections.push(self.section);
            }
            page.fragments.push(fragment);
        }
    }

    fn make_page(&self, start: &PageStart) -> Page {
        let range = &self.input.sections[start.section];
        Page {
            number: self.pages.len() as u32 + 1,
            display_number: String::new(),
            section_index: start.section,
            first_of_section: start.first_of_section,
            sections: Vec::new(),
            size: range.page_size,
            margins: range.margins,
            orientation: range.orientation,
            blank: start.blank,
            fragments: Vec::new(),
            header: None,
            footer: None,
        }
    }

    fn open_page(&mut self, start: PageStart) {
        let page = self.make_page(&start);
        log::debug!(
            "page {} opens at block {} offset {} (section {})",
            page.number,
            start.block,
            start.offset,
            start.section
        );
        self.section = start.section;
        self.col = 0;
        self.y = page.margins.top;
        self.region_top = self.y;
        self.region_bottom = self.y;
        self.prev_space_after = 0.0;
        self.column_fresh = true;
        self.pages.push(page);
        self.starts.push(start);
    }

    fn close_page(&mut self) {
        let Some(page) = self.pages.last_mut() else {
            return;
        };
        let range = &self.input.sections[page.section_index];
        if page.blank || page.fragments.is_empty() || range.columns.count() > 1 {
            return;
        }
        let content_bottom = page.fragments.iter().map(Fragment::bottom).fold(0.0f32, f32::max);
        let slack = (page.size.height - page.margins.bottom - content_bottom).max(0.0);
        let dy = match range.v_align {
            VerticalAlign::Center => slack / 2.0,
            VerticalAlign::Bottom => slack,
            VerticalAlign::Top | VerticalAlign::Both => 0.0,
        };
        if dy > 0.0 {
            for fragment in &mut page.fragments {
                fragment.shift_y(dy);
            }
        }
    }

    fn new_page(&mut self, block: usize, offset: usize) {
        self.close_page();
        self.open_page(PageStart {
            section: self.section,
            block,
            offset,
            first_of_section: false,
            blank: false,
        });
    }

    fn advance_column(&mut self, block: usize, offset: usize) {
        if self.col + 1 < self.range().columns.count() {
            self.col += 1;
            self.y = self.region_top;
            self.prev_space_after = 0.0;
            self.column_fresh = true;
        } else {
            self.new_page(block, offset);
        }
    }

    fn enter_section(&mut self, idx: usize, first_block: usize) {
        let prev = self.range();
        let next = &self.input.sections[idx];

        if self.page_empty() && self.pages.last().is_some_and(|p| !p.blank) {
            // Nothing placed yet: the page simply takes the new section's geometry.
            self.pages.pop();
            self.starts.pop();
            self.open_page(PageStart {
                section: idx,
                block: first_block,
                offset: 0,
                first_of_section: true,
                blank: false,
            });
            return;
        }

        if next.starts_new_page_after(prev) {
            let next_number = self.pages.len() as u32 + 1;
            let wrong_parity = match next.break_type {
                SectionBreakType::OddPage => next_number % 2 == 0,
                SectionBreakType::EvenPage => next_number % 2 == 1,
                SectionBreakType::NextPage | SectionBreakType::Continuous => false,
            };
            self.close_page();
            if wrong_parity {
                let blank = PageStart {
                    section: self.section,
                    block: first_block,
                    offset: 0,
                    first_of_section: false,
                    blank: true,
                };
                let page = self.make_page(&blank);
                self.pages.push(page);
                self.starts.push(blank);
            }
            self.open_page(PageStart {
                section: idx,
                block: first_block,
                offset: 0,
                first_of_section: true,
                blank: false,
            });
        } else {
            self.section = idx;
            self.col = 0;
            self.region_top = self.region_bottom.max(self.y);
            self.region_bottom = self.region_top;
            self.y = self.region_top;
        }
    }

    /// An empty last section still gets a page when it changes the sheet.
    fn reshapes_at_end(&self, idx: usize) -> bool {
        let next = &self.input.sections[idx];
        let current = self.range();
        idx + 1 == self.input.sections.len()
            && (next.page_size != current.page_size || next.orientation != current.orientation)
    }

    fn place_block(&mut self, index: usize) {
        let block = &self.input.doc.blocks[index];
        let Some(measure) = self.input.measures.get(index) else {
            log::warn!("no measure for block {}", block.id());
            return;
        };
        if self.break_pending {
            self.break_pending = false;
            if !self.page_empty() {
                self.new_page(index, 0);
            }
        }
        match (block, measure) {
            (FlowBlock::Paragraph(p), Measure::Paragraph(pm)) => {
                self.place_paragraph(index, p, pm, 0)
            }
            (FlowBlock::Table(t), Measure::Table(tm)) => self.place_table(index, t, tm, 0),
            (FlowBlock::Image(i), Measure::Image(im)) => self.place_image(index, i, im),
            _ => log::warn!("measure kind does not match block {}", block.id()),
        }
    }

    fn resume_block(&mut self, index: usize, offset: usize) {
        let block = &self.input.doc.blocks[index];
        match (block, self.input.measures.get(index)) {
            (FlowBlock::Paragraph(p), Some(Measure::Paragraph(pm))) => {
                self.place_paragraph(index, p, pm, offset)
            }
            (FlowBlock::Table(t), Some(Measure::Table(tm))) => {
                self.place_table(index, t, tm, offset)
            }
            _ => self.place_block(index),
        }
    }

    /// Height of the first line (or row) of the block after `index`.
    fn next_first_height(&self, index: usize) -> Option<f32> {
        let next = index + 1;
        if !self.range().contains(next) {
            return None;
        }
        match self.input.measures.get(next)? {
            Measure::Paragraph(pm) => pm.lines.first().map(|l| l.height),
            Measure::Table(tm) => tm.rows.first().map(|r| r.height),
            Measure::Image(im) => Some(im.height),
        }
    }

    fn column_capacity(&self) -> f32 {
        self.bottom() - self.region_top
    }

    fn place_paragraph(
        &mut self,
        index: usize,
        para: &Paragraph,
        pm: &ParagraphMeasure,
        offset: usize,
    ) {
        if offset == 0 {
            if para.page_break_before && !self.page_empty() {
                self.new_page(index, 0);
            } else if para.column_break_before && !self.column_fresh {
                self.advance_column(index, 0);
            }
        }

        let mut gap = if self.column_fresh || offset > 0 {
            0.0
        } else {
            self.prev_space_after.max(para.space_before)
        };

        if offset == 0 && !self.column_fresh {
            let total = pm.height();
            let avail = self.bottom() - self.y - gap;
            let capacity = self.column_capacity();
            let keep_together = para.keep_lines && total > avail + FIT_EPSILON && total <= capacity;
            let keep_with_next = para.keep_next
                && self.next_first_height(index).is_some_and(|next_h| {
                    let need = total + para.space_after + next_h;
                    need > avail + FIT_EPSILON && need <= capacity
                });
            if keep_together || keep_with_next {
                self.advance_column(index, 0);
                gap = 0.0;
            }
        }

        self.y += gap;
        let mut from = offset;
        let mut top = self.y;
        let mut i = offset;
        while i < pm.lines.len() {
            let h = pm.lines[i].height;
            let placed_here = i > from || !self.column_fresh;
            if self.y + h > self.bottom() + FIT_EPSILON && placed_here {
                if i > from {
                    self.emit_lines(para, pm, from, i, top);
                }
                self.advance_column(index, i);
                from = i;
                top = self.y;
                continue;
            }
            self.y += h;
            self.column_fresh = false;
            i += 1;
        }
        self.emit_lines(para, pm, from, pm.lines.len(), top);
        self.prev_space_after = para.space_after;
    }

    fn emit_lines(
        &mut self,
        para: &Paragraph,
        pm: &ParagraphMeasure,
        from: usize,
        to: usize,
        top: f32,
    ) {
        let x = self.column_x();
        let (lines, height) = position_lines(para, pm, from, to, x, top);
        self.push_fragment(Fragment::Paragraph(ParagraphFragment {
            block_id: para.id,
            from_line: from,
            to_line: to,
            x,
            y: top,
            width: self.column_width(),
            height,
            lines,
            marker: if from == 0 { shifted_marker(pm, x) } else { None },
            continues_from_previous: from > 0,
            continues_on_next: to < pm.lines.len(),
        }));
    }

    fn place_table(&mut self, index: usize, table: &Table, tm: &TableMeasure, offset: usize) {
        let row_count = table.rows.len().min(tm.rows.len());
        let header_rows = table.header_rows.min(row_count);
        let borders = resolve_table_borders(&table.borders);

        if offset == 0 && !self.column_fresh {
            self.y += self.prev_space_after;
        }

        let mut rows: Vec<RowBox> = Vec::new();
        let mut from = offset;
        let mut top = self.y;
        let mut started_fresh = self.column_fresh;
        if offset > 0 && header_rows > 0 && offset >= header_rows {
            self.repeat_headers(table, tm, &borders, header_rows, &mut rows);
        }

        let mut r = offset;
        while r < row_count {
            let h = tm.rows[r].height;
            let body_rows = rows.iter().filter(|row| !row.repeated_header).count();
            let can_break = !(started_fresh && body_rows == 0);
            if self.y + h > self.bottom() + FIT_EPSILON && can_break {
                if !rows.is_empty() {
                    self.emit_table(table, tm, from, r, top, std::mem::take(&mut rows));
                }
                self.advance_column(index, r);
                from = r;
                top = self.y;
                started_fresh = true;
                if header_rows > 0 && r >= header_rows {
                    self.repeat_headers(table, tm, &borders, header_rows, &mut rows);
                }
                continue;
            }
            let x = self.column_x() + table.indent;
            let row = build_row(table, tm, &borders, r, x, self.y, false);
            self.y += row.height;
            self.column_fresh = false;
            rows.push(row);
            r += 1;
        }
        if !rows.is_empty() {
            self.emit_table(table, tm, from, row_count, top, rows);
        }
        self.prev_space_after = 0.0;
    }

    fn repeat_headers(
        &mut self,
        table: &Table,
        tm: &TableMeasure,
        borders: &ResolvedTableBorders,
        header_rows: usize,
        rows: &mut Vec<RowBox>,
    ) {
        let x = self.column_x() + table.indent;
        for hr in 0..header_rows {
            let row = build_row(table, tm, borders, hr, x, self.y, true);
            self.y += row.height;
            rows.push(row);
        }
    }

    fn emit_table(
        &mut self,
        table: &Table,
        tm: &TableMeasure,
        from: usize,
        to: usize,
        top: f32,
        rows: Vec<RowBox>,
    ) {
        let height = rows.iter().map(|r| r.height).sum();
        self.push_fragment(Fragment::Table(TableFragment {
            block_id: table.id,
            from_row: from,
            to_row: to,
            x: self.column_x() + table.indent,
            y: top,
            width: tm.width(),
            height,
            rows,
        }));
    }

    fn place_image(&mut self, index: usize, image: &ImageBlock, im: &ImageMeasure) {
        let oversized = im.height > self.range().content_height();
        let mut gap = if self.column_fresh { 0.0 } else { self.prev_space_after };
        if oversized {
            if !self.page_empty() {
                self.new_page(index, 0);
            }
            gap = 0.0;
        } else if !self.column_fresh && self.y + gap + im.height > self.bottom() + FIT_EPSILON {
            self.advance_column(index, 0);
            gap = 0.0;
        }
        self.y += gap;
        let x = image_x(image, im, self.column_x(), self.column_width());
        self.push_fragment(Fragment::Image(ImageFragment {
            block_id: image.id,
            x,
            y: self.y,
            width: im.width,
            height: im.height,
        }));
        self.y += im.height;
        self.column_fresh = false;
        self.prev_space_after = 0.0;
        self.break_pending = oversized;
    }

    fn run(mut self, start: PageStart) -> FlowOutput {
        let block_count = self.input.doc.blocks.len();
        self.open_page(start);
        let mut first = true;
        for idx in start.section..self.input.sections.len() {
            let span = self.input.sections[idx].block_span(block_count);
            if !first {
                if span.is_empty() && !self.reshapes_at_end(idx) {
                    continue;
                }
                self.enter_section(idx, span.start);
            }
            let (from_block, from_offset) = if first {
                (start.block.max(span.start), start.offset)
            } else {
                (span.start, 0)
            };
            first = false;
            for b in from_block..span.end {
                if b == from_block && from_offset > 0 {
                    self.resume_block(b, from_offset);
                } else {
                    self.place_block(b);
                }
            }
        }
        self.close_page();
        number_pages(&mut self.pages, self.input.sections);
        FlowOutput {
            pages: self.pages,
            starts: self.starts,
        }
    }
}

/// Assign display numbers, honoring per-section restarts and formats. A
/// section that starts part way down a page restarts numbering on that page.
pub fn number_pages(pages: &mut [Page], sections: &[SectionRange]) {
    let mut counter = 0u32;
    for page in pages {
        let own = sections
            .get(page.section_index)
            .map(|s| s.numbering.clone())
            .unwrap_or_default();
        let mut format = own.format;
        counter = match own.start {
            Some(start) if page.first_of_section && !page.blank => start,
            _ => counter + 1,
        };
        if !page.blank {
            let joined = page
                .sections
                .iter()
                .filter(|&&s| s != page.section_index)
                .filter_map(|&s| sections.get(s));
            for range in joined {
                if let Some(start) = range.numbering.start {
                    counter = start;
                    format = range.numbering.format;
                }
            }
        }
        page.display_number = format_page_number(counter, format);
    }
}

fn first_start(input: &FlowInput<'_>) -> PageStart {
    let block = input
        .sections
        .first()
        .map(|s| s.block_span(input.doc.blocks.len()).start)
        .unwrap_or(0);
    PageStart {
        section: 0,
        block,
        offset: 0,
        first_of_section: true,
        blank: false,
    }
}

/// Lay out every block from the top of the document.
pub fn layout_blocks(input: &FlowInput<'_>) -> FlowOutput {
    if input.sections.is_empty() {
        log::warn!("layout requested without section ranges");
        return FlowOutput::default();
    }
    Flow::new(input).run(first_start(input))
}

/// Index of the page to resume from so that `first_dirty` is laid out again.
/// Blocks chained to it by keep-with-next are pulled in as well, since their
/// placement depends on its first line.
fn resume_page(previous: &FlowOutput, doc: &Document, first_dirty: usize) -> Option<usize> {
    let mut anchor = first_dirty;
    while anchor > 0
        && doc.blocks[anchor - 1]
            .as_paragraph()
            .is_some_and(|p| p.keep_next)
    {
        anchor -= 1;
    }
    previous
        .starts
        .iter()
        .rposition(|s| !s.blank && (s.block < anchor || (s.block == anchor && s.offset == 0)))
}

/// Relayout after the blocks from `first_dirty` on were remeasured. Pages
/// before the first one touching those blocks are kept as they were.
pub fn relayout_from(
    input: &FlowInput<'_>,
    previous: &FlowOutput,
    first_dirty: usize,
) -> FlowOutput {
    if input.sections.is_empty() {
        return FlowOutput::default();
    }
    let Some(page_idx) = resume_page(previous, input.doc, first_dirty.min(input.doc.blocks.len()))
        .filter(|&p| p > 0)
    else {
        return layout_blocks(input);
    };
    log::debug!("relayout resumes at page {} for block {first_dirty}", page_idx + 1);
    let start = previous.starts[page_idx];
    let mut flow = Flow::new(input);
    flow.pages = previous.pages[..page_idx].to_vec();
    flow.starts = previous.starts[..page_idx].to_vec();
    flow.run(start)
}

//! Header and footer layout with a per-document cache.
//!
//! Pages of a section mostly share the same header/footer content. Content
//! is laid out once per `(section, bucket)` with representative field text
//! of the bucket's digit counts; each page then only swaps in its own field
//! values. Entries are stamped with the document revision they were built
//! from and a lookup under any other revision is a miss.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

use serde::Serialize;

use crate::layout::flow::stack_blocks;
use crate::layout::{Fragment, HeaderFooterVariant, Page, PageRegion, PositionedLine};
use crate::measure::{BlockMeasurer, FieldResolver, MeasureContext, SegmentKind};
use crate::model::{BlockId, Document, FieldCode, FlowBlock, HeaderFooterRefs, Paragraph, RunKind};
use crate::sections::SectionRange;

pub const DEFAULT_CACHE_MEMORY_LIMIT: usize = 4 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Header,
    Footer,
}

/// Distinguishes the pages of a section that need their own layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BucketKey {
    pub kind: RegionKind,
    pub variant: HeaderFooterVariant,
    /// Digits of the page number; zero when the content has no fields.
    pub page_digits: u8,
    pub total_digits: u8,
    /// Width of the widest page reference in the section's content.
    pub ref_digits: u8,
}

/// Laid-out header or footer with its top edge at y = 0.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegionContent {
    pub ref_id: String,
    pub fragments: Vec<Fragment>,
    pub height: f32,
}

fn line_bytes(line: &PositionedLine) -> usize {
    std::mem::size_of::<PositionedLine>()
        + line
            .segments
            .iter()
            .map(|s| std::mem::size_of_val(s) + s.text.len())
            .sum::<usize>()
}

impl RegionContent {
    /// Rough heap footprint, used for the eviction threshold.
    pub fn estimated_bytes(&self) -> usize {
        let mut bytes = std::mem::size_of::<Self>() + self.ref_id.len();
        for fragment in &self.fragments {
            bytes += std::mem::size_of::<Fragment>();
            match fragment {
                Fragment::Paragraph(p) => bytes += p.lines.iter().map(line_bytes).sum::<usize>(),
                Fragment::Table(t) => {
                    bytes += t
                        .rows
                        .iter()
                        .flat_map(|r| r.cells.iter())
                        .flat_map(|c| c.paragraphs.iter())
                        .flat_map(|p| p.lines.iter())
                        .map(line_bytes)
                        .sum::<usize>()
                }
                Fragment::Image(_) => {}
            }
        }
        bytes
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub invalidations: u64,
    pub clears: u64,
    pub evictions: u64,
    pub size: usize,
    pub memory_bytes: usize,
}

impl CacheStats {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            n => self.hits as f64 / n as f64,
        }
    }
}

struct CacheEntry {
    revision: u64,
    content: Rc<RegionContent>,
    bytes: usize,
}

pub struct HeaderFooterCache {
    entries: HashMap<(usize, BucketKey), CacheEntry>,
    /// Insertion order, oldest first.
    order: VecDeque<(usize, BucketKey)>,
    memory_limit: usize,
    memory_bytes: usize,
    hits: u64,
    misses: u64,
    sets: u64,
    invalidations: u64,
    clears: u64,
    evictions: u64,
}

impl Default for HeaderFooterCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_MEMORY_LIMIT)
    }
}

impl HeaderFooterCache {
    pub fn new(memory_limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            memory_limit,
            memory_bytes: 0,
            hits: 0,
            misses: 0,
            sets: 0,
            invalidations: 0,
            clears: 0,
            evictions: 0,
        }
    }

    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    pub fn get(
        &mut self,
        section: usize,
        bucket: BucketKey,
        revision: u64,
    ) -> Option<Rc<RegionContent>> {
        match self.entries.get(&(section, bucket)) {
            Some(entry) if entry.revision == revision => {
                self.hits += 1;
                Some(Rc::clone(&entry.content))
            }
            _ => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn set(
        &mut self,
        section: usize,
        bucket: BucketKey,
        revision: u64,
        content: RegionContent,
    ) -> Rc<RegionContent> {
        let key = (section, bucket);
        self.remove(&key);
        let content = Rc::new(content);
        let bytes = content.estimated_bytes();
        self.entries.insert(
            key,
            CacheEntry {
                revision,
                content: Rc::clone(&content),
                bytes,
            },
        );
        self.order.push_back(key);
        self.memory_bytes += bytes;
        self.sets += 1;
        self.evict();
        content
    }

    fn remove(&mut self, key: &(usize, BucketKey)) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };
        self.memory_bytes = self.memory_bytes.saturating_sub(entry.bytes);
        self.order.retain(|k| k != key);
        true
    }

    /// Drop the oldest entries until the estimate is back under the limit.
    /// The newest entry always survives.
    fn evict(&mut self) {
        while self.memory_bytes > self.memory_limit && self.order.len() > 1 {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&oldest) {
                self.memory_bytes = self.memory_bytes.saturating_sub(entry.bytes);
                self.evictions += 1;
                log::debug!("header/footer cache evicted section {} {:?}", oldest.0, oldest.1);
            }
        }
    }

    /// Drop every entry of `section`.
    pub fn invalidate(&mut self, section: usize) {
        let keys: Vec<(usize, BucketKey)> = self
            .order
            .iter()
            .copied()
            .filter(|(s, _)| *s == section)
            .collect();
        for key in &keys {
            self.remove(key);
        }
        self.invalidations += 1;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.memory_bytes = 0;
        self.clears += 1;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            sets: self.sets,
            invalidations: self.invalidations,
            clears: self.clears,
            evictions: self.evictions,
            size: self.entries.len(),
            memory_bytes: self.memory_bytes,
        }
    }
}

/// Per-section bucketing decision, made once per section.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BucketPlan {
    pub split_first: bool,
    pub split_even: bool,
    /// Content holds page-dependent fields, so digit counts matter.
    pub has_fields: bool,
    pub ref_digits: u8,
}

fn refs_have_fields(doc: &Document, refs: &HeaderFooterRefs) -> bool {
    [&refs.default, &refs.first, &refs.even]
        .into_iter()
        .flatten()
        .filter_map(|id| doc.header_footers.get(id))
        .flat_map(|def| def.blocks.iter())
        .any(|b| b.runs().any(|r| r.field_code().is_some()))
}

fn page_ref_names<'a>(doc: &'a Document, refs: &'a HeaderFooterRefs) -> Vec<&'a str> {
    [&refs.default, &refs.first, &refs.even]
        .into_iter()
        .flatten()
        .filter_map(|id| doc.header_footers.get(id))
        .flat_map(|def| def.blocks.iter())
        .flat_map(|b| b.runs())
        .filter_map(|r| match r.field_code() {
            Some(FieldCode::PageRef(name)) => Some(name.as_str()),
            _ => None,
        })
        .collect()
}

/// Bucketing for `section`. Page references are sized by their values in
/// `fields`, which do not vary from page to page.
pub fn plan_buckets(
    section: &SectionRange,
    doc: &Document,
    fields: &dyn PageFields,
) -> BucketPlan {
    let ref_digits = page_ref_names(doc, &section.header_refs)
        .into_iter()
        .chain(page_ref_names(doc, &section.footer_refs))
        .map(|name| digits(&fields.page_ref(name)))
        .max()
        .unwrap_or(0);
    BucketPlan {
        split_first: section.title_pg,
        split_even: doc.even_and_odd_headers,
        has_fields: refs_have_fields(doc, &section.header_refs)
            || refs_have_fields(doc, &section.footer_refs),
        ref_digits,
    }
}

fn digits(text: &str) -> u8 {
    text.chars().count().min(u8::MAX as usize) as u8
}

pub fn bucket_for_page(
    plan: &BucketPlan,
    kind: RegionKind,
    page: &Page,
    total_pages: usize,
) -> BucketKey {
    let variant = if plan.split_first && page.first_of_section {
        HeaderFooterVariant::First
    } else if plan.split_even && page.number % 2 == 0 {
        HeaderFooterVariant::Even
    } else {
        HeaderFooterVariant::Default
    };
    let (page_digits, total_digits, ref_digits) = if plan.has_fields {
        (
            digits(&page.display_number),
            digits(&total_pages.to_string()),
            plan.ref_digits,
        )
    } else {
        (0, 0, 0)
    };
    BucketKey {
        kind,
        variant,
        page_digits,
        total_digits,
        ref_digits,
    }
}

fn select_ref(refs: &HeaderFooterRefs, variant: HeaderFooterVariant) -> Option<&str> {
    match variant {
        HeaderFooterVariant::Default => refs.default.as_deref(),
        HeaderFooterVariant::First => refs.first.as_deref(),
        HeaderFooterVariant::Even => refs.even.as_deref(),
    }
}

/// Representative field text for a bucket: zeros of the bucket's widths.
struct BucketFields(BucketKey);

impl FieldResolver for BucketFields {
    fn field_text(&self, _block: BlockId, code: &FieldCode) -> String {
        let n = match code {
            FieldCode::NumPages => self.0.total_digits,
            FieldCode::PageRef(_) => self.0.ref_digits,
            FieldCode::Page | FieldCode::SectionPages => self.0.page_digits,
        };
        "0".repeat(n.max(1) as usize)
    }
}

/// Field values of one concrete page.
pub trait PageFields {
    fn value(&self, page: &Page, code: &FieldCode) -> String;

    /// Text of a page reference; the same on every page.
    fn page_ref(&self, name: &str) -> String;
}

fn collect_paragraphs<'a>(blocks: &'a [FlowBlock], out: &mut HashMap<BlockId, &'a Paragraph>) {
    for block in blocks {
        match block {
            FlowBlock::Paragraph(p) => {
                out.insert(p.id, p);
            }
            FlowBlock::Table(t) => {
                let cells = t.rows.iter().flat_map(|r| r.cells.iter());
                for p in cells.flat_map(|c| c.paragraphs.iter()) {
                    out.insert(p.id, p);
                }
            }
            FlowBlock::Image(_) => {}
        }
    }
}

fn fill_line(
    line: &mut PositionedLine,
    para: Option<&Paragraph>,
    page: &Page,
    fields: &dyn PageFields,
) {
    let Some(para) = para else {
        return;
    };
    for seg in &mut line.segments {
        if seg.kind != SegmentKind::Field {
            continue;
        }
        if let Some(RunKind::Field(code)) = para.runs.get(seg.run).map(|r| &r.kind) {
            seg.text = fields.value(page, code);
        }
    }
}

fn fill_fields(
    fragments: &mut [Fragment],
    paragraphs: &HashMap<BlockId, &Paragraph>,
    page: &Page,
    fields: &dyn PageFields,
) {
    for fragment in fragments {
        match fragment {
            Fragment::Paragraph(p) => {
                let para = paragraphs.get(&p.block_id).copied();
                for line in &mut p.lines {
                    fill_line(line, para, page, fields);
                }
            }
            Fragment::Table(t) => {
                for cp in t
                    .rows
                    .iter_mut()
                    .flat_map(|r| r.cells.iter_mut())
                    .flat_map(|c| c.paragraphs.iter_mut())
                {
                    let para = paragraphs.get(&cp.block_id).copied();
                    for line in &mut cp.lines {
                        fill_line(line, para, page, fields);
                    }
                }
            }
            Fragment::Image(_) => {}
        }
    }
}

pub struct RegionRenderer<'a> {
    pub doc: &'a Document,
    pub sections: &'a [SectionRange],
    pub revision: u64,
}

impl RegionRenderer<'_> {
    fn build(
        &self,
        section: &SectionRange,
        ref_id: &str,
        bucket: BucketKey,
        measurer: &mut dyn BlockMeasurer,
    ) -> Option<RegionContent> {
        let def = self.doc.header_footers.get(ref_id)?;
        let width = section.content_width();
        let no_lists = BTreeMap::new();
        let resolver = BucketFields(bucket);
        let ctx = MeasureContext {
            available_width: width,
            fields: &resolver,
            lists: &no_lists,
            default_tab_interval: self.doc.default_tab_interval,
            line_spacing: self.doc.line_spacing,
        };
        let measures: Vec<_> = def.blocks.iter().map(|b| measurer.measure(b, &ctx)).collect();
        let (fragments, height) =
            stack_blocks(&def.blocks, &measures, section.margins.left, 0.0, width);
        Some(RegionContent {
            ref_id: ref_id.to_string(),
            fragments,
            height,
        })
    }

    /// Attach header and footer regions to every page.
    pub fn apply(
        &self,
        pages: &mut [Page],
        cache: &mut HeaderFooterCache,
        measurer: &mut dyn BlockMeasurer,
        fields: &dyn PageFields,
    ) {
        let plans: Vec<BucketPlan> = self
            .sections
            .iter()
            .map(|s| plan_buckets(s, self.doc, fields))
            .collect();
        let total = pages.len();
        for page in pages.iter_mut() {
            let Some(section) = self.sections.get(page.section_index) else {
                continue;
            };
            let plan = plans[page.section_index];
            for kind in [RegionKind::Header, RegionKind::Footer] {
                let bucket = bucket_for_page(&plan, kind, page, total);
                let refs = match kind {
                    RegionKind::Header => &section.header_refs,
                    RegionKind::Footer => &section.footer_refs,
                };
                let Some(ref_id) = select_ref(refs, bucket.variant) else {
                    continue;
                };
                let content = match cache.get(page.section_index, bucket, self.revision) {
                    Some(c) => c,
                    None => match self.build(section, ref_id, bucket, measurer) {
                        Some(c) => cache.set(page.section_index, bucket, self.revision, c),
                        None => {
                            log::warn!(
                                "section {} references missing {:?} {ref_id}",
                                page.section_index,
                                kind
                            );
                            continue;
                        }
                    },
                };
                let region = self.place(&content, kind, bucket.variant, page, fields);
                match kind {
                    RegionKind::Header => page.header = Some(region),
                    RegionKind::Footer => page.footer = Some(region),
                }
            }
        }
    }

    fn place(
        &self,
        content: &RegionContent,
        kind: RegionKind,
        variant: HeaderFooterVariant,
        page: &Page,
        fields: &dyn PageFields,
    ) -> PageRegion {
        let y = match kind {
            RegionKind::Header => page.margins.header,
            RegionKind::Footer => page.size.height - page.margins.footer - content.height,
        };
        let mut fragments = content.fragments.clone();
        for fragment in &mut fragments {
            fragment.shift_y(y);
        }
        if let Some(def) = self.doc.header_footers.get(&content.ref_id) {
            let mut paragraphs = HashMap::new();
            collect_paragraphs(&def.blocks, &mut paragraphs);
            fill_fields(&mut fragments, &paragraphs, page, fields);
        }
        PageRegion {
            variant,
            ref_id: content.ref_id.clone(),
            y,
            height: content.height,
            fragments,
        }
    }
}

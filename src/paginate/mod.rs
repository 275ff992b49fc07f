//! The pagination engine: a fixed-point loop over layout and page tokens.
//!
//! Page numbers can only be known after a layout exists, and writing them in
//! can change line widths and so the layout. The engine lays out with
//! placeholder values, resolves the real values, and remeasures only the
//! blocks whose tokens changed, until nothing changes or the budget runs out.

pub mod tokens;

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::header_footer::{
    DEFAULT_CACHE_MEMORY_LIMIT, HeaderFooterCache, PageFields, RegionRenderer,
};
use crate::layout::{
    FlowInput, FlowOutput, Layout, Page, ResolvedToken, layout_blocks, relayout_from,
    section_page_counts,
};
use crate::measure::{BlockMeasurer, Measure, MeasureContext};
use crate::model::{BlockId, Document, FieldCode};
use crate::numbering::{NumberingCache, ResolvedList};
use crate::observe::{ConvergenceReason, IterationMetrics, LayoutObserver, PaginationSummary};
use crate::sections::{SectionRange, analyze_sections, section_for_block, validate_ranges};

use tokens::{
    BlockFields, OscillationGuard, TokenKey, TokenValues, affected_blocks, loop_budget_exhausted,
    region_ref_keys, resolve_tokens, token_dependencies,
};

pub const DEFAULT_MAX_ITERATIONS: u32 = 5;
pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_millis(250);

#[derive(Clone, Debug, PartialEq)]
pub struct EngineOptions {
    pub max_iterations: u32,
    /// Soft limit, checked between iterations.
    pub time_budget: Duration,
    pub cache_memory_limit: usize,
    /// Width of placeholder page numbers; derived from the block count when unset.
    pub placeholder_digits: Option<u8>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            time_budget: DEFAULT_TIME_BUDGET,
            cache_memory_limit: DEFAULT_CACHE_MEMORY_LIMIT,
            placeholder_digits: None,
        }
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("ignoring {name}={raw:?}: not a number");
            None
        }
    }
}

impl EngineOptions {
    /// Defaults overridden by `DOCXIDE_LAYOUT_*` environment variables.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(n) = env_number::<u32>("DOCXIDE_LAYOUT_MAX_ITERATIONS") {
            options.max_iterations = n.max(1);
        }
        if let Some(ms) = env_number::<u64>("DOCXIDE_LAYOUT_TIME_BUDGET_MS") {
            options.time_budget = Duration::from_millis(ms);
        }
        if let Some(bytes) = env_number::<usize>("DOCXIDE_LAYOUT_CACHE_BYTES") {
            options.cache_memory_limit = bytes;
        }
        options
    }
}

/// Caches owned by one document instance and passed to every layout call.
pub struct DocumentCaches {
    pub scope_id: u64,
    pub header_footer: HeaderFooterCache,
    pub numbering: NumberingCache,
}

impl DocumentCaches {
    pub fn new(scope_id: u64, options: &EngineOptions) -> Self {
        Self {
            scope_id,
            header_footer: HeaderFooterCache::new(options.cache_memory_limit),
            numbering: NumberingCache::new(),
        }
    }
}

/// States of the convergence loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Initial,
    Resolve,
    CheckAffected,
    Remeasure(BTreeSet<usize>),
    Converged(ConvergenceReason),
}

#[derive(Debug)]
pub struct PaginationResult {
    pub layout: Layout,
    pub converged: bool,
    pub reason: ConvergenceReason,
    pub iterations: u32,
    pub metrics: Vec<IterationMetrics>,
    pub sections: Vec<SectionRange>,
}

fn placeholder_digits(doc: &Document) -> u8 {
    doc.blocks.len().max(1).to_string().len() as u8
}

/// Header/footer field values of a finished layout.
struct FinalFields {
    /// Page references made from header and footer content.
    refs: TokenValues,
    total_pages: usize,
    section_pages: BTreeMap<usize, usize>,
}

impl PageFields for FinalFields {
    fn value(&self, page: &Page, code: &FieldCode) -> String {
        match code {
            FieldCode::Page => page.display_number.clone(),
            FieldCode::NumPages => self.total_pages.to_string(),
            FieldCode::SectionPages => self
                .section_pages
                .get(&page.section_index)
                .copied()
                .unwrap_or(0)
                .to_string(),
            FieldCode::PageRef(name) => self.page_ref(name),
        }
    }

    fn page_ref(&self, name: &str) -> String {
        self.refs
            .get(&TokenKey::PageRef(name.to_string()))
            .cloned()
            .unwrap_or_else(|| tokens::MISSING_REFERENCE.to_string())
    }
}

/// Everything needed to measure one top-level block.
struct Measuring<'m> {
    doc: &'m Document,
    sections: &'m [SectionRange],
    block_sections: &'m [usize],
    lists: &'m BTreeMap<BlockId, ResolvedList>,
    placeholder: &'m str,
}

impl Measuring<'_> {
    fn measure(
        &self,
        measurer: &mut dyn BlockMeasurer,
        applied: &TokenValues,
        i: usize,
    ) -> Measure {
        let block = &self.doc.blocks[i];
        let section_index = self.block_sections[i];
        let section = &self.sections[section_index];
        let fields = BlockFields {
            values: applied,
            block: block.id(),
            section: section_index,
            placeholder: self.placeholder,
        };
        let ctx = MeasureContext {
            available_width: section
                .columns
                .columns
                .first()
                .map(|c| c.width)
                .unwrap_or_else(|| section.content_width()),
            fields: &fields,
            lists: self.lists,
            default_tab_interval: self.doc.default_tab_interval,
            line_spacing: self.doc.line_spacing,
        };
        measurer.measure(block, &ctx)
    }
}

pub struct PaginationEngine<'a> {
    doc: &'a Document,
    revision: u64,
    sections: Vec<SectionRange>,
    options: EngineOptions,
    caches: &'a mut DocumentCaches,
    measurer: &'a mut dyn BlockMeasurer,
    observer: &'a mut dyn LayoutObserver,
}

impl<'a> PaginationEngine<'a> {
    pub fn new(
        doc: &'a Document,
        revision: u64,
        caches: &'a mut DocumentCaches,
        measurer: &'a mut dyn BlockMeasurer,
        observer: &'a mut dyn LayoutObserver,
        options: EngineOptions,
    ) -> Self {
        let mut sections = analyze_sections(&doc.blocks, doc.body_section.as_ref());
        if sections.is_empty() {
            sections.push(SectionRange::default_for(doc.blocks.len()));
        }
        Self {
            doc,
            revision,
            sections,
            options,
            caches,
            measurer,
            observer,
        }
    }

    /// Use caller-supplied section ranges instead of analyzing markers.
    pub fn with_sections(mut self, sections: Vec<SectionRange>) -> Result<Self> {
        validate_ranges(&sections, self.doc.blocks.len())?;
        if !sections.is_empty() {
            self.sections = sections;
        }
        Ok(self)
    }

    pub fn sections(&self) -> &[SectionRange] {
        &self.sections
    }

    pub fn run(self) -> Result<PaginationResult> {
        let t0 = Instant::now();
        let Self {
            doc,
            revision,
            sections,
            options,
            caches,
            measurer,
            observer,
        } = self;
        log::debug!(
            "paginate scope {} revision {revision}: {} blocks, {} sections",
            caches.scope_id,
            doc.blocks.len(),
            sections.len()
        );

        let lists = caches.numbering.labels(doc, revision);
        let block_sections: Vec<usize> = (0..doc.blocks.len())
            .map(|i| section_for_block(&sections, i))
            .collect();
        let dependencies: Vec<Vec<TokenKey>> = doc
            .blocks
            .iter()
            .zip(&block_sections)
            .map(|(b, &s)| token_dependencies(b, s))
            .collect();
        let all_keys: BTreeSet<TokenKey> = dependencies.iter().flatten().cloned().collect();
        let digits = options
            .placeholder_digits
            .unwrap_or_else(|| placeholder_digits(doc))
            .max(1);
        let placeholder = "0".repeat(digits as usize);

        let mut guard = OscillationGuard::default();
        for key in &all_keys {
            guard.record(key, &placeholder);
        }

        let measuring = Measuring {
            doc,
            sections: &sections,
            block_sections: &block_sections,
            lists: &lists,
            placeholder: &placeholder,
        };

        let mut applied = TokenValues::new();
        let mut resolved = TokenValues::new();
        let mut measures: Vec<Measure> = Vec::new();
        let mut flow = FlowOutput::default();
        let mut metrics: Vec<IterationMetrics> = Vec::new();
        let mut current = IterationMetrics::default();
        let mut iteration = 0u32;
        let mut phase = Phase::Initial;

        let reason = loop {
            phase = match phase {
                Phase::Initial => {
                    iteration = 1;
                    current = IterationMetrics {
                        iteration,
                        ..IterationMetrics::default()
                    };
                    let t = Instant::now();
                    measures = (0..doc.blocks.len())
                        .map(|i| measuring.measure(&mut *measurer, &applied, i))
                        .collect();
                    current.remeasure_time = t.elapsed();
                    let t = Instant::now();
                    flow = layout_blocks(&FlowInput {
                        doc,
                        sections: &sections,
                        measures: &measures,
                    });
                    current.relayout_time = t.elapsed();
                    Phase::Resolve
                }
                Phase::Resolve => {
                    let t = Instant::now();
                    resolved = resolve_tokens(&flow.pages, doc, &all_keys);
                    current.resolve_time = t.elapsed();
                    Phase::CheckAffected
                }
                Phase::CheckAffected => {
                    let changed = guard.changed_tokens(&applied, &resolved, &placeholder);
                    let affected = affected_blocks(&dependencies, &changed);
                    current.affected_blocks = affected.len();
                    observer.on_iteration(&current);
                    metrics.push(current.clone());
                    if affected.is_empty() {
                        Phase::Converged(ConvergenceReason::Stable)
                    } else if let Some(reason) =
                        loop_budget_exhausted(iteration, t0.elapsed(), &options)
                    {
                        Phase::Converged(reason)
                    } else {
                        for (key, value) in changed {
                            guard.record(&key, &value);
                            applied.insert(key, value);
                        }
                        Phase::Remeasure(affected)
                    }
                }
                Phase::Remeasure(affected) => {
                    iteration += 1;
                    current = IterationMetrics {
                        iteration,
                        ..IterationMetrics::default()
                    };
                    let t = Instant::now();
                    for &i in &affected {
                        measures[i] = measuring.measure(&mut *measurer, &applied, i);
                    }
                    current.remeasure_time = t.elapsed();
                    let t = Instant::now();
                    let first_dirty = affected.first().copied().unwrap_or(0);
                    flow = relayout_from(
                        &FlowInput {
                            doc,
                            sections: &sections,
                            measures: &measures,
                        },
                        &flow,
                        first_dirty,
                    );
                    current.relayout_time = t.elapsed();
                    Phase::Resolve
                }
                Phase::Converged(reason) => break reason,
            };
        };
        let t_loop = t0.elapsed();

        let mut pages = flow.pages;
        let section_pages = section_page_counts(&pages);
        let fields = FinalFields {
            refs: resolve_tokens(&pages, doc, &region_ref_keys(doc)),
            total_pages: pages.len(),
            section_pages,
        };
        RegionRenderer {
            doc,
            sections: &sections,
            revision,
        }
        .apply(&mut pages, &mut caches.header_footer, &mut *measurer, &fields);
        let t_regions = t0.elapsed();

        let converged = reason == ConvergenceReason::Stable;
        let layout = Layout {
            page_size: pages.first().map(|p| p.size),
            tokens: all_keys
                .iter()
                .map(|k| {
                    let value = applied.get(k).cloned().unwrap_or_else(|| placeholder.clone());
                    let latest = resolved.get(k).filter(|v| **v != value).cloned();
                    ResolvedToken {
                        key: k.to_string(),
                        value,
                        latest,
                    }
                })
                .collect(),
            pages,
        };

        observer.on_complete(&PaginationSummary {
            converged,
            reason,
            iterations: iteration,
            pages: layout.pages.len(),
            total_time: t0.elapsed(),
            header_footer_cache: caches.header_footer.stats(),
            cache_memory_limit: options.cache_memory_limit,
        });
        log::info!(
            "Paginate timings: loop {:.1}ms ({} iterations), headers/footers {:.1}ms",
            t_loop.as_secs_f64() * 1000.0,
            iteration,
            (t_regions - t_loop).as_secs_f64() * 1000.0
        );

        Ok(PaginationResult {
            layout,
            converged,
            reason,
            iterations: iteration,
            metrics,
            sections,
        })
    }
}

/// Paginate `doc` at `revision` with section ranges derived from its markers.
pub fn paginate(
    doc: &Document,
    revision: u64,
    caches: &mut DocumentCaches,
    measurer: &mut dyn BlockMeasurer,
    options: EngineOptions,
    observer: &mut dyn LayoutObserver,
) -> Result<PaginationResult> {
    PaginationEngine::new(doc, revision, caches, measurer, observer, options).run()
}

//! Page-dependent tokens: which blocks depend on which values, how values
//! are read back from a tentative layout, and which blocks a change affects.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::time::Duration;

use crate::layout::{Page, section_page_counts};
use crate::measure::FieldResolver;
use crate::model::{BlockId, Document, FieldCode, FlowBlock};
use crate::observe::ConvergenceReason;
use crate::paginate::EngineOptions;

/// Shown for a page reference whose bookmark does not exist.
pub const MISSING_REFERENCE: &str = "?";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenKey {
    /// Display number of the page the block starts on.
    PageOf(BlockId),
    NumPages,
    SectionPages(usize),
    /// Display number of the page holding a bookmark.
    PageRef(String),
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKey::PageOf(id) => write!(f, "page:{id}"),
            TokenKey::NumPages => write!(f, "numpages"),
            TokenKey::SectionPages(s) => write!(f, "sectionpages:{s}"),
            TokenKey::PageRef(name) => write!(f, "pageref:{name}"),
        }
    }
}

pub type TokenValues = BTreeMap<TokenKey, String>;

pub fn token_key(code: &FieldCode, block: BlockId, section: usize) -> TokenKey {
    match code {
        FieldCode::Page => TokenKey::PageOf(block),
        FieldCode::NumPages => TokenKey::NumPages,
        FieldCode::SectionPages => TokenKey::SectionPages(section),
        FieldCode::PageRef(name) => TokenKey::PageRef(name.clone()),
    }
}

/// Tokens a block's rendered text depends on, sorted and deduplicated.
pub fn token_dependencies(block: &FlowBlock, section: usize) -> Vec<TokenKey> {
    let keys: BTreeSet<TokenKey> = block
        .runs()
        .filter_map(|r| r.field_code())
        .map(|code| token_key(code, block.id(), section))
        .collect();
    keys.into_iter().collect()
}

/// Page references made from header and footer content. They are resolved
/// once against the final pages, not fed back into the loop.
pub fn region_ref_keys(doc: &Document) -> BTreeSet<TokenKey> {
    doc.header_footers
        .values()
        .flat_map(|def| def.blocks.iter())
        .flat_map(|b| b.runs())
        .filter_map(|r| match r.field_code() {
            Some(FieldCode::PageRef(name)) => Some(TokenKey::PageRef(name.clone())),
            _ => None,
        })
        .collect()
}

/// Field text for one top-level block. Fields inside table cells resolve
/// against the table, which is the unit that gets remeasured.
pub struct BlockFields<'a> {
    pub values: &'a TokenValues,
    pub block: BlockId,
    pub section: usize,
    pub placeholder: &'a str,
}

impl FieldResolver for BlockFields<'_> {
    fn field_text(&self, _block: BlockId, code: &FieldCode) -> String {
        let key = token_key(code, self.block, self.section);
        self.values
            .get(&key)
            .cloned()
            .unwrap_or_else(|| self.placeholder.to_string())
    }
}

/// Read concrete values for `keys` from a tentative layout.
pub fn resolve_tokens<'k>(
    pages: &[Page],
    doc: &Document,
    keys: impl IntoIterator<Item = &'k TokenKey>,
) -> TokenValues {
    let mut first_page: HashMap<BlockId, usize> = HashMap::new();
    for (i, page) in pages.iter().enumerate() {
        for fragment in &page.fragments {
            first_page.entry(fragment.block_id()).or_insert(i);
        }
    }
    let section_pages = section_page_counts(pages);
    let display = |id: &BlockId| first_page.get(id).map(|&i| pages[i].display_number.clone());

    let mut values = TokenValues::new();
    for key in keys {
        if values.contains_key(key) {
            continue;
        }
        let value = match key {
            TokenKey::PageOf(id) => display(id),
            TokenKey::NumPages => Some(pages.len().to_string()),
            TokenKey::SectionPages(s) => {
                Some(section_pages.get(s).copied().unwrap_or(0).to_string())
            }
            TokenKey::PageRef(name) => {
                let target = doc.blocks.iter().find(|b| {
                    b.as_paragraph().and_then(|p| p.bookmark.as_deref()) == Some(name.as_str())
                });
                match target {
                    Some(block) => display(&block.id()),
                    None => {
                        log::warn!("page reference to unknown bookmark {name:?}");
                        Some(MISSING_REFERENCE.to_string())
                    }
                }
            }
        };
        if let Some(v) = value {
            values.insert(key.clone(), v);
        }
    }
    values
}

/// Remembers every value a token was measured with, and pins tokens that
/// come back to an earlier value so the loop cannot toggle between layouts.
#[derive(Debug, Default)]
pub struct OscillationGuard {
    history: BTreeMap<TokenKey, Vec<String>>,
    pinned: BTreeSet<TokenKey>,
}

fn wider<'a>(a: &'a str, b: &'a str) -> &'a str {
    match a.chars().count().cmp(&b.chars().count()) {
        std::cmp::Ordering::Less => b,
        std::cmp::Ordering::Greater => a,
        std::cmp::Ordering::Equal => a.max(b),
    }
}

impl OscillationGuard {
    pub fn is_pinned(&self, key: &TokenKey) -> bool {
        self.pinned.contains(key)
    }

    /// Record that `key` was measured with `value`.
    pub fn record(&mut self, key: &TokenKey, value: &str) {
        let seen = self.history.entry(key.clone()).or_default();
        if !seen.iter().any(|v| v == value) {
            seen.push(value.to_string());
        }
    }

    /// Compare resolved values against the ones in effect and return the
    /// new values to apply. `applied` misses mean the placeholder is in effect.
    pub fn changed_tokens(
        &mut self,
        applied: &TokenValues,
        resolved: &TokenValues,
        placeholder: &str,
    ) -> TokenValues {
        let mut changes = TokenValues::new();
        for (key, new) in resolved {
            let current = applied.get(key).map(String::as_str).unwrap_or(placeholder);
            if new == current || self.pinned.contains(key) {
                continue;
            }
            let cycled = self
                .history
                .get(key)
                .is_some_and(|seen| seen.iter().any(|v| v == new));
            if cycled {
                let pin = wider(new, current).to_string();
                log::debug!(
                    "token {key} oscillates between {current:?} and {new:?}, pinned at {pin:?}"
                );
                self.pinned.insert(key.clone());
                if pin != current {
                    changes.insert(key.clone(), pin);
                }
            } else {
                changes.insert(key.clone(), new.clone());
            }
        }
        changes
    }
}

/// Indices of blocks that depend on any of the changed tokens.
pub fn affected_blocks(dependencies: &[Vec<TokenKey>], changed: &TokenValues) -> BTreeSet<usize> {
    if changed.is_empty() {
        return BTreeSet::new();
    }
    dependencies
        .iter()
        .enumerate()
        .filter(|(_, deps)| deps.iter().any(|k| changed.contains_key(k)))
        .map(|(i, _)| i)
        .collect()
}

/// `Some(reason)` once the loop may not start another iteration.
pub fn loop_budget_exhausted(
    iterations_done: u32,
    elapsed: Duration,
    options: &EngineOptions,
) -> Option<ConvergenceReason> {
    if iterations_done >= options.max_iterations {
        Some(ConvergenceReason::IterationCap)
    } else if elapsed >= options.time_budget {
        Some(ConvergenceReason::TimeBudget)
    } else {
        None
    }
}

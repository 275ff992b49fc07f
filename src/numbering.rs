//! List labels and page-number formatting.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::model::{
    BlockId, Document, FlowBlock, LevelDefinition, ListMarkerSpec, NumberFormat, Paragraph,
};

fn to_roman(mut n: u32) -> String {
    const TABLE: &[(u32, &str)] = &[
        (1000, "m"),
        (900, "cm"),
        (500, "d"),
        (400, "cd"),
        (100, "c"),
        (90, "xc"),
        (50, "l"),
        (40, "xl"),
        (10, "x"),
        (9, "ix"),
        (5, "v"),
        (4, "iv"),
        (1, "i"),
    ];
    let mut result = String::new();
    for &(value, numeral) in TABLE {
        while n >= value {
            result.push_str(numeral);
            n -= value;
        }
    }
    result
}

fn to_letters(value: u32, base: u8) -> String {
    if value == 0 {
        return String::new();
    }
    let mut n = value - 1;
    let mut result = String::new();
    loop {
        result.insert(0, (base + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    result
}

pub fn format_number(value: u32, format: NumberFormat) -> String {
    match format {
        NumberFormat::Decimal | NumberFormat::Bullet => value.to_string(),
        NumberFormat::DecimalZero => format!("{value:02}"),
        NumberFormat::LowerLetter => to_letters(value, b'a'),
        NumberFormat::UpperLetter => to_letters(value, b'A'),
        NumberFormat::LowerRoman => to_roman(value),
        NumberFormat::UpperRoman => to_roman(value).to_uppercase(),
        NumberFormat::None => String::new(),
    }
}

/// Page numbers never render as bullets or vanish; both fall back to decimal.
pub fn format_page_number(value: u32, format: NumberFormat) -> String {
    match format {
        NumberFormat::Bullet | NumberFormat::None => value.to_string(),
        other => format_number(value, other),
    }
}

/// Map Symbol-font private-use bullets to their Unicode equivalents.
fn normalize_bullet_text(text: &str) -> String {
    text.chars()
        .map(|c| match c as u32 {
            0xF0B7 => '\u{2022}',
            0xF0A7 => '\u{25A0}',
            0xF0A8 => '\u{25CB}',
            0xF0D8 => '\u{2666}',
            cp @ 0xF000..=0xF0FF => char::from_u32(cp - 0xF000).unwrap_or(c),
            _ => c,
        })
        .collect()
}

/// Marker and indents a numbered paragraph ends up with.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedList {
    pub marker: ListMarkerSpec,
    pub indent_left: f32,
    pub hanging_indent: f32,
    pub first_line_indent: f32,
}

#[derive(Default)]
struct Counters {
    values: HashMap<(String, u8), u32>,
    last_level: HashMap<String, u8>,
}

impl Counters {
    fn next(&mut self, num_id: &str, level: u8, start: u32) -> u32 {
        if let Some(prev) = self.last_level.get(num_id).copied()
            && level <= prev
        {
            for deeper in (level + 1)..=prev {
                self.values.remove(&(num_id.to_string(), deeper));
            }
        }
        self.last_level.insert(num_id.to_string(), level);
        *self
            .values
            .entry((num_id.to_string(), level))
            .and_modify(|c| *c += 1)
            .or_insert(start)
    }

    fn current(&self, num_id: &str, level: u8) -> Option<u32> {
        self.values.get(&(num_id.to_string(), level)).copied()
    }
}

fn label_text(
    def: &LevelDefinition,
    levels: &[LevelDefinition],
    num_id: &str,
    counters: &Counters,
) -> String {
    if def.format == NumberFormat::Bullet {
        let text = normalize_bullet_text(&def.text);
        return if text.is_empty() { "\u{2022}".to_string() } else { text };
    }
    let mut label = def.text.clone();
    for lvl in 0..9u8 {
        let placeholder = format!("%{}", lvl + 1);
        if !label.contains(&placeholder) {
            continue;
        }
        let lvl_def = levels.iter().find(|l| l.level == lvl);
        let value = counters
            .current(num_id, lvl)
            .unwrap_or_else(|| lvl_def.map(|d| d.start).unwrap_or(1));
        let format = lvl_def.map(|d| d.format).unwrap_or_default();
        label = label.replace(&placeholder, &format_number(value, format));
    }
    label
}

fn resolve_paragraph(
    para: &Paragraph,
    doc: &Document,
    counters: &mut Counters,
) -> Option<ResolvedList> {
    let Some(num) = &para.numbering else {
        return para.marker.clone().map(|marker| ResolvedList {
            marker,
            indent_left: para.indent_left,
            hanging_indent: para.hanging_indent,
            first_line_indent: para.first_line_indent,
        });
    };
    let Some(def) = doc
        .lists
        .get(&num.num_id)
        .and_then(|list| list.level(num.level).map(|lvl| (list, lvl)))
    else {
        log::warn!(
            "paragraph {} references missing list {}/{}",
            para.id,
            num.num_id,
            num.level
        );
        return None;
    };
    let (list, level) = def;
    counters.next(&num.num_id, num.level, level.start);
    let text = label_text(level, &list.levels, &num.num_id, counters);

    // Explicit marker fields from the converter win over the level definition.
    let explicit = para.marker.clone().unwrap_or_default();
    let marker = ListMarkerSpec {
        marker_text: explicit.marker_text.or(Some(text)),
        justification: if para.marker.is_some() {
            explicit.justification
        } else {
            level.justification
        },
        suffix: if para.marker.is_some() {
            explicit.suffix
        } else {
            level.suffix
        },
        first_line_indent_mode: explicit.first_line_indent_mode || level.first_line_indent_mode,
        text_start_px: explicit.text_start_px.or(level.text_start_px),
        ..explicit
    };

    let has_own_indent =
        para.indent_left != 0.0 || para.hanging_indent != 0.0 || para.first_line_indent != 0.0;
    Some(if has_own_indent {
        ResolvedList {
            marker,
            indent_left: para.indent_left,
            hanging_indent: para.hanging_indent,
            first_line_indent: para.first_line_indent,
        }
    } else {
        ResolvedList {
            marker,
            indent_left: level.indent_left,
            hanging_indent: level.hanging_indent,
            first_line_indent: level.first_line_indent,
        }
    })
}

fn visit_paragraphs<'a>(blocks: &'a [FlowBlock], out: &mut Vec<&'a Paragraph>) {
    for block in blocks {
        match block {
            FlowBlock::Paragraph(p) => out.push(p),
            FlowBlock::Table(t) => {
                for cell in t.rows.iter().flat_map(|r| r.cells.iter()) {
                    out.extend(cell.paragraphs.iter());
                }
            }
            FlowBlock::Image(_) => {}
        }
    }
}

/// Walk the body in document order and assign a label to every list paragraph.
pub fn assign_list_labels(doc: &Document) -> BTreeMap<BlockId, ResolvedList> {
    let mut paragraphs = Vec::new();
    visit_paragraphs(&doc.blocks, &mut paragraphs);
    let mut counters = Counters::default();
    paragraphs
        .into_iter()
        .filter(|p| p.is_list_item())
        .filter_map(|p| resolve_paragraph(p, doc, &mut counters).map(|r| (p.id, r)))
        .collect()
}

/// List labels of one document instance, valid for a single revision.
#[derive(Default)]
pub struct NumberingCache {
    revision: Option<u64>,
    labels: Rc<BTreeMap<BlockId, ResolvedList>>,
    pub hits: u64,
    pub misses: u64,
}

impl NumberingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Labels for `revision`; any other stored revision is a miss.
    pub fn labels(&mut self, doc: &Document, revision: u64) -> Rc<BTreeMap<BlockId, ResolvedList>> {
        if self.revision == Some(revision) {
            self.hits += 1;
        } else {
            self.misses += 1;
            self.labels = Rc::new(assign_list_labels(doc));
            self.revision = Some(revision);
        }
        Rc::clone(&self.labels)
    }

    pub fn clear(&mut self) {
        self.revision = None;
        self.labels = Rc::default();
    }
}

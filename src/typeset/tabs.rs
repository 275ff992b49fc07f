//! Tab stop resolution.
//!
//! Positions are measured from the left edge of the column, the same frame
//! the paragraph's tab stops are expressed in.

use serde::Serialize;

use crate::model::{TabKind, TabStop};

/// Stops closer than this are considered the same position when clearing.
const CLEAR_TOLERANCE: f32 = 0.5;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedStop {
    pub pos: f32,
    pub kind: TabKind,
    pub leader: Option<char>,
    pub decimal_char: char,
    /// True when no explicit stop was found and the default interval applied.
    pub is_default: bool,
}

/// Stops that take part in resolution, sorted by position. `clear` stops
/// are dropped together with any stop they sit on.
pub fn active_stops(stops: &[TabStop]) -> Vec<&TabStop> {
    let cleared: Vec<f32> = stops
        .iter()
        .filter(|s| s.kind == TabKind::Clear)
        .map(|s| s.pos)
        .collect();
    let mut active: Vec<&TabStop> = stops
        .iter()
        .filter(|s| s.kind != TabKind::Clear && s.pos.is_finite())
        .filter(|s| !cleared.iter().any(|c| (c - s.pos).abs() < CLEAR_TOLERANCE))
        .collect();
    active.sort_by(|a, b| a.pos.total_cmp(&b.pos));
    active
}

/// Next default stop strictly after `pen_x` on a uniform grid.
pub fn next_default_stop(pen_x: f32, interval: f32) -> f32 {
    if interval <= 0.0 || !interval.is_finite() {
        return pen_x;
    }
    let rem = pen_x.rem_euclid(interval);
    pen_x + (interval - rem)
}

/// First stop at or beyond the pen, else the default grid.
pub fn resolve_tab_stop(pen_x: f32, stops: &[TabStop], default_interval: f32) -> ResolvedStop {
    if let Some(stop) = active_stops(stops).into_iter().find(|s| s.pos >= pen_x) {
        return ResolvedStop {
            pos: stop.pos,
            kind: stop.kind,
            leader: stop.leader,
            decimal_char: stop.decimal_char.unwrap_or('.'),
            is_default: false,
        };
    }
    ResolvedStop {
        pos: next_default_stop(pen_x, default_interval),
        kind: TabKind::Start,
        leader: None,
        decimal_char: '.',
        is_default: true,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LineItem {
    Text {
        width: f32,
        /// Width before the first occurrence of each separator character.
        separators: Vec<(char, f32)>,
    },
    Tab,
}

impl LineItem {
    /// Text with no separator characters.
    pub fn text(width: f32) -> Self {
        LineItem::Text {
            width,
            separators: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedTab {
    /// Index of the tab in the item list.
    pub item: usize,
    /// Pen position where the tab begins.
    pub from_x: f32,
    /// Where the text following the tab begins.
    pub to_x: f32,
    pub stop: ResolvedStop,
}

impl ResolvedTab {
    pub fn width(&self) -> f32 {
        self.to_x - self.from_x
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TabResolution {
    pub tabs: Vec<ResolvedTab>,
    /// Start x of every item, tabs included.
    pub item_x: Vec<f32>,
    pub end_x: f32,
}

/// Width of the text run that follows item `tab_idx`, up to the next tab,
/// and the width before the first `decimal_char` in it.
fn following_segment(
    items: &[LineItem],
    tab_idx: usize,
    decimal_char: char,
) -> (f32, Option<f32>) {
    let mut width = 0.0;
    let mut decimal = None;
    for item in &items[tab_idx + 1..] {
        match item {
            LineItem::Tab => break,
            LineItem::Text {
                width: w,
                separators,
            } => {
                if decimal.is_none()
                    && let Some(&(_, d)) = separators.iter().find(|(c, _)| *c == decimal_char)
                {
                    decimal = Some(width + d);
                }
                width += w;
            }
        }
    }
    (width, decimal)
}

/// Width before the first occurrence of each non-alphanumeric character of
/// `text`, given a width function for prefixes.
pub fn separator_offsets(
    text: &str,
    mut prefix_width: impl FnMut(&str) -> f32,
) -> Vec<(char, f32)> {
    let mut out: Vec<(char, f32)> = Vec::new();
    for (i, ch) in text.char_indices() {
        if ch.is_alphanumeric() || ch.is_whitespace() || out.iter().any(|(c, _)| *c == ch) {
            continue;
        }
        out.push((ch, prefix_width(&text[..i])));
    }
    out
}

/// Place every item of a line. Start tabs move the pen to the stop; center,
/// end and decimal stops anchor the *following* text, which needs its width
/// first, so those are resolved in a second step once the segment is known.
pub fn resolve_line_tabs(
    items: &[LineItem],
    start_x: f32,
    stops: &[TabStop],
    default_interval: f32,
) -> TabResolution {
    let mut out = TabResolution {
        item_x: Vec::with_capacity(items.len()),
        ..TabResolution::default()
    };
    let mut pen = start_x;

    for (i, item) in items.iter().enumerate() {
        out.item_x.push(pen);
        match item {
            LineItem::Text { width, .. } => pen += width,
            LineItem::Tab => {
                let stop = resolve_tab_stop(pen, stops, default_interval);
                let target = match stop.kind {
                    TabKind::Start | TabKind::Bar | TabKind::Clear => stop.pos,
                    TabKind::Center => {
                        let (w, _) = following_segment(items, i, stop.decimal_char);
                        stop.pos - w / 2.0
                    }
                    TabKind::End => {
                        let (w, _) = following_segment(items, i, stop.decimal_char);
                        stop.pos - w
                    }
                    TabKind::Decimal => {
                        let (w, before) = following_segment(items, i, stop.decimal_char);
                        stop.pos - before.unwrap_or(w)
                    }
                };
                let to_x = target.max(pen);
                out.tabs.push(ResolvedTab {
                    item: i,
                    from_x: pen,
                    to_x,
                    stop,
                });
                pen = to_x;
            }
        }
    }
    out.end_x = pen;
    out
}

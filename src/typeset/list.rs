//! List marker placement and text start indents.

use serde::Serialize;

use crate::model::{ListMarkerSpec, MarkerJustification, MarkerSuffix, TabStop};
use crate::typeset::tabs::{active_stops, next_default_stop};
use crate::units::finite;

/// Smallest gap between a marker and the text that follows it.
pub const MIN_MARKER_GAP: f32 = 8.0;
/// Gap appended for a `space` suffix (one non-breaking space at 11pt).
pub const SPACE_SUFFIX_GAP: f32 = 4.0;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextIndentParams {
    pub is_first_line: bool,
    pub is_list_item: bool,
    pub para_indent_left: f32,
    pub first_line_indent: f32,
    pub hanging_indent: f32,
    pub first_line_indent_mode: bool,
    /// Explicit first-line text start (`textStartX` / `textStartPx`).
    pub text_start_x: Option<f32>,
    pub marker_width: f32,
}

/// Where the text of a line begins, relative to the column's left edge.
pub fn calculate_text_start_indent(p: &TextIndentParams) -> f32 {
    if !p.is_first_line {
        return p.para_indent_left;
    }
    if !p.is_list_item {
        // Negative results are outdents into the margin.
        return p.para_indent_left + (p.first_line_indent - p.hanging_indent);
    }
    if !p.first_line_indent_mode {
        return p.para_indent_left;
    }
    if let Some(x) = finite(p.text_start_x) {
        return x;
    }
    p.para_indent_left + p.first_line_indent.max(0.0) + p.marker_width
}

/// Marker width by priority: explicit glyph width, measured text, stored box
/// width, zero. Non-finite values count as unavailable.
pub fn resolve_marker_width(
    list_marker: &ListMarkerSpec,
    measure_text: impl FnOnce(&str) -> Option<f32>,
) -> f32 {
    if let Some(w) = finite(list_marker.glyph_width_px) {
        return w;
    }
    if let Some(w) = list_marker
        .marker_text
        .as_deref()
        .filter(|t| !t.is_empty())
        .and_then(|t| finite(measure_text(t)))
    {
        return w;
    }
    finite(list_marker.box_width_px).unwrap_or(0.0)
}

/// Gap after the marker, before the text.
pub fn marker_gap(
    list_marker: &ListMarkerSpec,
    marker_end_x: f32,
    para_indent_left: f32,
    stops: &[TabStop],
    default_interval: f32,
) -> f32 {
    if list_marker.justification != MarkerJustification::Left {
        return finite(list_marker.gutter_width_px)
            .unwrap_or(0.0)
            .max(MIN_MARKER_GAP);
    }
    match list_marker.suffix {
        MarkerSuffix::Nothing => 0.0,
        MarkerSuffix::Space => SPACE_SUFFIX_GAP,
        MarkerSuffix::Tab => {
            let target = next_marker_stop(
                list_marker,
                marker_end_x,
                para_indent_left,
                stops,
                default_interval,
            );
            let tab_width = target - marker_end_x;
            if tab_width < MIN_MARKER_GAP {
                // Text then starts at marker start + marker width + minimum gap.
                MIN_MARKER_GAP
            } else {
                tab_width
            }
        }
    }
}

/// The hanging indent acts as an implicit stop for the marker's tab.
fn next_marker_stop(
    list_marker: &ListMarkerSpec,
    pen: f32,
    para_indent_left: f32,
    stops: &[TabStop],
    default_interval: f32,
) -> f32 {
    let mut candidates: Vec<f32> = match &list_marker.tabs_px {
        Some(tabs) => tabs.iter().copied().filter(|t| t.is_finite()).collect(),
        None => active_stops(stops).into_iter().map(|s| s.pos).collect(),
    };
    if !list_marker.first_line_indent_mode {
        candidates.push(para_indent_left);
    }
    candidates
        .into_iter()
        .filter(|&pos| pos > pen)
        .min_by(f32::total_cmp)
        .unwrap_or_else(|| next_default_stop(pen, default_interval))
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MarkerPlacement {
    pub text: String,
    /// Left edge of the marker glyphs, relative to the column.
    pub x: f32,
    pub width: f32,
    pub gap: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListLayout {
    pub marker: MarkerPlacement,
    pub first_line_text_x: f32,
    pub text_x: f32,
}

/// Position the marker and compute both text starts of a list paragraph.
pub fn resolve_list_layout(
    list_marker: &ListMarkerSpec,
    marker_width: f32,
    para_indent_left: f32,
    first_line_indent: f32,
    hanging_indent: f32,
    stops: &[TabStop],
    default_interval: f32,
) -> ListLayout {
    let anchor = if list_marker.first_line_indent_mode {
        para_indent_left + first_line_indent.max(0.0)
    } else {
        para_indent_left + first_line_indent - hanging_indent
    };
    let marker_x = match list_marker.justification {
        MarkerJustification::Left => anchor,
        MarkerJustification::Center => anchor - marker_width / 2.0,
        MarkerJustification::Right => anchor - marker_width,
    };
    let gap = marker_gap(
        list_marker,
        marker_x + marker_width,
        para_indent_left,
        stops,
        default_interval,
    );
    let params = TextIndentParams {
        is_first_line: true,
        is_list_item: true,
        para_indent_left,
        first_line_indent,
        hanging_indent,
        first_line_indent_mode: list_marker.first_line_indent_mode,
        text_start_x: finite(list_marker.text_start_x).or(finite(list_marker.text_start_px)),
        marker_width,
    };
    ListLayout {
        marker: MarkerPlacement {
            text: list_marker.marker_text.clone().unwrap_or_default(),
            x: marker_x,
            width: marker_width,
            gap,
        },
        first_line_text_x: calculate_text_start_indent(&params),
        text_x: calculate_text_start_indent(&TextIndentParams {
            is_first_line: false,
            ..params
        }),
    }
}

//! Table border resolution under the single-owner model.
//!
//! Cells are painted as independent boxes, so every shared edge must belong
//! to exactly one cell: each cell owns its top and left edge, and only the
//! last row and last column own the bottom and right edges.

use serde::Serialize;

use crate::model::{BorderValue, TableBorders};

pub const DEFAULT_BORDER_COLOR: [u8; 3] = [0, 0, 0];
pub const DEFAULT_BORDER_WIDTH: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderStyle {
    None,
    Single,
    Thick,
    Double,
    Dotted,
    Dashed,
    DotDash,
    DotDotDash,
    Triple,
    Wave,
    DoubleWave,
    Inset,
    Outset,
}

impl BorderStyle {
    /// `None` for tokens the painter cannot express.
    pub fn from_token(token: &str) -> Option<Self> {
        let style = match token {
            "none" | "nil" => BorderStyle::None,
            "single" | "solid" => BorderStyle::Single,
            "thick" => BorderStyle::Thick,
            "double" => BorderStyle::Double,
            "dotted" => BorderStyle::Dotted,
            "dashed" | "dashSmallGap" => BorderStyle::Dashed,
            "dotDash" => BorderStyle::DotDash,
            "dotDotDash" => BorderStyle::DotDotDash,
            "triple" => BorderStyle::Triple,
            "wave" => BorderStyle::Wave,
            "doubleWave" => BorderStyle::DoubleWave,
            "inset" | "threeDEngrave" => BorderStyle::Inset,
            "outset" | "threeDEmboss" => BorderStyle::Outset,
            _ => return None,
        };
        Some(style)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BorderSpec {
    pub style: BorderStyle,
    pub width: f32,
    pub color: [u8; 3],
    pub space: f32,
}

impl BorderSpec {
    pub const NONE: BorderSpec = BorderSpec {
        style: BorderStyle::None,
        width: 0.0,
        color: DEFAULT_BORDER_COLOR,
        space: 0.0,
    };

    pub fn is_visible(&self) -> bool {
        self.style != BorderStyle::None && self.width > 0.0
    }
}

/// `#RRGGBB`, `RRGGBB`, `#RGB` or `auto`.
pub fn parse_color(val: &str) -> Option<[u8; 3]> {
    let hex = val.trim().trim_start_matches('#');
    if hex.eq_ignore_ascii_case("auto") {
        return Some(DEFAULT_BORDER_COLOR);
    }
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        6 => {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            Some([r, g, b])
        }
        3 => {
            let digit = |i: usize| u8::from_str_radix(&hex[i..=i], 16).ok().map(|d| d * 17);
            Some([digit(0)?, digit(1)?, digit(2)?])
        }
        _ => None,
    }
}

/// Turn a raw border into something the painter can always draw.
pub fn sanitize_border(value: &BorderValue) -> BorderSpec {
    if value.none {
        return BorderSpec::NONE;
    }
    let style = match value.style.as_deref() {
        None => BorderStyle::Single,
        Some(token) => BorderStyle::from_token(token).unwrap_or_else(|| {
            log::warn!("unknown border style {token:?}, using single");
            BorderStyle::Single
        }),
    };
    if style == BorderStyle::None {
        return BorderSpec::NONE;
    }
    let color = match value.color.as_deref() {
        None => DEFAULT_BORDER_COLOR,
        Some(raw) => parse_color(raw).unwrap_or_else(|| {
            log::warn!("invalid border color {raw:?}, using black");
            DEFAULT_BORDER_COLOR
        }),
    };
    let width = value
        .width
        .filter(|w| w.is_finite() && *w >= 0.0)
        .unwrap_or(DEFAULT_BORDER_WIDTH);
    let space = value
        .space
        .filter(|s| s.is_finite() && *s >= 0.0)
        .unwrap_or(0.0);
    BorderSpec {
        style,
        width,
        color,
        space,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ResolvedTableBorders {
    pub top: Option<BorderSpec>,
    pub bottom: Option<BorderSpec>,
    pub left: Option<BorderSpec>,
    pub right: Option<BorderSpec>,
    pub inside_h: Option<BorderSpec>,
    pub inside_v: Option<BorderSpec>,
}

pub fn resolve_table_borders(borders: &TableBorders) -> ResolvedTableBorders {
    let side = |v: &Option<BorderValue>| v.as_ref().map(sanitize_border);
    ResolvedTableBorders {
        top: side(&borders.top),
        bottom: side(&borders.bottom),
        left: side(&borders.left),
        right: side(&borders.right),
        inside_h: side(&borders.inside_h),
        inside_v: side(&borders.inside_v),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct CellBorders {
    pub top: Option<BorderSpec>,
    pub right: Option<BorderSpec>,
    pub bottom: Option<BorderSpec>,
    pub left: Option<BorderSpec>,
}

/// Grid position of a cell; `col` and `col_span` are in grid columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellPosition {
    pub row: usize,
    pub row_count: usize,
    pub col: usize,
    pub col_span: usize,
    pub col_count: usize,
}

/// Derive the edges a cell paints. Cell borders are never stored.
pub fn resolve_cell_borders(table: &ResolvedTableBorders, pos: CellPosition) -> CellBorders {
    let last_row = pos.row + 1 >= pos.row_count;
    let last_col = pos.col + pos.col_span.max(1) >= pos.col_count;
    CellBorders {
        top: if pos.row == 0 { table.top } else { table.inside_h },
        left: if pos.col == 0 { table.left } else { table.inside_v },
        bottom: if last_row { table.bottom } else { None },
        right: if last_col { table.right } else { None },
    }
}

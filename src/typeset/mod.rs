//! Stateless per-line typesetting decisions. Everything here is a pure
//! function of its arguments and is called many times per layout pass.

pub mod borders;
pub mod justify;
pub mod list;
pub mod tabs;

pub use borders::{
    BorderSpec, BorderStyle, CellBorders, resolve_cell_borders, resolve_table_borders,
};
pub use justify::{calculate_justify_spacing, should_apply_justify};
pub use list::{TextIndentParams, calculate_text_start_indent, resolve_marker_width};
pub use tabs::{resolve_line_tabs, resolve_tab_stop};

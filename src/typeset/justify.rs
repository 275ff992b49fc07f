use crate::model::Alignment;

/// Whether a line gets distributed inter-word spacing.
///
/// Tab-anchored lines are never justified. A paragraph ending in a soft
/// line break does not treat its final line as "last" for justification.
/// `skip_override` forces the answer to false (used by callers that lay out
/// measurement previews).
pub fn should_apply_justify(
    alignment: Alignment,
    has_explicit_positioning: bool,
    is_last_line_of_paragraph: bool,
    paragraph_ends_with_line_break: bool,
    skip_override: Option<bool>,
) -> bool {
    if skip_override == Some(true) {
        return false;
    }
    if !alignment.is_justified() || has_explicit_positioning {
        return false;
    }
    !is_last_line_of_paragraph || paragraph_ends_with_line_break
}

/// Extra width per space. Negative when the natural width overshoots the
/// available width and the line has to be compressed.
pub fn calculate_justify_spacing(
    line_width: f32,
    available_width: f32,
    space_count: usize,
    should_justify: bool,
) -> f32 {
    if !should_justify || space_count == 0 {
        return 0.0;
    }
    (available_width - line_width) / space_count as f32
}

//! Length conversions. Layout works in CSS pixels at 96 dpi.

pub const PX_PER_INCH: f32 = 96.0;
pub const TWIPS_PER_INCH: f32 = 1440.0;

pub fn twips_to_px(twips: f32) -> f32 {
    twips * PX_PER_INCH / TWIPS_PER_INCH
}

/// Margins above this are taken to be twips; at or below, already pixels.
///
/// A 1in margin is 96px but 1440 twips. Values near the threshold are
/// ambiguous either way.
pub const MARGIN_TWIPS_THRESHOLD: f32 = 200.0;

/// Page dimensions above this are twips. Letter is 816px wide but 12240 twips.
pub const PAGE_TWIPS_THRESHOLD: f32 = 3000.0;

pub fn normalize_margin(value: f32) -> f32 {
    if !value.is_finite() {
        return 0.0;
    }
    if value.abs() > MARGIN_TWIPS_THRESHOLD {
        twips_to_px(value)
    } else {
        value
    }
}

pub fn normalize_page_dimension(value: f32) -> f32 {
    if !value.is_finite() || value <= 0.0 {
        return 0.0;
    }
    if value > PAGE_TWIPS_THRESHOLD {
        twips_to_px(value)
    } else {
        value
    }
}

/// Finite, non-NaN width or `None`.
pub(crate) fn finite(value: Option<f32>) -> Option<f32> {
    value.filter(|v| v.is_finite())
}

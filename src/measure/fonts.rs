use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use ttf_parser::Face;

use crate::error::{Error, Result};
use crate::measure::{LineMetrics, TextMeasurer};
use crate::model::Run;

const DEFAULT_ASCENDER_RATIO: f32 = 0.75;
const DEFAULT_LINE_HEIGHT_RATIO: f32 = 1.2;

/// Helvetica-like advance widths in 1000-units, used when no font file is available.
fn approx_char_width_1000(ch: char) -> f32 {
    match ch {
        ' ' => 278.0,
        '!'..='/' => 333.0,
        '0'..='9' => 556.0,
        ':'..='@' => 333.0,
        'I' | 'J' => 278.0,
        'M' => 833.0,
        'A'..='Z' => 667.0,
        '['..='`' => 333.0,
        'f' | 'i' | 'j' | 'l' | 't' => 278.0,
        'm' | 'w' => 833.0,
        'a'..='z' => 556.0,
        '\u{2022}' => 350.0,
        c if c.is_control() => 0.0,
        _ => 556.0,
    }
}

/// Metrics-free measurer with fixed Helvetica-style widths.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApproxMetrics;

impl TextMeasurer for ApproxMetrics {
    fn text_width(&self, text: &str, run: &Run) -> Option<f32> {
        Some(
            text.chars()
                .map(|ch| approx_char_width_1000(ch) * run.font_size / 1000.0)
                .sum(),
        )
    }

    fn line_metrics(&self, run: &Run) -> LineMetrics {
        let ascent = run.font_size * DEFAULT_ASCENDER_RATIO;
        let descent = run.font_size * (1.0 - DEFAULT_ASCENDER_RATIO);
        LineMetrics {
            ascent,
            descent,
            line_gap: run.font_size * DEFAULT_LINE_HEIGHT_RATIO - ascent - descent,
        }
    }
}

enum FontData {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl AsRef<[u8]> for FontData {
    fn as_ref(&self) -> &[u8] {
        match self {
            FontData::Mapped(m) => m,
            FontData::Owned(v) => v,
        }
    }
}

/// Measures every run with the advances of a single TrueType/OpenType face.
/// Characters the face has no glyph for fall back to [`ApproxMetrics`].
pub struct FontFaceMetrics {
    data: FontData,
    face_index: u32,
    units_per_em: f32,
    ascender_ratio: f32,
    descender_ratio: f32,
    line_gap_ratio: f32,
    widths_1000: HashMap<char, f32>,
}

impl FontFaceMetrics {
    pub fn open(path: &Path, face_index: u32) -> Result<Self> {
        let file = File::open(path)?;
        let data = unsafe { Mmap::map(&file) }?;
        Self::from_data(FontData::Mapped(data), face_index)
            .map_err(|e| Error::Font(format!("{}: {e}", path.display())))
    }

    pub fn from_bytes(bytes: Vec<u8>, face_index: u32) -> Result<Self> {
        Self::from_data(FontData::Owned(bytes), face_index)
    }

    fn from_data(data: FontData, face_index: u32) -> Result<Self> {
        let face = Face::parse(data.as_ref(), face_index)
            .map_err(|e| Error::Font(format!("unreadable font face {face_index}: {e}")))?;
        let units = face.units_per_em() as f32;
        let ascender_ratio = face.ascender() as f32 / units;
        let descender_ratio = -(face.descender() as f32) / units;
        let line_gap_ratio = face.line_gap() as f32 / units;
        log::debug!(
            "font face {face_index}: {} units/em, {} glyphs",
            units,
            face.number_of_glyphs()
        );
        Ok(Self {
            data,
            face_index,
            units_per_em: units,
            ascender_ratio,
            descender_ratio,
            line_gap_ratio,
            widths_1000: HashMap::new(),
        })
    }

    /// Resolve advances for `chars` up front so later lookups skip parsing.
    pub fn preload(&mut self, chars: impl IntoIterator<Item = char>) {
        let Ok(face) = Face::parse(self.data.as_ref(), self.face_index) else {
            return;
        };
        for ch in chars {
            if self.widths_1000.contains_key(&ch) {
                continue;
            }
            if let Some(adv) = face.glyph_index(ch).and_then(|gid| face.glyph_hor_advance(gid)) {
                self.widths_1000
                    .insert(ch, adv as f32 / self.units_per_em * 1000.0);
            }
        }
    }

    fn char_width_1000(&self, face: Option<&Face<'_>>, ch: char) -> f32 {
        if let Some(&w) = self.widths_1000.get(&ch) {
            return w;
        }
        face.and_then(|f| f.glyph_index(ch).and_then(|gid| f.glyph_hor_advance(gid)))
            .map(|adv| adv as f32 / self.units_per_em * 1000.0)
            .unwrap_or_else(|| approx_char_width_1000(ch))
    }
}

impl TextMeasurer for FontFaceMetrics {
    fn text_width(&self, text: &str, run: &Run) -> Option<f32> {
        let needs_face = text.chars().any(|ch| !self.widths_1000.contains_key(&ch));
        let face = if needs_face {
            Face::parse(self.data.as_ref(), self.face_index).ok()
        } else {
            None
        };
        Some(
            text.chars()
                .map(|ch| self.char_width_1000(face.as_ref(), ch) * run.font_size / 1000.0)
                .sum(),
        )
    }

    fn line_metrics(&self, run: &Run) -> LineMetrics {
        LineMetrics {
            ascent: run.font_size * self.ascender_ratio,
            descent: run.font_size * self.descender_ratio,
            line_gap: run.font_size * self.line_gap_ratio,
        }
    }
}

//! Font discovery, text layout and glyph outlines for the rasterizer.

use std::path::Path;

use ab_glyph::{Font, FontArc, OutlineCurve, PxScale, ScaleFont};
use log::{debug, warn};
use tiny_skia::PathBuilder;

/// Gap between a text box edge and its first glyph, in author units.
pub const TEXT_INSET: f32 = 4.0;
/// Extra margin drawn around a text box background, in author units.
pub const BACKGROUND_PADDING: f32 = 6.0;

const FONT_CANDIDATES: &[&str] = &[
    "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/System/Library/Fonts/SFNS.ttf",
    "/System/Library/Fonts/Supplemental/Helvetica.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Loads `preferred` if given and readable, else the first system font found.
pub fn load_font(preferred: Option<&Path>) -> Option<FontArc> {
    if let Some(path) = preferred {
        match std::fs::read(path).map(FontArc::try_from_vec) {
            Ok(Ok(font)) => return Some(font),
            Ok(Err(err)) => warn!("font {} is not usable: {err}", path.display()),
            Err(err) => warn!("cannot read font {}: {err}", path.display()),
        }
    }

    for path in FONT_CANDIDATES {
        if let Ok(bytes) = std::fs::read(path) {
            if let Ok(font) = FontArc::try_from_vec(bytes) {
                debug!("using system font {path}");
                return Some(font);
            }
        }
    }

    warn!("no usable system font found; text will not be rasterized");
    None
}

fn px_scale(font: &FontArc, size: f32) -> PxScale {
    font.pt_to_px_scale(size).unwrap_or(PxScale::from(size))
}

/// Advance width of a single line at `size`.
pub fn measure(font: &FontArc, text: &str, size: f32) -> f32 {
    let scaled = font.as_scaled(px_scale(font, size));
    let mut width = 0.0;
    let mut previous = None;
    for ch in text.chars() {
        let id = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            width += scaled.kern(prev, id);
        }
        width += scaled.h_advance(id);
        previous = Some(id);
    }
    width
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextLayout {
    pub lines: Vec<String>,
    pub ascent: f32,
    /// Negative, below the baseline.
    pub descent: f32,
    pub line_height: f32,
}

/// Greedy word wrap of `content` to `max_width`. Explicit newlines always
/// break; a single word wider than the box stays on its own line.
pub fn layout(font: &FontArc, content: &str, size: f32, max_width: f32) -> TextLayout {
    let scaled = font.as_scaled(px_scale(font, size));
    let mut lines = Vec::new();
    for paragraph in content.split('\n') {
        let mut line = String::new();
        for word in paragraph.split(' ') {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{line} {word}")
            };
            if !line.is_empty() && measure(font, &candidate, size) > max_width {
                lines.push(std::mem::replace(&mut line, word.to_string()));
            } else {
                line = candidate;
            }
        }
        lines.push(line);
    }

    TextLayout {
        lines,
        ascent: scaled.ascent(),
        descent: scaled.descent(),
        line_height: scaled.height() + scaled.line_gap(),
    }
}

/// Ascent and descent at `size`, descent negative.
pub fn vertical_metrics(font: &FontArc, size: f32) -> (f32, f32) {
    let scaled = font.as_scaled(px_scale(font, size));
    (scaled.ascent(), scaled.descent())
}

/// Appends the outlines of `text` to `pb` with the baseline starting at
/// `origin`. Coordinates are Y-up, matching the font's own convention.
pub fn push_glyphs(pb: &mut PathBuilder, font: &FontArc, text: &str, size: f32, origin: (f32, f32)) {
    let scaled = font.as_scaled(px_scale(font, size));
    let (sx, sy) = (scaled.h_scale_factor(), scaled.v_scale_factor());
    let mut caret = origin.0;
    let mut previous = None;

    for ch in text.chars() {
        let id = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            caret += scaled.kern(prev, id);
        }
        previous = Some(id);

        if let Some(outline) = font.outline(id) {
            let map = |p: ab_glyph::Point| (caret + p.x * sx, origin.1 + p.y * sy);
            let mut last: Option<ab_glyph::Point> = None;
            for curve in &outline.curves {
                let (start, end) = match curve {
                    OutlineCurve::Line(a, b) => (*a, *b),
                    OutlineCurve::Quad(a, _, b) => (*a, *b),
                    OutlineCurve::Cubic(a, _, _, b) => (*a, *b),
                };
                if last != Some(start) {
                    if last.is_some() {
                        pb.close();
                    }
                    let (x, y) = map(start);
                    pb.move_to(x, y);
                }
                match curve {
                    OutlineCurve::Line(_, b) => {
                        let (x, y) = map(*b);
                        pb.line_to(x, y);
                    }
                    OutlineCurve::Quad(_, c, b) => {
                        let (cx, cy) = map(*c);
                        let (x, y) = map(*b);
                        pb.quad_to(cx, cy, x, y);
                    }
                    OutlineCurve::Cubic(_, c1, c2, b) => {
                        let (c1x, c1y) = map(*c1);
                        let (c2x, c2y) = map(*c2);
                        let (x, y) = map(*b);
                        pb.cubic_to(c1x, c1y, c2x, c2y, x, y);
                    }
                }
                last = Some(end);
            }
            if last.is_some() {
                pb.close();
            }
        }

        caret += scaled.h_advance(id);
    }
}

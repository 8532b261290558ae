//! Caption overlay rendering for generated memes.
//!
//! The background is stretched to a fixed canvas (aspect ratio is not kept)
//! and each caption line is drawn upper-cased and centered, with a dark
//! outline under a light fill.

use ab_glyph::{point, Font, FontArc, Glyph, GlyphId, PxScale, ScaleFont};
use image::{imageops::FilterType, DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::{io::Cursor, path::Path};
use thiserror::Error;

pub const CANVAS_WIDTH: u32 = 500;
pub const CANVAS_HEIGHT: u32 = 400;
/// Extra space between consecutive caption lines.
const LINE_GAP: f32 = 6.0;
/// Distance from the bottom edge to the last bottom-caption baseline.
const BOTTOM_MARGIN: f32 = 20.0;

/// Longest caption accepted for one block, in characters.
pub const MAX_CAPTION_CHARS: usize = 200;
/// Most lines accepted for one block.
pub const MAX_CAPTION_LINES: usize = 4;

const OUTLINE: Rgba<u8> = Rgba([0, 0, 0, 255]);
const FILL: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("Could not read font file: {0}")]
    FontIo(#[from] std::io::Error),
    #[error("Invalid font data: {0}")]
    InvalidFont(#[from] ab_glyph::InvalidFont),
    #[error("Could not fetch background image: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("Could not decode or encode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("Rendering task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Rejects a caption block that is too long to draw.
pub fn check_caption(block: TextBlock, text: &str) -> Result<(), String> {
    let label = match block {
        TextBlock::Top => "top",
        TextBlock::Bottom => "bottom",
    };
    if text.chars().count() > MAX_CAPTION_CHARS {
        return Err(format!("{} text is longer than {} characters", label, MAX_CAPTION_CHARS));
    }
    if text.split('\n').count() > MAX_CAPTION_LINES {
        return Err(format!("{} text has more than {} lines", label, MAX_CAPTION_LINES));
    }
    Ok(())
}

/// Sizes derived from the canvas width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasMetrics {
    pub width: u32,
    pub height: u32,
    pub font_px: f32,
    pub line_height: f32,
    pub stroke_width: f32,
}

impl CanvasMetrics {
    pub fn for_canvas(width: u32, height: u32) -> Self {
        let font_px = (width as f32 / 12.0).round();
        Self {
            width,
            height,
            font_px,
            line_height: font_px + LINE_GAP,
            stroke_width: (font_px / 10.0).round().max(2.0),
        }
    }
}

impl Default for CanvasMetrics {
    fn default() -> Self {
        Self::for_canvas(CANVAS_WIDTH, CANVAS_HEIGHT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextBlock {
    Top,
    Bottom,
}

/// One caption line, already upper-cased, with its baseline on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub block: TextBlock,
    pub text: String,
    pub baseline: f32,
}

/// Places caption lines. Top text hangs from the top edge; bottom text grows
/// upward from the bottom edge. Empty captions produce no lines.
pub fn layout_captions(top: &str, bottom: &str, metrics: &CanvasMetrics) -> Vec<PlacedLine> {
    let mut placed = Vec::new();

    if !top.is_empty() {
        placed.extend(top.split('\n').enumerate().map(|(i, line)| PlacedLine {
            block: TextBlock::Top,
            text: line.to_uppercase(),
            baseline: metrics.font_px + i as f32 * metrics.line_height,
        }));
    }

    if !bottom.is_empty() {
        let lines: Vec<&str> = bottom.split('\n').collect();
        let first = metrics.height as f32 - BOTTOM_MARGIN - (lines.len() - 1) as f32 * metrics.line_height;
        placed.extend(lines.into_iter().enumerate().map(|(i, line)| PlacedLine {
            block: TextBlock::Bottom,
            text: line.to_uppercase(),
            baseline: first + i as f32 * metrics.line_height,
        }));
    }

    placed
}

pub fn stretch_background(background: &DynamicImage, metrics: &CanvasMetrics) -> RgbaImage {
    image::imageops::resize(&background.to_rgba8(), metrics.width, metrics.height, FilterType::Triangle)
}

/// What the canvas looks like when the background never loaded.
pub fn blank_canvas(metrics: &CanvasMetrics) -> RgbaImage {
    RgbaImage::new(metrics.width, metrics.height)
}

pub fn encode_png(canvas: &RgbaImage) -> Result<Vec<u8>, OverlayError> {
    let mut buf = Cursor::new(Vec::new());
    canvas.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Draws captions onto template backgrounds.
#[derive(Clone)]
pub struct CaptionRenderer {
    font: FontArc,
    metrics: CanvasMetrics,
    http: reqwest::Client,
}

impl CaptionRenderer {
    pub fn new(font: FontArc, http: reqwest::Client) -> Self {
        Self {
            font,
            metrics: CanvasMetrics::default(),
            http,
        }
    }

    /// Loads a TTF/OTF font from disk.
    pub fn from_font_file(path: &Path, http: reqwest::Client) -> Result<Self, OverlayError> {
        let bytes = std::fs::read(path)?;
        let font = FontArc::try_from_vec(bytes)?;
        tracing::info!(font.path = %path.display(), "Loaded caption font");
        Ok(Self::new(font, http))
    }

    pub fn metrics(&self) -> &CanvasMetrics {
        &self.metrics
    }

    /// Downloads and decodes a background. Decoding runs on the blocking pool.
    pub async fn fetch_background(&self, url: &str) -> Result<DynamicImage, OverlayError> {
        tracing::debug!(%url, "Fetching template background");
        let bytes = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let image = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes)).await??;
        Ok(image)
    }

    /// Composes and encodes a PNG on the blocking pool. Without a background
    /// the canvas stays blank.
    pub async fn render_png(
        &self,
        background: Option<DynamicImage>,
        top: &str,
        bottom: &str,
    ) -> Result<Vec<u8>, OverlayError> {
        let renderer = self.clone();
        let (top, bottom) = (top.to_string(), bottom.to_string());
        tokio::task::spawn_blocking(move || {
            let canvas = match background {
                Some(background) => renderer.compose(&background, &top, &bottom),
                None => blank_canvas(&renderer.metrics),
            };
            encode_png(&canvas)
        })
        .await?
    }

    /// Renders a preview PNG for a template. A background that fails to load
    /// leaves the canvas blank.
    pub async fn preview(&self, background_url: &str, top: &str, bottom: &str) -> Result<Vec<u8>, OverlayError> {
        let background = match self.fetch_background(background_url).await {
            Ok(background) => Some(background),
            Err(e) => {
                tracing::warn!(url = %background_url, error = %e, "Template background failed to load");
                None
            }
        };
        self.render_png(background, top, bottom).await
    }

    /// Stretches `background` onto the canvas and draws both captions.
    pub fn compose(&self, background: &DynamicImage, top: &str, bottom: &str) -> RgbaImage {
        let mut canvas = stretch_background(background, &self.metrics);
        for line in layout_captions(top, bottom, &self.metrics) {
            self.draw_line(&mut canvas, &line);
        }
        canvas
    }

    fn draw_line(&self, canvas: &mut RgbaImage, line: &PlacedLine) {
        let scale = PxScale::from(self.metrics.font_px);
        let scaled = self.font.as_scaled(scale);

        let width = {
            let mut caret = 0.0;
            let mut prev: Option<GlyphId> = None;
            for c in line.text.chars() {
                let id = scaled.glyph_id(c);
                if let Some(prev) = prev {
                    caret += scaled.kern(prev, id);
                }
                caret += scaled.h_advance(id);
                prev = Some(id);
            }
            caret
        };

        let mut caret = self.metrics.width as f32 / 2.0 - width / 2.0;
        let mut prev: Option<GlyphId> = None;
        let mut glyphs = Vec::with_capacity(line.text.len());
        for c in line.text.chars() {
            let id = scaled.glyph_id(c);
            if let Some(prev) = prev {
                caret += scaled.kern(prev, id);
            }
            glyphs.push(id.with_scale_and_position(scale, point(caret, line.baseline)));
            caret += scaled.h_advance(id);
            prev = Some(id);
        }

        // Outline: stamp the glyphs across a disc of half the stroke width.
        let radius = self.metrics.stroke_width / 2.0;
        let reach = radius.ceil() as i32;
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                if (dx * dx + dy * dy) as f32 > radius * radius {
                    continue;
                }
                self.paint(canvas, &glyphs, (dx as f32, dy as f32), OUTLINE);
            }
        }
        self.paint(canvas, &glyphs, (0.0, 0.0), FILL);
    }

    fn paint(&self, canvas: &mut RgbaImage, glyphs: &[Glyph], offset: (f32, f32), color: Rgba<u8>) {
        for glyph in glyphs {
            let mut glyph = glyph.clone();
            glyph.position.x += offset.0;
            glyph.position.y += offset.1;
            let Some(outlined) = self.font.outline_glyph(glyph) else {
                continue; // whitespace
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|x, y, coverage| {
                blend(
                    canvas,
                    bounds.min.x as i32 + x as i32,
                    bounds.min.y as i32 + y as i32,
                    color,
                    coverage,
                );
            });
        }
    }
}

fn blend(canvas: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>, coverage: f32) {
    if x < 0 || y < 0 || x >= canvas.width() as i32 || y >= canvas.height() as i32 {
        return;
    }
    let c = coverage.clamp(0.0, 1.0);
    let pixel = canvas.get_pixel_mut(x as u32, y as u32);
    for i in 0..3 {
        pixel[i] = (pixel[i] as f32 * (1.0 - c) + color[i] as f32 * c).round() as u8;
    }
    pixel[3] = (pixel[3] as f32 + (255 - pixel[3]) as f32 * c).round() as u8;
}

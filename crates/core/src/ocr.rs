use serde::{Deserialize, Serialize};

/// Raw output of the upstream OCR/vision provider for one image.
///
/// `blocks` is empty when the provider only returns flat text; the parsing
/// pipeline degrades to line-index heuristics in that case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOcrResult {
    pub text: String,
    /// Provider's own recognition confidence (0.0–1.0).
    pub confidence: f32,
    #[serde(default)]
    pub blocks: Vec<TextBlock>,
}

impl RawOcrResult {
    pub fn from_text(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            blocks: Vec::new(),
        }
    }
}

/// One recognized region of text with its position on the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    #[serde(default)]
    pub confidence: f32,
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub words: Vec<TextWord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextWord {
    pub text: String,
    #[serde(default)]
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

/// Pixel-space rectangle; origin at the top-left of the source image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn bottom(self) -> f32 {
        self.y + self.height
    }

    pub fn center_y(self) -> f32 {
        self.y + self.height / 2.0
    }
}

use serde::{Deserialize, Serialize};

/// The uniform contract every field parser returns.
///
/// Expected misses ("no subtotal line found") are never `Err` values — they
/// are strings pushed into `errors` plus a lowered `confidence`, so a parse
/// always yields usable, if degraded, data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParserResult<T> {
    pub data: T,
    /// Self-assessed confidence in `data` (0.0 = guessed, 1.0 = certain).
    pub confidence: f32,
    pub errors: Vec<String>,
}

impl<T> ParserResult<T> {
    pub fn new(data: T, confidence: f32) -> Self {
        Self {
            data,
            confidence: confidence.clamp(0.0, 1.0),
            errors: Vec::new(),
        }
    }

    pub fn with_errors(data: T, confidence: f32, errors: Vec<String>) -> Self {
        Self {
            data,
            confidence: confidence.clamp(0.0, 1.0),
            errors,
        }
    }

    pub fn push_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn set_confidence(&mut self, confidence: f32) {
        self.confidence = confidence.clamp(0.0, 1.0);
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ParserResult<U> {
        ParserResult {
            data: f(self.data),
            confidence: self.confidence,
            errors: self.errors,
        }
    }
}

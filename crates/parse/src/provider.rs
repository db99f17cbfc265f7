use thiserror::Error;

use recibo_core::{ParserResult, RawOcrResult, Receipt};

use crate::pipeline::{ParseOptions, ReceiptParser};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("Vision engine error: {0}")]
    Engine(String),
    #[error("Vision provider not available: {0}")]
    NotAvailable(String),
}

/// Abstraction over an upstream OCR/vision engine. Implementations accept
/// raw image bytes and return raw recognized text, optionally with spatial
/// blocks. The parser never retries, rate-limits, or decodes images itself.
pub trait VisionProvider: Send + Sync {
    fn recognize(&self, image: &[u8]) -> Result<RawOcrResult, ProviderError>;
}

// ── Mock provider (always available, used for tests) ──────────────────────────

/// Returns a pre-set result — lets pipeline tests run without a real OCR
/// engine behind them.
pub struct MockProvider {
    pub result: RawOcrResult,
}

impl MockProvider {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            result: RawOcrResult::from_text(text.into(), 0.95),
        }
    }

    pub fn with_result(result: RawOcrResult) -> Self {
        Self { result }
    }
}

impl VisionProvider for MockProvider {
    fn recognize(&self, _image: &[u8]) -> Result<RawOcrResult, ProviderError> {
        Ok(self.result.clone())
    }
}

// ── Provider → parser chaining ────────────────────────────────────────────────

/// Owns both ends: hands image bytes to the provider, then feeds the
/// recognized text straight into the parser.
pub struct ScanPipeline<P: VisionProvider> {
    provider: P,
    parser: ReceiptParser,
}

impl<P: VisionProvider> ScanPipeline<P> {
    pub fn new(provider: P, parser: ReceiptParser) -> Self {
        Self { provider, parser }
    }

    pub fn scan(
        &self,
        image: &[u8],
        opts: &ParseOptions,
    ) -> Result<ParserResult<Receipt>, ProviderError> {
        let raw = self.provider.recognize(image)?;
        Ok(self.parser.parse(&raw, opts))
    }
}

pub mod context;
pub mod date;
pub mod items;
pub mod matcher;
pub mod normalize;
pub mod payment;
pub mod pipeline;
pub mod preprocess;
pub mod provider;
pub mod store;
pub mod totals;
pub mod tuning;

pub use context::ParseContext;
pub use matcher::{find_best_match, GenericFeatures, MatchResult};
pub use normalize::{correct_ocr_errors, normalize};
pub use pipeline::{ParseOptions, ReceiptParser};
pub use preprocess::{preprocess, PreprocessResult, SectionMap};
pub use provider::{MockProvider, ProviderError, ScanPipeline, VisionProvider};
pub use tuning::Tuning;

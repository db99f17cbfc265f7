pub mod catalog;
pub mod compiled;
pub mod template;

pub use catalog::{CatalogError, TemplateCatalog, COMMON_RETAILERS};
pub use compiled::{CompiledItemPattern, CompiledTemplate, CompiledTotalsPatterns};
pub use template::{ItemPattern, ItemPatternKind, ReceiptTemplate, TotalsPatterns};

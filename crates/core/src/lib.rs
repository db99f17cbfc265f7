pub mod money;
pub mod ocr;
pub mod period;
pub mod receipt;
pub mod result;

pub use money::Money;
pub use ocr::{BoundingBox, RawOcrResult, TextBlock, TextWord};
pub use period::DateRange;
pub use receipt::{
    ItemCategory, PaymentInfo, PaymentMethod, Receipt, ReceiptItem, ReceiptTotals, Store,
};
pub use result::ParserResult;

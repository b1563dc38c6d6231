pub mod engine;
pub mod models;

pub use engine::{AttributionEngine, AttributionError, CreateConversionRequest, RefundOutcome};
pub use models::{Conversion, ConversionRepository, ConversionStatus};

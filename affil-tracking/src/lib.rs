pub mod models;
pub mod service;

pub use models::{ClickRecord, ClickRepository};
pub use service::{RecordClickRequest, TrackingError, TrackingService};

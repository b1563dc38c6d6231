pub mod engine;
pub mod models;

pub use engine::{CommissionEngine, CommissionError, CommissionRules};
pub use models::{
    Commission, CommissionAdjustment, CommissionFilter, CommissionPage, CommissionRepository,
    CommissionStatus,
};

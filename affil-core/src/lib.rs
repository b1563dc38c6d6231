pub mod audit;
pub mod money;
pub mod partner;
pub mod products;
pub mod repository;

pub use audit::{ActorType, AuditLogEntry};
pub use partner::{Partner, PartnerError, PartnerStatus, PartnerTier, PayoutCadence};
pub use products::ProductCategory;
pub use repository::{AuditLogRepository, PartnerRepository, ProductDirectory};

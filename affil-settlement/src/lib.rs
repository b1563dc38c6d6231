pub mod batch;
pub mod relay;

pub use batch::{
    PayeeType, SettlementBatch, SettlementEngine, SettlementError, SettlementLine,
    SettlementRepository, SettlementStatus,
};
pub use relay::{
    CreateRelayRequest, OrderRelay, RelayError, RelayRepository, RelayService, RelayStatus,
};

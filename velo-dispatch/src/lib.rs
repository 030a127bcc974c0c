pub mod assignment;
pub mod credit;
pub mod hooks;
pub mod lifecycle;
pub mod locks;
pub mod settlement;

pub use assignment::AssignmentSelector;
pub use credit::{CreditEvaluation, CreditGate};
pub use lifecycle::{Actor, OrderLifecycle, TransitionResult};
pub use locks::OrderLocks;
pub use settlement::{SettlementLedger, SettlementOutcome, SettlementTrigger};

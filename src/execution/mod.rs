pub mod executor;
pub mod idempotency;
pub mod ledger;
pub mod sizer;

pub use executor::CopyExecutor;
pub use ledger::MarginLedger;

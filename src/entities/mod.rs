//! Database entities backing the stock ledger.

pub mod division;
pub mod item;
pub mod location;
pub mod project;
pub mod stock;
pub mod sync_op;
pub mod transaction;

pub use location::LocationKind;
pub use sync_op::{SyncOpKind, SyncOutcome};
pub use transaction::TxnType;

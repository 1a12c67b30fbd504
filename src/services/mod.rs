// Stock ledger engine
pub mod directory;
pub mod scoping;
pub mod stock_ledger;
pub mod transactions;

// Offline outbox gateway
pub mod sync;

// Supporting services
pub mod projects;
pub mod reports;

pub mod database;
pub mod transactions;

pub use database::Catalog;
pub use transactions::TransactionCoordinator;

pub mod models;
pub mod repository;
pub mod service;
pub mod store;

#[cfg(test)]
pub mod memory;

pub use repository::PgPaymentStore;
pub use service::PaymentLedger;

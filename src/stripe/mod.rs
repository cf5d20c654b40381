pub mod client;
pub mod models;
pub mod signature;
pub mod transactions;

pub use client::StripeClient;
pub use transactions::TransactionClient;

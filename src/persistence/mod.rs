//! Persistence layer: PostgreSQL-backed ledger.
//!
//! [`PostgresLedger`] implements [`crate::ledger::Ledger`] on top of
//! `sqlx::PgPool`, holding row locks for the duration of each transaction.

pub mod models;
pub mod postgres;

pub use postgres::PostgresLedger;

//! # slotswap
//!
//! REST and WebSocket service for two-party time-slot swaps.
//!
//! Users publish time slots, mark some of them `SWAPPABLE`, and propose
//! exchanging one of theirs for someone else's. A proposal reserves both
//! slots until the target owner accepts (owners are exchanged) or rejects
//! (both slots are released). Every step runs as a single ledger
//! transaction, so a slot is never held by two pending proposals and a
//! request is never resolved twice.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── SlotService / SwapService (service/)
//!     ├── EventBus → NotificationSink (domain/)
//!     │
//!     ├── Ledger trait (ledger/)
//!     │     ├── MemoryLedger
//!     │     └── PostgresLedger (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod persistence;
pub mod service;
pub mod ws;

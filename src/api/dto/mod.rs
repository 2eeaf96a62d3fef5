//! Data Transfer Objects for REST request bodies.
//!
//! Responses serialize the domain types directly.

pub mod slot_dto;
pub mod swap_dto;

pub use slot_dto::*;
pub use swap_dto::*;

//! Read-only admin API over the scaler's in-memory state.

pub mod controller;
pub mod dto;
pub mod routes;
pub mod util;

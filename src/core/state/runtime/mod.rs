//! In-memory state kept fresh by background loops and read by the scaler.

pub mod counts;
pub mod workload;

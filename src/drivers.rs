//! Chip drivers.

pub mod lm83;

//! Pure domain types shared by every layer.

pub mod models;

//! Route handlers

pub mod alerts;
pub mod connection;
pub mod data;
pub mod devices;
pub mod diagnostics;

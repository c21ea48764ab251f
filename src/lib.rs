//! Microsoft 365 tenant reporting and operations
//!
//! Pulls tenant data from Microsoft Graph, falls back to generated sample
//! data when live data is unavailable, and renders cadence reports (HTML,
//! CSV, JSON, PDF). Remote calls share one retry/classification policy in
//! [`retry`].

pub mod audit;
pub mod cmd;
pub mod config;
pub mod error;
pub mod graph;
pub mod ops;
pub mod report;
pub mod retry;

pub use error::{Error, M365Error, Result};

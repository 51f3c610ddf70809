//! Subscription approval, commission distribution, and house-ledger workflows for a
//! multi-tenant business directory.

pub mod billing;
pub mod config;
pub mod error;
pub mod telemetry;

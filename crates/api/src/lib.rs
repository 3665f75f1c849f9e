//! HTTP clients for external services used by the repair tool.
//!
//! This crate provides:
//! - Hermes: signed price updates and parsed prices from the Pyth feed service

mod hermes;

pub use hermes::{scaled_decimal, FeedError, HermesClient, PriceUpdate, DEFAULT_HERMES_URL};

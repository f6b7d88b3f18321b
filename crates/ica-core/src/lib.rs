//! Core domain + application logic for the Intelligent Crypto Assistant.
//!
//! This crate is framework-agnostic. CoinGecko, Telegram and the MCP
//! transports live behind ports (traits) implemented in adapter crates.

pub mod assistant;
pub mod cache;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod ports;
pub mod report;
pub mod security;
pub mod tools;

pub use errors::{Error, Result};

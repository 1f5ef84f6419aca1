//! Fee-sponsoring relay for Solana: builds swap and transfer transactions
//! whose network fees and rent a service wallet pays, charging users in a
//! sponsored SPL token instead.

pub mod api;
pub mod cache;
pub mod chain;
pub mod cli;
pub mod config;
pub mod engine;
pub mod instructions;
pub mod monitoring;

//! services/api/src/lib.rs
//!
//! The HTTP service around the Crypto Bird progress core.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;

//! Ratewall - Fixed-Window Rate Limiting and Abuse Blocking
//!
//! This crate protects OTP issuance, OTP verification, chat and generic API
//! traffic from flooding and brute force. Counters are kept in a shared
//! REST counter store when one is configured and fall back to an in-process
//! store whenever it fails. A separate, TTL-based block list denies
//! identifiers outright.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;

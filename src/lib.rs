// src/lib.rs

//! Machi Crawler Library
//!
//! Scrapes local event listings from feed and HTML sources, guards against
//! silent markup changes, and refreshes a shared event store.

pub mod config;
pub mod error;
#[cfg(feature = "lambda")]
pub mod lambda;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

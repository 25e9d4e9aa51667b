//! Delicious - discover, review and geo-search local stores
//!
//! This library provides the core functionality behind the `delicious`
//! server: configuration, persistence, business rules, page rendering and
//! the HTTP layer.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod views;

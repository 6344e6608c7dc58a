//! sitecache library
//!
//! Read cache and cost-safety governor in front of a metered document store
//! holding slug-addressed storefront sites. The binary and the integration
//! tests use this crate.

pub mod app;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod data;
pub mod governor;
pub mod owner;
pub mod resolver;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod ui;

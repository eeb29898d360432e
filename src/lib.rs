pub mod api;
pub mod config;
pub mod counters;
pub mod error;
pub mod ledger;
pub mod service;
pub mod store;
pub mod trade;
pub mod utils;

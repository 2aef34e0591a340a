//! Core domain types and logic.

pub mod assets;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod lifecycle;
pub mod metrics;
pub mod quality;
pub mod regime;
pub mod risk;
pub mod signals;
pub mod timeseries;
pub mod turnover;
pub mod weights;

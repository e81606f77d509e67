//! LagBox - input device latency measurement
//!
//! Finds USB input devices, detects the button to measure, drives the
//! external measurement tool and turns its result file into statistics.

pub mod cancel;
pub mod config;
pub mod device;
pub mod input;
pub mod report;
pub mod results;
pub mod session;
pub mod utils;

pub use cancel::CancelToken;
pub use config::Config;

//! Metrics collection and export for the realtime subscription layer.
//!
//! This crate provides metric name definitions and recorder setup on top of
//! the `metrics` crate facade. When the `prometheus` feature is enabled,
//! metrics are rendered in Prometheus text format.
//!
//! # Usage
//!
//! ```rust,ignore
//! use rally_metrics::{counter, realtime};
//!
//! counter!(realtime::RETRIES_SCHEDULED_TOTAL, "event" => "message_added").increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, describe_all, init_metrics},
};

pub use metrics::{counter, gauge, histogram};

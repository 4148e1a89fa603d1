//! duoroute - primary/secondary failover router for hosted LLM inference
//!
//! Sends each inference request to a primary endpoint and, only when the
//! primary reports throttling, retries it once against a secondary endpoint.
//! Every other failure is returned to the caller unchanged.

pub mod backend;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod models;
pub mod request_id;
pub mod router;
pub mod telemetry;

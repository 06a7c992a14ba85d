//! Retail analytics core: cohorts, RFM segmentation, segment metrics,
//! scenario simulation and headline KPIs over a cleaned invoice log.

pub mod cache;
pub mod cohort_engine;
pub mod config;
pub mod dashboard;
pub mod dataset;
pub mod error;
pub mod export;
pub mod filter;
pub mod kpi_summary;
pub mod loader;
pub mod quantile;
pub mod rfm_engine;
pub mod rng;
pub mod scenario_simulator;
pub mod segment_metrics;
pub mod types;

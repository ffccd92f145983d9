//! Database operations grouped by table

pub mod integrations;
pub mod scheduled_jobs;

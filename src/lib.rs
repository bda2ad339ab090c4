pub mod cli;
pub mod config;
pub mod data;
pub mod features;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod server;

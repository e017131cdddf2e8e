pub mod build_info;
pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod logging;
pub mod pipeline;
pub mod startup;

// Allow some clippy lints project-wide for code style consistency
#![allow(clippy::uninlined_format_args)]

pub mod audit;
pub mod change;
pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod deploy;
pub mod dialect;
pub mod environment;
pub mod error;
pub mod output;
pub mod platform;

#![forbid(unsafe_code)]

pub mod agent;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod executor;
pub mod memory;
pub mod plan;
pub mod ui;
pub mod utils;
pub mod validator;

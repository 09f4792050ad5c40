pub mod config;
pub mod helpers;
pub mod install;
pub mod memory;
pub mod plan;
pub mod validate;

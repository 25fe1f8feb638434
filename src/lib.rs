pub mod cli;
pub mod config;
pub mod database_ops;
pub mod logging;
pub mod models;
pub mod normalization;
pub mod orchestrator;
pub mod source;
pub mod validation;

pub mod util {
    pub mod env;
}

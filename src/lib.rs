pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod privacy;
pub mod state;
pub mod stats;
pub mod tracker;

pub use error::{Error, Result};

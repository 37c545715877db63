//! Cinder Core
//!
//! Core types, configuration and the error taxonomy shared by every stage
//! of the Cinder build-and-bind pipeline.

pub mod config;
pub mod error;
pub mod location;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use location::Location;
pub use types::*;

//! Strata Common - Shared Types and Utilities
//!
//! Foundational error handling, configuration and time utilities used by
//! the sequence format and the expression engine.
//!
//! Key Features:
//! - Unified error type with decode vs user error classification
//! - Table schema configuration loaded from TOML
//! - Nanosecond timestamp conversions and Go-style duration syntax
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod config;
pub mod error;
pub mod utils;

pub use config::{FieldConfig, SchemaConfig, TableConfig};
pub use error::{Result, StrataError};

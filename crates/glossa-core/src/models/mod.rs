//! Data models for Glossa.
//!
//! Records held by the four stores plus the reports the engine produces.

mod batch;
mod custom_model;
mod report;
mod trained_model;

pub use batch::*;
pub use custom_model::*;
pub use report::*;
pub use trained_model::*;

//! Shared types for the presence engine

mod error;

pub use error::{EngineError, Result, StoreUnavailable};

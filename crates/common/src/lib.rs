//! common - 通用工具库

pub mod env;
pub mod registry;

pub use env::*;
pub use registry::*;

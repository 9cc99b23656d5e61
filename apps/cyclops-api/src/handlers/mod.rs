//! Handlers 模块

pub mod admin;
pub mod agents;
pub mod health;
pub mod metrics;

pub use admin::*;
pub use agents::*;
pub use health::*;
pub use metrics::*;

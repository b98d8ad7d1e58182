pub mod config;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod map;
pub mod pipeline;

pub mod config;
pub mod error;
pub mod fetch;
pub mod history;
pub mod pipeline;
pub mod process;
pub mod sheets;
pub mod store;

pub use config::Config;
pub use error::{ConfigError, ParseError};
pub use pipeline::{run, PipelineOptions, RunReport};

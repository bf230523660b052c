pub mod api;
pub mod db;
pub mod error;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod render;

pub use error::PipelineError;

pub mod error;
pub mod pipeline;
pub mod types;

pub use error::{Result, StreamError};
pub use pipeline::{
    handle_consumer_result, should_retry, StreamPipeline, StreamPipelineConfig,
};
pub use types::{DlqEvent, PendingEntry, StreamEvent, StreamInfo};

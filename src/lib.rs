pub mod analyzer;
pub mod collector;
pub mod config;
pub mod fetch;
pub mod pipeline;
pub mod postgres;
pub mod processor;
pub mod scheduler;
pub mod storage;
pub mod types;

pub use analyzer::{Analysis, ContentAnalyzer, SentimentLabel};
pub use collector::FeedCollector;
pub use config::Settings;
pub use fetch::{FeedTransport, HttpTransport, HttpTransportConfig};
pub use pipeline::NewsPipeline;
pub use postgres::PgStorage;
pub use processor::BatchProcessor;
pub use scheduler::{JobFn, Scheduler};
pub use storage::{MemoryStorage, Storage};
pub use types::*;

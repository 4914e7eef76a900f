pub mod fetcher;
pub mod legacy;
pub mod modern;
pub mod rss;

pub use fetcher::{ArticleSink, Fetcher, SourceCheckResult, DEFAULT_INTRA_SOURCE_CONCURRENCY};

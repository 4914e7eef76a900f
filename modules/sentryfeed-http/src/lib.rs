pub mod client;
pub mod rate_limit;
pub mod request_log;
pub mod robots;

pub use client::{FetchRequest, FetchResponse, HttpClient};
pub use rate_limit::RateLimiter;
pub use request_log::{RequestLedger, RequestLogEntry};
pub use robots::RobotsCache;

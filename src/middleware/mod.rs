mod request_logger;
mod request_metrics;

pub use request_logger::{RequestId, RequestLogger, REQUEST_ID_HEADER};
pub use request_metrics::{RequestMetrics, DEFAULT_EXEMPT_PATHS};

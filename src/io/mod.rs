//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `http` - Inbound detection API, occupancy views, Prometheus metrics
//! - `notify` - Fire-and-forget outcome notification (channel + sinks)
//! - `egress` - Detections log output to file (JSONL format)

pub mod egress;
pub mod http;
pub mod notify;

// Re-export commonly used types
pub use egress::DetectionLog;
pub use http::{start_api_server, ApiContext};
pub use notify::{create_notify_channel, DetectionSink, Notifier, NotifySender, WebhookSink};

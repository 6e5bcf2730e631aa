//! Connection Hub and Event Router support.
//!
//! `handler` is the `axum` WebSocket upgrade entry point; `pool` tracks live
//! sockets and room membership; `router` classifies and dispatches inbound
//! events; `events` defines the wire envelope. The remaining modules
//! (`metrics`, `rate_limit`, `backpressure`, `error`, `timeout`) are
//! connection-level ambient concerns independent of collaboration semantics.

pub mod handler;
pub mod pool;
pub mod router;
pub mod metrics;
pub mod rate_limit;
pub mod backpressure;
pub mod error;
pub mod timeout;
pub mod events;

pub use handler::ws_handler;
pub use pool::ConnectionHub;
pub use router::{route, RouterContext};
pub use events::{classify, Envelope, EventCategory};
pub use metrics::{WebSocketMetrics, MetricsSnapshot};
pub use rate_limit::RateLimiter;
pub use backpressure::{BackpressureManager, ClientBackpressure, QueuedMessage};
pub use error::{WsError, WsResult};
pub use timeout::{TimeoutManager, TimeoutConfig, ClientTimeout};

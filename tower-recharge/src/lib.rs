//! # Tower Recharge
//!
//! `tower-recharge` is a client for the Recharge subscription-commerce API that
//! never exceeds the provider's rate limits while keeping a plain
//! call-and-await interface.
//!
//! ## The Dispatch Pipeline
//! Every call travels the same path:
//!
//! 1. **Admission**: [`RechargeClient::try_submit`] appends the request to a
//!    bounded FIFO queue, failing synchronously with
//!    [`RechargeError::QueueOverflow`] when the queue is full.
//! 2. **Throttling**: the head of the queue waits on a
//!    [`recharge_limit::CompositeLimiter`] until the burst bucket has a credit
//!    and the sustained window has a free slot.
//! 3. **Single-flight execution**: exactly one request is in flight against
//!    the API at any time, so callers observe strict submission order.
//! 4. **Classification**: the status code and decoded body become either a
//!    [`Response`] or a structured [`RechargeError`].
//!
//! The network hop is any `tower::Service<TransportRequest>`; [`HttpTransport`]
//! is the `reqwest` implementation used by default.

mod classify;
mod client;
mod config;
mod dispatcher;
mod error;
mod metrics;
mod queue;
mod request;
mod resources;
mod transport;


pub use classify::Response;
pub use classify::classify;
pub use client::RechargeClient;
pub use config::ClientConfig;
pub use error::ClassifiedResult;
pub use error::RechargeError;
pub use error::Result;
pub use error::ValidationErrors;
pub use queue::ResponseFuture;
pub use request::Method;
pub use request::RequestDescriptor;
pub use request::query_string;
pub use resources::Plans;
pub use resources::Products;
pub use resources::Subscriptions;
pub use transport::BoxTransport;
pub use transport::HttpTransport;
pub use transport::TransportRequest;
pub use transport::TransportResponse;

pub use recharge_limit::BucketConfig;
pub use recharge_limit::LimiterConfig;
pub use recharge_limit::WindowConfig;
pub use tokio_util::sync::CancellationToken;

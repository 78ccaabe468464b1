use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tower::Service;
use tower::ServiceBuilder;
use tower::util::BoxService;
use tracing::info;

use crate::classify::Response;
use crate::config::ClientConfig;
use crate::dispatcher::Dispatcher;
use crate::error::ClassifiedResult;
use crate::error::RechargeError;
use crate::error::Result;
use crate::metrics::DispatchMetrics;
use crate::queue::AdmissionQueue;
use crate::queue::ResponseFuture;
use crate::request::RequestDescriptor;
use crate::resources::Plans;
use crate::resources::Products;
use crate::resources::Subscriptions;
use crate::transport::BoxTransport;
use crate::transport::HttpTransport;
use crate::transport::TransportRequest;
use crate::transport::TransportResponse;

/// A rate limited handle to the Recharge API.
///
/// Clones share one admission queue, one limiter and one transport, so every
/// clone counts against the same provider budget. Construct and use it from
/// within a tokio runtime.
#[derive(Clone)]
pub struct RechargeClient {
    queue: Arc<AdmissionQueue>,
}

impl RechargeClient {
    /// A client with default settings over [`HttpTransport`].
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        Self::from_config(ClientConfig::new(access_token))
    }

    pub fn from_config(config: ClientConfig) -> Result<Self> {
        Self::with_transport(config, HttpTransport::new()?)
    }

    /// See [`ClientConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::from_config(ClientConfig::from_env()?)
    }

    /// A client over any transport service.
    ///
    /// The configured timeout, if any, is layered around `transport`.
    pub fn with_transport<T>(config: ClientConfig, transport: T) -> Result<Self>
    where
        T: Service<TransportRequest, Response = TransportResponse, Error = BoxError>
            + Send
            + 'static,
        T::Future: Send + 'static,
    {
        config.validate()?;

        let transport: BoxTransport = match config.timeout {
            Some(timeout) => BoxService::new(ServiceBuilder::new().timeout(timeout).service(transport)),
            None => BoxService::new(transport),
        };
        let metrics = DispatchMetrics::new();
        let dispatcher = Dispatcher::new(&config, transport, metrics.clone());

        info!(
            base_url = %config.base_url,
            max_depth = config.max_depth,
            timeout = ?config.timeout,
            limits = ?config.limits,
            "recharge client ready"
        );
        Ok(Self {
            queue: Arc::new(AdmissionQueue::new(dispatcher, config.max_depth, metrics)),
        })
    }

    /// Admits a request without waiting.
    ///
    /// Fails with [`RechargeError::QueueOverflow`] when the queue is full; the
    /// queue is left untouched. Otherwise the returned future resolves once
    /// the request has been dispatched and classified.
    pub fn try_submit(&self, descriptor: RequestDescriptor) -> Result<ResponseFuture> {
        self.queue.submit(descriptor, None)
    }

    /// Like [`Self::try_submit`], but the request resolves with
    /// [`RechargeError::Cancelled`] if `token` fires before it is dispatched.
    ///
    /// The returned future resolves as soon as the token fires, even while the
    /// request is still queued behind others; the dispatcher later skips it.
    /// Once the call has reached the transport, cancelling has no effect.
    pub fn submit_with_cancel(
        &self,
        descriptor: RequestDescriptor,
        token: CancellationToken,
    ) -> Result<ResponseFuture> {
        self.queue.submit(descriptor, Some(token))
    }

    pub async fn request(&self, descriptor: RequestDescriptor) -> ClassifiedResult {
        self.try_submit(descriptor)?.await
    }

    /// Performs a request and deserializes the payload, or the top-level
    /// `field` of it when one is named.
    pub async fn request_json<T>(&self, descriptor: RequestDescriptor, field: Option<&str>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let payload = self
            .request(descriptor)
            .await?
            .into_payload()
            .unwrap_or(Value::Null);
        let value = match field {
            Some(field) => match payload {
                Value::Object(mut map) => map.remove(field),
                _ => None,
            }
            .ok_or_else(|| RechargeError::Transport(format!("response has no `{field}` field")))?,
            None => payload,
        };
        serde_json::from_value(value).map_err(|err| RechargeError::Transport(err.to_string()))
    }

    /// Requests admitted but not yet being serviced.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Whether a request is currently being serviced.
    pub fn is_in_flight(&self) -> bool {
        self.queue.is_in_flight()
    }

    pub fn products(&self) -> Products<'_> {
        Products::new(self)
    }

    pub fn plans(&self) -> Plans<'_> {
        Plans::new(self)
    }

    pub fn subscriptions(&self) -> Subscriptions<'_> {
        Subscriptions::new(self)
    }
}

impl std::fmt::Debug for RechargeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RechargeClient")
            .field("queue_len", &self.queue_len())
            .field("in_flight", &self.is_in_flight())
            .finish()
    }
}

/// Always ready: admission is decided per call, and a full queue resolves the
/// call's future with [`RechargeError::QueueOverflow`].
impl Service<RequestDescriptor> for RechargeClient {
    type Response = Response;
    type Error = RechargeError;
    type Future = Pin<Box<dyn Future<Output = ClassifiedResult> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RequestDescriptor) -> Self::Future {
        let submitted = self.try_submit(req);
        Box::pin(async move { submitted?.await })
    }
}

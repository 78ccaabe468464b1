use bytes::Bytes;
use recharge_limit::CompositeLimiter;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::Service;
use tower::ServiceExt;
use tracing::debug;
use tracing::instrument;
use tracing::warn;

use crate::classify::Response;
use crate::classify::classify;
use crate::config::ClientConfig;
use crate::error::ClassifiedResult;
use crate::error::RechargeError;
use crate::metrics::DispatchMetrics;
use crate::request::RequestDescriptor;
use crate::transport::BoxTransport;
use crate::transport::TransportRequest;

pub(crate) const ACCESS_TOKEN_HEADER: &str = "X-Recharge-Access-Token";
pub(crate) const VERSION_HEADER: &str = "X-Recharge-Version";
const CONTENT_TYPE: &str = "Content-Type";
const JSON: &str = "application/json";
const NO_CONTENT: u16 = 204;

/// Executes admitted requests, one at a time.
///
/// Owns the limiter and the transport. Only the admission queue's drain step
/// ever holds a `Dispatcher`, so neither needs its own synchronization.
pub(crate) struct Dispatcher {
    transport: BoxTransport,
    limiter: CompositeLimiter,
    base_url: String,
    access_token: String,
    api_version: Option<String>,
    metrics: DispatchMetrics,
}

impl Dispatcher {
    pub(crate) fn new(config: &ClientConfig, transport: BoxTransport, metrics: DispatchMetrics) -> Self {
        Self {
            transport,
            limiter: CompositeLimiter::new(config.limits),
            base_url: config.base_url.clone(),
            access_token: config.access_token.clone(),
            api_version: config.api_version.clone(),
            metrics,
        }
    }

    /// Waits for a limiter grant, or for `cancel` to fire first.
    pub(crate) async fn admit(
        &mut self,
        descriptor: &RequestDescriptor,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), RechargeError> {
        let grant = match cancel {
            Some(token) => self.limiter.acquire_or_cancel(token).await.inspect_err(|_| {
                debug!(path = %descriptor.path, "cancelled while waiting for rate limit");
                self.metrics.cancelled(descriptor.method);
            })?,
            None => self.limiter.acquire().await,
        };
        self.metrics.limiter_waited(descriptor.method, grant.waits);
        Ok(())
    }

    /// Performs one call and classifies the outcome.
    #[instrument(level = "debug", skip_all, fields(method = %descriptor.method, path = %descriptor.path))]
    pub(crate) async fn execute(&mut self, descriptor: &RequestDescriptor) -> ClassifiedResult {
        let request = self.build(descriptor)?;
        self.metrics.dispatched(descriptor.method);

        let response = match self.transport.ready().await {
            Ok(transport) => transport.call(request).await,
            Err(err) => Err(err),
        }
        .map_err(|err| {
            let err = RechargeError::from_transport(err);
            warn!(%err, "transport failure");
            err
        })?;
        debug!(status = response.status, "response received");

        if response.status == NO_CONTENT {
            return Ok(Response::Status(NO_CONTENT));
        }
        let body = decode(response.status, &response.body)?;
        classify(response.status, body)
    }

    fn build(&self, descriptor: &RequestDescriptor) -> Result<TransportRequest, RechargeError> {
        let mut headers = vec![
            (ACCESS_TOKEN_HEADER.to_string(), self.access_token.clone()),
            (CONTENT_TYPE.to_string(), JSON.to_string()),
        ];
        if let Some(version) = &self.api_version {
            headers.push((VERSION_HEADER.to_string(), version.clone()));
        }
        for (name, value) in &descriptor.headers {
            headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
            headers.push((name.clone(), value.clone()));
        }

        let body = descriptor
            .body
            .as_ref()
            .map(|body| serde_json::to_vec(body).map(Bytes::from))
            .transpose()
            .map_err(|err| RechargeError::InvalidRequest(err.to_string()))?;

        Ok(TransportRequest {
            method: descriptor.method,
            url: format!("{}{}", self.base_url, descriptor.path),
            headers,
            body,
        })
    }
}

/// Decodes a response body.
///
/// A success that cannot be decoded is a transport failure. A failure status
/// with an unreadable body still classifies, as an unrecognized error.
fn decode(status: u16, body: &[u8]) -> Result<Value, RechargeError> {
    match serde_json::from_slice(body) {
        Ok(value) => Ok(value),
        Err(_) if !(200..300).contains(&status) => Ok(Value::Null),
        Err(err) => Err(RechargeError::Transport(format!(
            "undecodable {status} response: {err}"
        ))),
    }
}

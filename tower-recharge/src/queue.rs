use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::task::Context;
use std::task::Poll;

use pin_project_lite::pin_project;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::sync::WaitForCancellationFutureOwned;
use tracing::debug;
use tracing::warn;

use crate::dispatcher::Dispatcher;
use crate::error::ClassifiedResult;
use crate::error::RechargeError;
use crate::error::Result;
use crate::metrics::DispatchMetrics;
use crate::request::RequestDescriptor;

/// Decides, exactly once, whether the dispatcher or the caller's cancellation
/// settles a cancellable request.
#[derive(Debug, Default)]
struct Claim(AtomicBool);

impl Claim {
    /// True for the first taker only.
    fn take(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

struct Cancellation {
    token: CancellationToken,
    claim: Arc<Claim>,
}

/// One admitted request and the means to resolve its caller.
struct QueueEntry {
    descriptor: RequestDescriptor,
    enqueued_at: Instant,
    completion: oneshot::Sender<ClassifiedResult>,
    cancel: Option<Cancellation>,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<QueueEntry>,
    in_flight: bool,
}

/// Bounded FIFO of requests waiting for the dispatcher.
///
/// The entry being serviced has already left `entries`, so `max_depth` bounds
/// the requests waiting behind it.
pub(crate) struct AdmissionQueue {
    state: Mutex<QueueState>,
    dispatcher: tokio::sync::Mutex<Dispatcher>,
    max_depth: usize,
    metrics: DispatchMetrics,
}

/// Held by the task servicing the head entry. Clears the in-flight flag and
/// moves on to the next entry however that task ends, unwinding included.
struct InFlight(Arc<AdmissionQueue>);

impl Drop for InFlight {
    fn drop(&mut self) {
        if std::thread::panicking() {
            warn!("request servicing panicked, moving to the next entry");
        }
        self.0.state().in_flight = false;
        if Handle::try_current().is_ok() {
            self.0.advance();
        }
    }
}

impl AdmissionQueue {
    pub(crate) fn new(dispatcher: Dispatcher, max_depth: usize, metrics: DispatchMetrics) -> Self {
        Self {
            state: Mutex::default(),
            dispatcher: tokio::sync::Mutex::new(dispatcher),
            max_depth,
            metrics,
        }
    }

    /// Appends a request, or rejects it at once if the queue is full.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn submit(
        self: &Arc<Self>,
        descriptor: RequestDescriptor,
        cancel: Option<CancellationToken>,
    ) -> Result<ResponseFuture> {
        let (completion, rx) = oneshot::channel();
        let cancel = cancel.map(|token| Cancellation {
            token,
            claim: Arc::default(),
        });
        let response = ResponseFuture {
            rx,
            cancelled: cancel
                .as_ref()
                .map(|cancel| cancel.token.clone().cancelled_owned()),
            claim: cancel.as_ref().map(|cancel| cancel.claim.clone()),
        };
        {
            let mut state = self.state();
            if state.entries.len() >= self.max_depth {
                warn!(
                    max_depth = self.max_depth,
                    method = %descriptor.method,
                    path = %descriptor.path,
                    "admission queue full, rejecting request"
                );
                self.metrics.overflowed(descriptor.method);
                return Err(RechargeError::QueueOverflow {
                    max_depth: self.max_depth,
                });
            }
            debug!(
                method = %descriptor.method,
                path = %descriptor.path,
                depth = state.entries.len() + 1,
                "request enqueued"
            );
            state.entries.push_back(QueueEntry {
                descriptor,
                enqueued_at: Instant::now(),
                completion,
                cancel,
            });
        }
        self.advance();
        Ok(response)
    }

    pub(crate) fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.state().in_flight
    }

    /// Starts servicing the head entry unless one is already in flight.
    fn advance(self: &Arc<Self>) {
        let entry = {
            let mut state = self.state();
            if state.in_flight {
                return;
            }
            let Some(entry) = state.entries.pop_front() else {
                return;
            };
            state.in_flight = true;
            entry
        };

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            let _in_flight = InFlight(queue.clone());
            queue.service(entry).await;
        });
    }

    async fn service(&self, entry: QueueEntry) {
        let QueueEntry {
            descriptor,
            enqueued_at,
            completion,
            cancel,
        } = entry;

        let mut dispatcher = self.dispatcher.lock().await;
        let token = cancel.as_ref().map(|cancel| &cancel.token);
        let result = match dispatcher.admit(&descriptor, token).await {
            Ok(()) if cancel.as_ref().is_some_and(|cancel| !cancel.claim.take()) => {
                debug!(path = %descriptor.path, "cancelled by the caller before dispatch");
                Err(RechargeError::Cancelled)
            }
            Ok(()) => {
                self.metrics
                    .queue_wait(descriptor.method, enqueued_at.elapsed());
                dispatcher.execute(&descriptor).await
            }
            Err(err) => Err(err),
        };

        if completion.send(result).is_err() {
            debug!(path = %descriptor.path, "caller went away before the response arrived");
        }
    }

    // Nothing panics while holding the lock, so a poisoned state is still sound.
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pin_project! {
    /// Resolves once the dispatcher has serviced the request, or as soon as its
    /// cancellation token fires if the request has not been dispatched yet.
    pub struct ResponseFuture {
        #[pin]
        rx: oneshot::Receiver<ClassifiedResult>,
        #[pin]
        cancelled: Option<WaitForCancellationFutureOwned>,
        claim: Option<Arc<Claim>>,
    }
}

impl fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("cancellable", &self.claim.is_some())
            .finish_non_exhaustive()
    }
}

impl Future for ResponseFuture {
    type Output = ClassifiedResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        if let Poll::Ready(result) = this.rx.poll(cx) {
            return Poll::Ready(result.unwrap_or_else(|_| Err(RechargeError::Closed)));
        }

        let fired = match this.cancelled.as_mut().as_pin_mut() {
            Some(cancelled) => cancelled.poll(cx).is_ready(),
            None => false,
        };
        if fired {
            this.cancelled.set(None);
            if this.claim.as_ref().is_some_and(|claim| claim.take()) {
                return Poll::Ready(Err(RechargeError::Cancelled));
            }
            // The dispatcher claimed it first and the call is under way.
        }
        Poll::Pending
    }
}

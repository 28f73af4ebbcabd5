//! Access trail: successful `GET` requests are recorded as `view` audit entries.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::http::{Method, Request, Response};
use tower::{Layer, Service};

use crate::handlers::context::{actor_from_headers, client_info};
use crate::models::{Actor, AuditAction, RequestContext};
use crate::services::AuditPipeline;

const SKIPPED_PATHS: &[&str] = &["/health", "/favicon.ico"];

#[derive(Clone)]
pub struct AccessAuditLayer {
    audit: AuditPipeline,
}

impl AccessAuditLayer {
    pub fn new(audit: AuditPipeline) -> Self {
        Self { audit }
    }
}

impl<S> Layer<S> for AccessAuditLayer {
    type Service = AccessAuditService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessAuditService {
            inner,
            audit: self.audit.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AccessAuditService<S> {
    inner: S,
    audit: AuditPipeline,
}

/// A view waiting on the response status.
struct PendingView {
    ctx: RequestContext,
    entity_type: String,
    entity_id: i64,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for AccessAuditService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = AccessAuditFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let pending = pending_view(&request);
        AccessAuditFuture {
            future: self.inner.call(request),
            pending,
            audit: self.audit.clone(),
        }
    }
}

fn pending_view<B>(request: &Request<B>) -> Option<PendingView> {
    if *request.method() != Method::GET {
        return None;
    }
    let path = request.uri().path();
    if SKIPPED_PATHS.contains(&path) {
        return None;
    }
    let (entity_type, entity_id) = entity_from_path(path)?;

    // Malformed identity headers are rejected by the handler; the trail just goes anonymous.
    let actor = actor_from_headers(request.headers())
        .ok()
        .flatten()
        .unwrap_or_else(Actor::anonymous);
    let client = client_info(request.headers(), request.extensions());

    Some(PendingView {
        ctx: RequestContext::new(actor, client),
        entity_type,
        entity_id,
    })
}

/// `/events/12/...` becomes `("event", 12)`; a non-numeric second segment yields id 0.
pub fn entity_from_path(path: &str) -> Option<(String, i64)> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let collection = segments.next()?;
    let entity_type = collection.strip_suffix('s').unwrap_or(collection);
    let entity_id = segments
        .next()
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(0);
    Some((entity_type.to_string(), entity_id))
}

#[pin_project::pin_project]
pub struct AccessAuditFuture<F> {
    #[pin]
    future: F,
    pending: Option<PendingView>,
    audit: AuditPipeline,
}

impl<F, ResBody, E> Future for AccessAuditFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
{
    type Output = Result<Response<ResBody>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match this.future.poll(cx) {
            Poll::Ready(Ok(response)) => {
                if response.status().is_success() {
                    if let Some(view) = this.pending.take() {
                        this.audit.record(
                            &view.ctx,
                            AuditAction::View,
                            &view.entity_type,
                            view.entity_id,
                            None::<&()>,
                            None::<&()>,
                        );
                    }
                }
                Poll::Ready(Ok(response))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }
}

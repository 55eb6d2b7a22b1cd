// Wraps a hyper service so every request runs as its own execution unit with
// the tenant it was addressed to pushed for its whole duration.
use crate::errors::GatewayError;
use crate::metrics_defs::REQUEST_REJECTED;
use crate::resolver::TenantResolver;
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use shared::counter;
use shared::http::{BoxedBody, make_boxed_error_response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tenancy::TenantContext;

pub struct TenantService<S> {
    inner: Arc<S>,
    resolver: Arc<TenantResolver>,
    context: TenantContext,
}

impl<S> TenantService<S> {
    pub fn new(inner: S, resolver: Arc<TenantResolver>, context: TenantContext) -> Self {
        TenantService {
            inner: Arc::new(inner),
            resolver,
            context,
        }
    }
}

fn rejection(err: &GatewayError) -> (StatusCode, &'static str) {
    match err {
        GatewayError::MissingTenant => (StatusCode::BAD_REQUEST, "missing"),
        GatewayError::InvalidTenantHeader => (StatusCode::BAD_REQUEST, "invalid_header"),
        GatewayError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "error"),
    }
}

impl<S, B> Service<Request<B>> for TenantService<S>
where
    S: Service<Request<B>, Response = Response<BoxedBody>> + Send + Sync + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    B: Send + 'static,
{
    type Response = Response<BoxedBody>;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, request: Request<B>) -> Self::Future {
        let descriptor = match self.resolver.resolve(&request) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                let (status, reason) = rejection(&err);
                counter!(REQUEST_REJECTED, "reason" => reason).increment(1);
                tracing::debug!(error = %err, path = request.uri().path(), "rejected request");
                return Box::pin(async move { Ok(make_boxed_error_response(status)) });
            }
        };

        let inner = self.inner.clone();
        let context = self.context.clone();

        Box::pin(async move {
            let tenant = descriptor.id().to_string();
            let handled = context
                .run_unit(context.scope(descriptor, async move { inner.call(request).await }))
                .await;

            match handled {
                Ok(response) => response,
                Err(err) => {
                    tracing::error!(%tenant, error = %err, "failed to enter tenant context");
                    Ok(make_boxed_error_response(StatusCode::INTERNAL_SERVER_ERROR))
                }
            }
        })
    }
}

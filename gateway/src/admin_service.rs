use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use shared::http::{
    BoxedBody, full_body, make_boxed_error_response, make_json_response, query_param,
};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tenancy::{DataCategory, Tenancy, TenantDescriptor};

/// Health checks plus read-only views of the tenancy state. The routing
/// history can also be cleared.
pub struct AdminService<F> {
    tenancy: Arc<Tenancy>,
    is_ready: F,
}

impl<F> AdminService<F>
where
    F: Fn() -> bool,
{
    pub fn new(tenancy: Arc<Tenancy>, is_ready: F) -> Self {
        Self { tenancy, is_ready }
    }

    fn handle(&self, method: &Method, uri: &http::Uri) -> Response<BoxedBody> {
        let ok_body = || full_body("ok\n");

        match (method, uri.path()) {
            (_, "/health") => Response::new(ok_body()),
            (_, "/ready") => match (self.is_ready)() {
                true => Response::new(ok_body()),
                false => make_boxed_error_response(StatusCode::SERVICE_UNAVAILABLE),
            },
            (&Method::GET, "/tenants") => {
                let tenants: Vec<&TenantDescriptor> = self
                    .tenancy
                    .registry()
                    .descriptors()
                    .map(|descriptor| &**descriptor)
                    .collect();
                json(&tenants)
            }
            (&Method::GET, "/schedules") => json(&self.tenancy.schedules()),
            (&Method::GET, "/routing/history") => json(&self.tenancy.routing_history()),
            (&Method::DELETE, "/routing/history") => {
                self.tenancy.clear_routing_history();
                tracing::info!("routing history cleared");
                let mut response = Response::new(full_body(""));
                *response.status_mut() = StatusCode::NO_CONTENT;
                response
            }
            (&Method::GET, "/migrations") => {
                let category =
                    query_param(uri, "category").unwrap_or(DataCategory::Tenant.as_str());
                match category.parse::<DataCategory>() {
                    Ok(category) => json(&self.tenancy.migration_plan(category)),
                    Err(_) => make_boxed_error_response(StatusCode::BAD_REQUEST),
                }
            }
            (_, "/tenants" | "/schedules" | "/routing/history" | "/migrations") => {
                make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED)
            }
            _ => make_boxed_error_response(StatusCode::NOT_FOUND),
        }
    }
}

fn json<T: Serialize + ?Sized>(value: &T) -> Response<BoxedBody> {
    match serde_json::to_vec(value) {
        Ok(body) => make_json_response(StatusCode::OK, body),
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize admin response");
            make_boxed_error_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

impl<F, B> Service<Request<B>> for AdminService<F>
where
    F: Fn() -> bool,
{
    type Response = Response<BoxedBody>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let response = self.handle(req.method(), req.uri());
        Box::pin(async move { Ok(response) })
    }
}

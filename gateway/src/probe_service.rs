// Served on the tenant listener behind `TenantService`. Reports where the
// current request's queries would be routed.
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use shared::http::{BoxedBody, make_boxed_error_response, make_json_response, query_param};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tenancy::{Alias, ContextError, DataCategory, DatabaseRouter};

#[derive(Debug, Serialize)]
struct RouteProbe<'a> {
    tenant: String,
    model: Option<&'a str>,
    data_category: DataCategory,
    read_alias: Alias,
    write_alias: Alias,
}

pub struct ProbeService {
    router: Arc<DatabaseRouter>,
}

impl ProbeService {
    pub fn new(router: Arc<DatabaseRouter>) -> Self {
        ProbeService { router }
    }

    fn probe<'a>(&self, model: Option<&'a str>) -> Result<RouteProbe<'a>, ContextError> {
        let tenant = self.router.context().current()?;
        let data_category = model
            .map(|model| self.router.category_for(model))
            .unwrap_or(DataCategory::Tenant);

        Ok(RouteProbe {
            tenant: tenant.id().to_string(),
            model,
            data_category,
            read_alias: self.router.choose_read(data_category, None)?,
            write_alias: self.router.choose_write(data_category)?,
        })
    }
}

impl<B> Service<Request<B>> for ProbeService {
    type Response = Response<BoxedBody>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        // Routing reads the tenant context, so it must happen here rather
        // than in the returned future.
        let response = match req.uri().path() {
            "/route" => match self.probe(query_param(req.uri(), "model")) {
                Ok(probe) => match serde_json::to_vec(&probe) {
                    Ok(body) => make_json_response(StatusCode::OK, body),
                    Err(_) => make_boxed_error_response(StatusCode::INTERNAL_SERVER_ERROR),
                },
                Err(err) => {
                    tracing::warn!(error = %err, "route probe failed");
                    make_boxed_error_response(StatusCode::INTERNAL_SERVER_ERROR)
                }
            },
            _ => make_boxed_error_response(StatusCode::NOT_FOUND),
        };
        Box::pin(async move { Ok(response) })
    }
}

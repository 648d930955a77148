use actix_web::{
    body::{BodySize, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, USER_AGENT},
    Error, HttpMessage,
};
use futures::{
    future::LocalBoxFuture,
    task::{Context, Poll},
};
use std::fmt;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::time::Instant;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation token of the current request, stored in the request extensions
/// so handlers can read it through `web::ReqData<RequestId>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    fn from_request(req: &ServiceRequest) -> Self {
        let inbound = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match inbound {
            Some(value) => Self(value.to_string()),
            None => Self(uuid::Uuid::new_v4().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Emits one structured log record per request and propagates the request id
/// to the handler and to the `X-Request-Id` response header.
pub struct RequestLogger;

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggerMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: Rc<S>,
}

struct RequestLog {
    request_id: RequestId,
    method: String,
    path: String,
    remote_addr: String,
    user_agent: String,
    bytes_in: u64,
    start: Instant,
}

impl RequestLog {
    fn new(req: &ServiceRequest, request_id: RequestId) -> Self {
        let header = |name: HeaderName| {
            req.headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
        };

        Self {
            request_id,
            method: req.method().to_string(),
            path: req.path().to_string(),
            remote_addr: req
                .connection_info()
                .realip_remote_addr()
                .unwrap_or("-")
                .to_string(),
            user_agent: header(USER_AGENT).unwrap_or("-").to_string(),
            bytes_in: header(CONTENT_LENGTH)
                .and_then(|value| value.parse().ok())
                .unwrap_or(0),
            start: Instant::now(),
        }
    }

    fn emit(&self, status: u16, bytes_out: u64, error: Option<&Error>) {
        let duration_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        match error {
            Some(error) => tracing::error!(
                request_id = %self.request_id,
                method = %self.method,
                path = %self.path,
                remote_addr = %self.remote_addr,
                user_agent = %self.user_agent,
                status,
                duration_ms,
                bytes_in = self.bytes_in,
                bytes_out,
                error = %error,
                "Request failed"
            ),
            None => tracing::info!(
                request_id = %self.request_id,
                method = %self.method,
                path = %self.path,
                remote_addr = %self.remote_addr,
                user_agent = %self.user_agent,
                status,
                duration_ms,
                bytes_in = self.bytes_in,
                bytes_out,
                "Request completed"
            ),
        }
    }
}

impl<S, B> Service<ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<ServiceResponse<B>, Error>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let request_id = RequestId::from_request(&req);
        req.extensions_mut().insert(request_id.clone());
        let log = RequestLog::new(&req, request_id.clone());
        let fut = self.service.call(req);

        Box::pin(async move {
            match fut.await {
                Ok(mut res) => {
                    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
                        res.headers_mut()
                            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                    }
                    let bytes_out = match res.response().body().size() {
                        BodySize::Sized(size) => size,
                        _ => 0,
                    };
                    log.emit(res.status().as_u16(), bytes_out, res.response().error());
                    Ok(res)
                }
                Err(err) => {
                    let status = err.as_response_error().status_code().as_u16();
                    log.emit(status, 0, Some(&err));
                    Err(err)
                }
            }
        })
    }
}

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest caller-supplied id we keep in logs.
const MAX_INCOMING_LEN: usize = 128;

/// Tags the request with an id, logged on the `http_request` span and
/// returned in `X-Request-Id`. A sane caller id is kept so traces line up
/// with the proxy in front; anything else gets a fresh UUID v4.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(accept_incoming)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    tracing::Span::current().record("request_id", id.as_str());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn accept_incoming(raw: &str) -> Option<String> {
    let id = raw.trim();
    let printable = id.chars().all(|c| c.is_ascii_graphic());
    (!id.is_empty() && id.len() <= MAX_INCOMING_LEN && printable).then(|| id.to_string())
}

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Bearer-token gate for the /api surface. With `API_TOKEN` unset the gate
/// is open, for local development; set it in any shared deployment.
pub async fn require_auth(req: Request, next: Next) -> Response {
    let expected = std::env::var("API_TOKEN").unwrap_or_default();
    if expected.is_empty() {
        return next.run(req).await;
    }

    let presented = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected => next.run(req).await,
        Some(_) => (StatusCode::UNAUTHORIZED, "Invalid token").into_response(),
        None => {
            (StatusCode::UNAUTHORIZED, "Missing or invalid Authorization header").into_response()
        }
    }
}

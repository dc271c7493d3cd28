use axum::response::IntoResponse;

/// Undocumented landing route; useful as a liveness ping behind proxies.
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}

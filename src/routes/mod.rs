pub mod data;
pub mod diagnostics;
pub mod health;

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::timeout::TimeoutLayer;

use crate::middleware::{rate_limit, request_id};
use crate::state::AppState;

/// 请求体上限：8 MiB，上传批次可达数万行明细
const MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// 单个请求的处理时限，超时返回 408
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .nest("/data", data::router())
        .nest("/diagnostics", diagnostics::router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    Router::new()
        .nest("/api", api_routes)
        .nest("/health", health::router())
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::util::ServiceExt;
    use tower_http::timeout::TimeoutLayer;

    /// 卡住的处理器不能无限挂起连接，到时限直接 408
    #[tokio::test]
    async fn stalled_handler_answers_408() {
        let app = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    "ok"
                }),
            )
            .layer(TimeoutLayer::new(Duration::from_millis(20)));

        let resp = app
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);
    }
}

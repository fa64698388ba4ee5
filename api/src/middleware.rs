//! 中间件

use std::any::Any;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};

use crate::proxy::TrustedProxies;

/// 解析后的客户端 IP，由 [`access_log`] 写入请求扩展
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ClientIp>()
            .copied()
            .ok_or((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Missing client ip in request extensions (access_log may not have run)",
            ))
    }
}

/// 访问日志中间件
///
/// 每个请求记录一条日志：方法、路径、查询串、状态码、耗时、客户端 IP、User-Agent。
pub async fn access_log(
    State(proxies): State<Arc<TrustedProxies>>,
    mut request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or_default().to_string();
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(peer)| proxies.client_ip(peer.ip(), request.headers()));
    if let Some(ip) = client_ip {
        request.extensions_mut().insert(ClientIp(ip));
    }
    let client_ip = client_ip.map(|ip| ip.to_string()).unwrap_or_default();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let latency = start.elapsed();

    if response.status().is_server_error() {
        error!(%method, %path, %query, status, ?latency, %client_ip, %user_agent, "request");
    } else if response.status().is_client_error() {
        warn!(%method, %path, %query, status, ?latency, %client_ip, %user_agent, "request");
    } else {
        info!(%method, %path, %query, status, ?latency, %client_ip, %user_agent, "request");
    }

    response
}

/// handler panic 时返回 500 并记录错误日志
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic message".to_string()
    };

    error!(panic = %detail, "Recovered from handler panic");

    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, middleware, routing::get};
    use tower::ServiceExt;
    use tower_http::catch_panic::CatchPanicLayer;
    use tracing_test::traced_test;

    async fn whoami(ClientIp(ip): ClientIp) -> String {
        ip.to_string()
    }

    async fn boom() -> &'static str {
        panic!("handler exploded")
    }

    fn app(proxies: &[&str]) -> Router {
        let proxies = Arc::new(TrustedProxies::parse(proxies).unwrap());
        Router::new()
            .route("/whoami", get(whoami))
            .route("/boom", get(boom))
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(middleware::from_fn_with_state(proxies, access_log))
    }

    fn request(uri: &str, peer: &str) -> Request<Body> {
        let mut req = Request::builder()
            .uri(uri)
            .header("x-forwarded-for", "198.51.100.7")
            .header(header::USER_AGENT, "anybiz-test")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        req
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_client_ip_from_trusted_proxy() {
        let response = app(&["127.0.0.1"])
            .oneshot(request("/whoami", "127.0.0.1:40000"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "198.51.100.7");
    }

    #[tokio::test]
    async fn test_client_ip_from_untrusted_peer() {
        let response = app(&["127.0.0.1"])
            .oneshot(request("/whoami", "203.0.113.9:40000"))
            .await
            .unwrap();

        assert_eq!(body_string(response).await, "203.0.113.9");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_access_log_fields() {
        let response = app(&[])
            .oneshot(request("/whoami?verbose=1", "127.0.0.1:40000"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(logs_contain("path=/whoami"));
        assert!(logs_contain("query=verbose=1"));
        assert!(logs_contain("status=200"));
        assert!(logs_contain("client_ip=127.0.0.1"));
        assert!(logs_contain("user_agent=anybiz-test"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_panic_is_recovered() {
        let response = app(&[])
            .oneshot(request("/boom", "127.0.0.1:40000"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(logs_contain("Recovered from handler panic"));
        assert!(logs_contain("handler exploded"));
        assert!(logs_contain("status=500"));
    }
}

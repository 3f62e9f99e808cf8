use anyhow::Result;
use axum::{
    extract::{Json, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};

use crate::auth::AuthService;
use crate::chunker::chunk_markdown;
use crate::config::ServiceConfig;

/// 允许调用切片端点的用户角色 (服务间 API Key 不受此限制)
pub const ALLOWED_USER_ROLES: &[&str] = &["teacher", "admin"];

/// API 状态 (共享的配置和认证服务)
pub struct ApiState {
    config: ServiceConfig,
    auth: AuthService,
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    version: String,
}

/// 切片请求
#[derive(Deserialize, ToSchema)]
pub struct ChunkRequest {
    /// 原始 Markdown 内容
    markdown: String,
    /// 可选的切片大小上限覆盖 (字节数)
    max_chunk_size: Option<usize>,
}

/// 单个切片
#[derive(Serialize, ToSchema)]
pub struct ChunkResponseItem {
    content: String,
    header_path: Vec<String>,
}

/// 切片响应
#[derive(Serialize, ToSchema)]
pub struct ChunkResponse {
    chunks: Vec<ChunkResponseItem>,
}

/// API 错误响应
#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    success: bool,
    error: String,
}

/// 认证失败的统一响应
fn error_response(status: StatusCode, message: &str) -> Response {
    let body = ErrorResponse {
        success: false,
        error: message.to_string(),
    };

    (status, Json(body)).into_response()
}

/// 认证中间件
///
/// 两种方案按顺序检查：
/// 1. X-API-Key (服务间调用)，有效即放行
/// 2. Bearer Token (用户调用)，验签后要求 role 在允许列表内
async fn auth_middleware(
    State(state): State<Arc<ApiState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path();

    // 健康检查和 OpenAPI 文档不需要认证
    if path == "/v1/health" || path == "/v1/openapi.json" {
        return next.run(req).await;
    }

    if let Some(key) = req.headers().get("X-API-Key").and_then(|v| v.to_str().ok()) {
        if state.auth.verify_api_key(key) {
            return next.run(req).await;
        }
        tracing::warn!("Rejected request with invalid service API key");
        return error_response(StatusCode::UNAUTHORIZED, "Invalid service API key");
    }

    let token = match req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        Some(token) => token.to_string(),
        None => return error_response(StatusCode::UNAUTHORIZED, "Missing authentication"),
    };

    let claims = match state.auth.verify_bearer_token(&token).await {
        Ok(claims) => claims,
        Err(err) => {
            tracing::warn!("Bearer token verification failed: {}", err);
            return error_response(StatusCode::UNAUTHORIZED, "Invalid authentication token");
        }
    };

    match claims.role.as_deref() {
        Some(role) if ALLOWED_USER_ROLES.contains(&role) => {
            // 声明塞进扩展，handler 需要时可以取
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Some(_) => error_response(
            StatusCode::FORBIDDEN,
            "Insufficient role for this operation",
        ),
        None => error_response(StatusCode::FORBIDDEN, "User role not present in token"),
    }
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/v1/health",
    responses((status = 200, description = "Service healthy", body = HealthResponse))
)]
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// 切片端点
#[utoipa::path(
    post,
    path = "/v1/chunk",
    request_body = ChunkRequest,
    responses(
        (status = 200, description = "Chunked markdown", body = ChunkResponse),
        (status = 401, description = "Missing or invalid authentication", body = ErrorResponse),
        (status = 403, description = "Role not allowed", body = ErrorResponse)
    ),
    security(("bearerAuth" = []), ("ApiKeyAuth" = []))
)]
async fn chunk_endpoint(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<ChunkRequest>,
) -> Json<ChunkResponse> {
    let max_size = req
        .max_chunk_size
        .unwrap_or(state.config.default_max_chunk_size);

    let chunks = chunk_markdown(&req.markdown, max_size);

    let items: Vec<ChunkResponseItem> = chunks
        .into_iter()
        .map(|c| ChunkResponseItem {
            content: c.content,
            header_path: c.header_path,
        })
        .collect();

    Json(ChunkResponse { chunks: items })
}

/// OpenAPI 文档端点
async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// OpenAPI 文档定义
#[derive(OpenApi)]
#[openapi(
    info(title = "Chunker Service"),
    paths(health_check, chunk_endpoint),
    components(schemas(
        HealthResponse,
        ChunkRequest,
        ChunkResponseItem,
        ChunkResponse,
        ErrorResponse
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

/// 给 OpenAPI 文档补充两种认证方案
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "ApiKeyAuth",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-Key"))),
            );
        }
    }
}

/// 创建 API 路由
pub fn create_router(config: ServiceConfig) -> Router {
    let auth = AuthService::new(&config);
    let state = Arc::new(ApiState { config, auth });

    Router::new()
        .route("/v1/health", get(health_check))
        .route("/v1/chunk", post(chunk_endpoint))
        .route("/v1/openapi.json", get(openapi_spec))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 启动 API 服务器
pub async fn start_server(config: ServiceConfig) -> Result<()> {
    let port = config.port;
    let app = create_router(config);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("🚀 Chunker service listening on http://{}", addr);
    println!("📖 Endpoints:");
    println!("   GET  /v1/health        - Health check");
    println!("   POST /v1/chunk         - Chunk markdown (auth required)");
    println!("   GET  /v1/openapi.json  - OpenAPI document");

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(ServiceConfig::dev_default());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_chunk_requires_auth() {
        let app = create_router(ServiceConfig::dev_default());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/chunk")
                    .header("content-type", "application/json")
                    .body(Body::from(r##"{"markdown": "# A\n\nB"}"##))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "未认证的请求应该被拒绝");
    }
}

use crate::config::Config;
use crate::error::AppError;
use crate::models::{ApiResponse, BatchOutcome};
use crate::services::{AggregationService, JobService, OrchestratorService};
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde::Serialize;
use utoipa::ToSchema;

/// Bearer 校验, cron 与 admin 端点共用。逐字节比较避免长度提前短路。
pub(crate) fn authorize(req: &HttpRequest, config: &Config) -> Result<(), AppError> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = header.strip_prefix("Bearer ").unwrap_or("");
    let expected = config.cron.token.as_bytes();
    let supplied = token.as_bytes();
    let mut diff = supplied.len() ^ expected.len();
    for i in 0..expected.len() {
        diff |= (expected[i] ^ *supplied.get(i).unwrap_or(&0)) as usize;
    }
    if diff != 0 {
        return Err(AppError::AuthError("Invalid cron token".to_string()));
    }
    Ok(())
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RetentionOutcome {
    pub deleted: u64,
}

#[utoipa::path(
    post,
    path = "/internal/cron/aggregate",
    tag = "cron",
    security(("cron_token" = [])),
    responses(
        (status = 200, description = "Unaggregated events folded into daily counters", body = BatchOutcome),
        (status = 401, description = "Missing or wrong bearer token")
    )
)]
pub async fn trigger_aggregate(
    req: HttpRequest,
    config: web::Data<Config>,
    service: web::Data<AggregationService>,
) -> Result<HttpResponse> {
    if let Err(e) = authorize(&req, &config) {
        return Ok(e.error_response());
    }
    match service.drain().await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(ApiResponse::success(outcome))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/internal/cron/orchestrate",
    tag = "cron",
    security(("cron_token" = [])),
    responses(
        (status = 200, description = "Unprocessed events routed to handlers", body = BatchOutcome),
        (status = 401, description = "Missing or wrong bearer token")
    )
)]
pub async fn trigger_orchestrate(
    req: HttpRequest,
    config: web::Data<Config>,
    service: web::Data<OrchestratorService>,
) -> Result<HttpResponse> {
    if let Err(e) = authorize(&req, &config) {
        return Ok(e.error_response());
    }
    match service.drain().await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(ApiResponse::success(outcome))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/internal/cron/dispatch",
    tag = "cron",
    security(("cron_token" = [])),
    responses(
        (status = 200, description = "Stale jobs reclaimed, then due jobs executed", body = BatchOutcome),
        (status = 401, description = "Missing or wrong bearer token")
    )
)]
pub async fn trigger_dispatch(
    req: HttpRequest,
    config: web::Data<Config>,
    service: web::Data<JobService>,
) -> Result<HttpResponse> {
    if let Err(e) = authorize(&req, &config) {
        return Ok(e.error_response());
    }
    // 先回收疑似崩溃的 running, 让它们参与本轮派发
    if let Err(e) = service.reclaim_stale().await {
        return Ok(e.error_response());
    }
    match service.run_due().await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(ApiResponse::success(outcome))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/internal/cron/retention",
    tag = "cron",
    security(("cron_token" = [])),
    responses(
        (status = 200, description = "Fully consumed raw events past retention deleted", body = RetentionOutcome),
        (status = 401, description = "Missing or wrong bearer token")
    )
)]
pub async fn trigger_retention(
    req: HttpRequest,
    config: web::Data<Config>,
    service: web::Data<AggregationService>,
) -> Result<HttpResponse> {
    if let Err(e) = authorize(&req, &config) {
        return Ok(e.error_response());
    }
    match service.sweep_consumed(config.pipeline.retention_days).await {
        Ok(deleted) => Ok(HttpResponse::Ok().json(ApiResponse::success(RetentionOutcome { deleted }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn cron_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/internal/cron")
            .route("/aggregate", web::post().to(trigger_aggregate))
            .route("/orchestrate", web::post().to(trigger_orchestrate))
            .route("/dispatch", web::post().to(trigger_dispatch))
            .route("/retention", web::post().to(trigger_retention)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CronConfig, DatabaseConfig, ServerConfig};
    use actix_web::test::TestRequest;

    fn test_config(token: &str) -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/test".to_string(),
                max_connections: 1,
            },
            cron: CronConfig {
                token: token.to_string(),
            },
            pipeline: Default::default(),
            outbound: Default::default(),
        }
    }

    #[test]
    fn test_authorize_accepts_matching_token() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer s3cret"))
            .to_http_request();
        assert!(authorize(&req, &test_config("s3cret")).is_ok());
    }

    #[test]
    fn test_authorize_rejects_wrong_or_missing_token() {
        let config = test_config("s3cret");

        let wrong = TestRequest::default()
            .insert_header(("Authorization", "Bearer nope"))
            .to_http_request();
        assert!(authorize(&wrong, &config).is_err());

        let missing = TestRequest::default().to_http_request();
        assert!(authorize(&missing, &config).is_err());

        // 前缀相同但更短的 token 也必须拒绝
        let prefix = TestRequest::default()
            .insert_header(("Authorization", "Bearer s3c"))
            .to_http_request();
        assert!(authorize(&prefix, &config).is_err());
    }
}

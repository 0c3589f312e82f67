use crate::config::Config;
use crate::error::AppError;
use crate::handlers::cron::authorize;
use crate::models::ApiResponse;
use crate::services::PrizeService;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Either a literal code list or generation parameters; exactly one of the
/// two must be supplied.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ImportCodesRequest {
    pub codes: Option<Vec<String>>,
    pub generate: Option<GenerateCodesParams>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateCodesParams {
    pub count: usize,
    #[serde(default = "default_code_length")]
    pub length: usize,
}

fn default_code_length() -> usize {
    8
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/prizes/{prize_id}/codes",
    tag = "admin",
    security(("cron_token" = [])),
    request_body = ImportCodesRequest,
    params(("prize_id" = Uuid, Path, description = "Prize to load codes into")),
    responses(
        (status = 200, description = "Import report with duplicate count"),
        (status = 400, description = "Neither codes nor generate supplied, or invalid parameters"),
        (status = 401, description = "Missing or wrong bearer token"),
        (status = 404, description = "Unknown prize")
    )
)]
pub async fn import_codes(
    req: HttpRequest,
    config: web::Data<Config>,
    service: web::Data<PrizeService>,
    path: web::Path<Uuid>,
    body: web::Json<ImportCodesRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = authorize(&req, &config) {
        return Ok(e.error_response());
    }
    let prize_id = path.into_inner();
    let request = body.into_inner();

    let result = match (request.codes, request.generate) {
        (Some(codes), None) => service.import_codes(prize_id, &codes).await,
        (None, Some(params)) => {
            service
                .generate_codes(prize_id, params.count, params.length)
                .await
        }
        _ => Err(AppError::ValidationError(
            "Provide exactly one of `codes` or `generate`".to_string(),
        )),
    };

    match result {
        Ok(report) => Ok(HttpResponse::Ok().json(ApiResponse::success(report))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn admin_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin").route("/prizes/{prize_id}/codes", web::post().to(import_codes)),
    );
}

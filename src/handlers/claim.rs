use crate::handlers::ingest::SESSION_COOKIE;
use crate::models::{ClaimRequest, ClaimResponse};
use crate::services::PrizeService;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};

#[utoipa::path(
    post,
    path = "/api/v1/claim",
    tag = "claim",
    request_body = ClaimRequest,
    responses(
        (status = 200, description = "Draw result, idempotent per session", body = ClaimResponse),
        (status = 400, description = "No submission for the session and no campaignId supplied"),
        (status = 404, description = "Unknown campaign")
    )
)]
/// Claim a prize for a widget session. Idempotent: a session that already
/// won gets the originally granted prize back with `alreadyClaimed: true`
/// instead of drawing (and decrementing inventory) again.
pub async fn claim(
    service: web::Data<PrizeService>,
    req: HttpRequest,
    body: web::Json<ClaimRequest>,
) -> Result<HttpResponse> {
    let mut request = body.into_inner();
    // 正常由 widget 在 body 里带 sessionId; 缺省时回退到会话 cookie
    if request.session_id.is_empty() {
        if let Some(cookie) = req.cookie(SESSION_COOKIE) {
            request.session_id = cookie.value().to_string();
        }
    }
    if request.session_id.is_empty() {
        return Ok(
            crate::error::AppError::ValidationError("sessionId is required".to_string())
                .error_response(),
        );
    }

    match service.claim_for_session(request).await {
        Ok(result) => Ok(HttpResponse::Ok().json(result)),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn claim_config(cfg: &mut web::ServiceConfig) {
    cfg.route("/claim", web::post().to(claim));
}

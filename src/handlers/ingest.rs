use crate::models::{IngestBatchRequest, IngestResponse};
use crate::services::IngestionService;
use actix_web::cookie::Cookie;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use uuid::Uuid;

/// Widget session cookie; synthesized on first contact and echoed back so
/// later batches and the claim flow correlate to the same participant.
pub const SESSION_COOKIE: &str = "ps_session";

fn resolve_session(req: &HttpRequest) -> (String, bool) {
    match req.cookie(SESSION_COOKIE) {
        Some(cookie) => (cookie.value().to_string(), false),
        None => (Uuid::new_v4().to_string(), true),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/events/batch",
    tag = "events",
    request_body = IngestBatchRequest,
    responses(
        (status = 200, description = "Batch accepted", body = IngestResponse),
        (status = 400, description = "Malformed batch, rejected wholesale")
    )
)]
/// Ingest one widget event batch (max 100 events). Events for unknown or
/// retired campaigns are dropped silently; a schema violation rejects the
/// whole batch.
pub async fn ingest_batch(
    service: web::Data<IngestionService>,
    req: HttpRequest,
    body: web::Json<IngestBatchRequest>,
) -> Result<HttpResponse> {
    let (session_id, fresh_session) = resolve_session(&req);

    match service.ingest_batch(body.into_inner(), &session_id).await {
        Ok(count) => {
            let mut builder = HttpResponse::Ok();
            if fresh_session {
                builder.cookie(
                    Cookie::build(SESSION_COOKIE, session_id)
                        .path("/")
                        .http_only(true)
                        .finish(),
                );
            }
            Ok(builder.json(IngestResponse {
                success: true,
                count,
            }))
        }
        Err(e) => Ok(e.error_response()),
    }
}

pub fn ingest_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/events").route("/batch", web::post().to(ingest_batch)));
}

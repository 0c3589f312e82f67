use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::{EventKind, JobStatus, PrizeCodeStatus};
use crate::handlers;
use crate::models::*;
use crate::services::prize_service::CodeImportReport;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.as_mut().unwrap();
        components.add_security_scheme(
            "cron_token",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        )
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::ingest::ingest_batch,
        handlers::claim::claim,
        handlers::jobs::list_jobs,
        handlers::admin::import_codes,
        handlers::cron::trigger_aggregate,
        handlers::cron::trigger_orchestrate,
        handlers::cron::trigger_dispatch,
        handlers::cron::trigger_retention,
    ),
    components(
        schemas(
            IngestBatchRequest,
            IncomingEvent,
            IngestResponse,
            ClaimRequest,
            ClaimResponse,
            WonPrize,
            JobView,
            JobLogQuery,
            JobPayload,
            BatchOutcome,
            CodeImportReport,
            handlers::admin::ImportCodesRequest,
            handlers::admin::GenerateCodesParams,
            handlers::cron::RetentionOutcome,
            EventKind,
            JobStatus,
            PrizeCodeStatus,
            ApiError,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "events", description = "Widget event ingestion"),
        (name = "claim", description = "Prize claim API"),
        (name = "jobs", description = "Integration job log"),
        (name = "admin", description = "Prize code administration"),
        (name = "cron", description = "Batch pipeline triggers"),
    ),
    info(
        title = "PopSpin Backend API",
        version = "1.0.0",
        description = "PopSpin conversion pipeline REST API documentation"
    ),
    servers(
        (url = "/", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}

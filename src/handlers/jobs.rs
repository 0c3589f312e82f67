use crate::entities::JobStatus;
use crate::error::AppError;
use crate::models::{ApiResponse, JobLogQuery, JobView, PaginatedResponse, PaginationParams};
use crate::services::JobService;
use actix_web::{HttpResponse, ResponseError, Result, web};

fn parse_status(raw: &str) -> Result<JobStatus, AppError> {
    match raw {
        "pending" => Ok(JobStatus::Pending),
        "running" => Ok(JobStatus::Running),
        "retrying" => Ok(JobStatus::Retrying),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        other => Err(AppError::ValidationError(format!(
            "Unknown job status: {other}"
        ))),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    tag = "jobs",
    params(
        ("page" = Option<i64>, Query, description = "1-based page number"),
        ("page_size" = Option<i64>, Query, description = "Items per page, max 100"),
        ("status" = Option<String>, Query, description = "pending / running / retrying / completed / failed")
    ),
    responses(
        (status = 200, description = "Job log, newest first"),
        (status = 400, description = "Unknown status filter")
    )
)]
/// Operator view of the integration job queue.
pub async fn list_jobs(
    service: web::Data<JobService>,
    query: web::Query<JobLogQuery>,
) -> Result<HttpResponse> {
    let status = match query.status.as_deref() {
        Some(raw) => match parse_status(raw) {
            Ok(s) => Some(s),
            Err(e) => return Ok(e.error_response()),
        },
        None => None,
    };

    let pagination = PaginationParams {
        page: query.page,
        page_size: query.page_size,
    };
    match service
        .list_jobs(status, pagination.get_offset(), pagination.get_limit())
        .await
    {
        Ok((items, total)) => {
            let views: Vec<JobView> = items.into_iter().map(JobView::from).collect();
            let page = PaginatedResponse::new(
                views,
                pagination.get_page(),
                pagination.get_page_size(),
                total,
            );
            Ok(HttpResponse::Ok().json(ApiResponse::success(page)))
        }
        Err(e) => Ok(e.error_response()),
    }
}

pub fn jobs_config(cfg: &mut web::ServiceConfig) {
    cfg.route("/jobs", web::get().to(list_jobs));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_names() {
        assert!(matches!(parse_status("retrying"), Ok(JobStatus::Retrying)));
        assert!(parse_status("Retrying").is_err());
        assert!(parse_status("done").is_err());
    }
}

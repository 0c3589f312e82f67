use crate::entities::{
    JobStatus, integration_entity as integrations, integration_job_entity as jobs,
};
use crate::error::{AppError, AppResult};
use crate::external::{EspClient, WebhookClient};
use crate::models::{BatchOutcome, JobPayload};
use chrono::{Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

/// Exponential backoff: wait 2^attempts minutes before the next try.
/// The exponent is capped so an oversized max_attempts cannot overflow.
pub fn backoff_delay(attempts: i32) -> Duration {
    Duration::minutes(2i64.pow(attempts.clamp(0, 20) as u32))
}

/// Retry-or-terminate decision after a failed attempt: attempts left mean
/// retrying with backoff, the final attempt goes terminal.
pub fn settle_decision(attempt: i32, max_attempts: i32) -> (JobStatus, Option<Duration>) {
    if attempt < max_attempts {
        (JobStatus::Retrying, Some(backoff_delay(attempt)))
    } else {
        (JobStatus::Failed, None)
    }
}

/// 集成 job 队列与派发器。
/// 状态机: pending -> running -> {completed | retrying -> running... | failed}。
/// attempts 在领取时递增, 执行中崩溃的运行也计入; 领取本身是条件更新,
/// 多个派发进程不会重复执行同一个 job。
#[derive(Clone)]
pub struct JobService {
    pool: DatabaseConnection,
    webhook_client: WebhookClient,
    esp_client: EspClient,
    batch_size: u64,
    default_max_attempts: i32,
    stale_running_secs: i64,
}

impl JobService {
    pub fn new(
        pool: DatabaseConnection,
        webhook_client: WebhookClient,
        esp_client: EspClient,
        batch_size: u64,
        default_max_attempts: i32,
        stale_running_secs: i64,
    ) -> Self {
        Self {
            pool,
            webhook_client,
            esp_client,
            batch_size,
            default_max_attempts,
            stale_running_secs,
        }
    }

    /// Queue a side effect for an integration; due immediately.
    pub async fn enqueue(&self, integration_id: Uuid, payload: JobPayload) -> AppResult<i64> {
        let model = jobs::ActiveModel {
            integration_id: Set(integration_id),
            job_type: Set(payload.job_type().to_string()),
            payload: Set(serde_json::to_value(&payload)?),
            status: Set(JobStatus::Pending),
            attempts: Set(0),
            max_attempts: Set(self.default_max_attempts),
            scheduled_for: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;
        Ok(model.id)
    }

    /// One dispatcher pass: claim due jobs, execute them, settle the outcome.
    /// Safe to call with nothing due (no-op) and safe to run concurrently
    /// with other dispatchers thanks to the conditional claim.
    pub async fn run_due(&self) -> AppResult<BatchOutcome> {
        let due = jobs::Entity::find()
            .filter(jobs::Column::Status.is_in([JobStatus::Pending, JobStatus::Retrying]))
            .filter(jobs::Column::ScheduledFor.lte(Utc::now()))
            .filter(Expr::col(jobs::Column::Attempts).lt(Expr::col(jobs::Column::MaxAttempts)))
            .order_by_asc(jobs::Column::ScheduledFor)
            .limit(self.batch_size)
            .all(&self.pool)
            .await?;

        let mut outcome = BatchOutcome::default();

        for job in due {
            // 条件领取: 另一个派发进程先拿到时这里影响 0 行, 直接跳过
            let claim = jobs::Entity::update_many()
                .col_expr(jobs::Column::Status, Expr::value(JobStatus::Running))
                .col_expr(
                    jobs::Column::Attempts,
                    Expr::col(jobs::Column::Attempts).add(1),
                )
                .col_expr(jobs::Column::StartedAt, Expr::value(Utc::now()))
                .col_expr(jobs::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(jobs::Column::Id.eq(job.id))
                .filter(jobs::Column::Status.is_in([JobStatus::Pending, JobStatus::Retrying]))
                .exec(&self.pool)
                .await?;
            if claim.rows_affected == 0 {
                continue;
            }
            let attempt = job.attempts + 1;

            match self.execute(&job).await {
                Ok(()) => {
                    self.settle_completed(job.id).await?;
                    outcome.processed += 1;
                }
                Err(e) => {
                    let error_text = e.to_string();
                    log::warn!(
                        "Job {} ({}) attempt {attempt}/{} failed: {error_text}",
                        job.id,
                        job.job_type,
                        job.max_attempts
                    );
                    self.settle_failed(&job, attempt, error_text).await?;
                    outcome.failed += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Dispatch one claimed job by its payload tag.
    async fn execute(&self, job: &jobs::Model) -> AppResult<()> {
        let payload: JobPayload = serde_json::from_value(job.payload.clone())?;

        let integration = integrations::Entity::find_by_id(job.integration_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Integration {}", job.integration_id))
            })?;

        match &payload {
            JobPayload::WebhookDelivery { event, body } => {
                self.webhook_client
                    .deliver(&integration, event, body)
                    .await?;
                // webhook 成功附带刷新集成的 last_sync_at
                integrations::Entity::update_many()
                    .col_expr(integrations::Column::LastSyncAt, Expr::value(Utc::now()))
                    .col_expr(integrations::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(integrations::Column::Id.eq(integration.id))
                    .exec(&self.pool)
                    .await?;
                Ok(())
            }
            JobPayload::SyncContact { .. }
            | JobPayload::AddTag { .. }
            | JobPayload::SendEvent { .. } => self.esp_client.execute(&integration, &payload).await,
        }
    }

    async fn settle_completed(&self, job_id: i64) -> AppResult<()> {
        jobs::Entity::update_many()
            .col_expr(jobs::Column::Status, Expr::value(JobStatus::Completed))
            .col_expr(jobs::Column::CompletedAt, Expr::value(Utc::now()))
            .col_expr(jobs::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(jobs::Column::Id.eq(job_id))
            .exec(&self.pool)
            .await?;
        Ok(())
    }

    /// attempts 未用尽 -> retrying + 指数退避; 用尽 -> 终态 failed,
    /// 最后一次错误信息保留给运维排查。
    async fn settle_failed(
        &self,
        job: &jobs::Model,
        attempt: i32,
        error_text: String,
    ) -> AppResult<()> {
        let (status, delay) = settle_decision(attempt, job.max_attempts);

        let mut update = jobs::Entity::update_many()
            .col_expr(jobs::Column::Status, Expr::value(status))
            .col_expr(jobs::Column::LastError, Expr::value(error_text))
            .col_expr(jobs::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(jobs::Column::Id.eq(job.id));
        match delay {
            Some(delay) => {
                update =
                    update.col_expr(jobs::Column::ScheduledFor, Expr::value(Utc::now() + delay));
            }
            None => {
                update = update.col_expr(jobs::Column::CompletedAt, Expr::value(Utc::now()));
            }
        }
        update.exec(&self.pool).await?;
        Ok(())
    }

    /// Reclaim jobs stuck in `running` past the staleness threshold (the
    /// executor crashed mid-flight). The attempt consumed by the crashed run
    /// stays counted, so a crash-looping job still terminates at
    /// max_attempts; jobs that crashed on their last attempt go terminal.
    pub async fn reclaim_stale(&self) -> AppResult<u64> {
        let cutoff = Utc::now() - Duration::seconds(self.stale_running_secs);

        let reclaimed = jobs::Entity::update_many()
            .col_expr(jobs::Column::Status, Expr::value(JobStatus::Retrying))
            .col_expr(
                jobs::Column::LastError,
                Expr::value("Reclaimed from stale RUNNING state"),
            )
            .col_expr(jobs::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(jobs::Column::Status.eq(JobStatus::Running))
            .filter(jobs::Column::StartedAt.lt(cutoff))
            .filter(Expr::col(jobs::Column::Attempts).lt(Expr::col(jobs::Column::MaxAttempts)))
            .exec(&self.pool)
            .await?;

        let dead = jobs::Entity::update_many()
            .col_expr(jobs::Column::Status, Expr::value(JobStatus::Failed))
            .col_expr(
                jobs::Column::LastError,
                Expr::value("Crashed mid-execution on final attempt"),
            )
            .col_expr(jobs::Column::CompletedAt, Expr::value(Utc::now()))
            .col_expr(jobs::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(jobs::Column::Status.eq(JobStatus::Running))
            .filter(jobs::Column::StartedAt.lt(cutoff))
            .exec(&self.pool)
            .await?;

        let total = reclaimed.rows_affected + dead.rows_affected;
        if total > 0 {
            log::warn!(
                "Reclaimed {} stale running jobs ({} terminal)",
                total,
                dead.rows_affected
            );
        }
        Ok(total)
    }

    /// Operator job log, newest first, optional status filter.
    pub async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<jobs::Model>, i64)> {
        use sea_orm::PaginatorTrait;

        let mut query = jobs::Entity::find();
        if let Some(status) = status {
            query = query.filter(jobs::Column::Status.eq(status));
        }
        let total = query.clone().count(&self.pool).await? as i64;
        let items = query
            .order_by_desc(jobs::Column::Id)
            .offset(offset as u64)
            .limit(limit as u64)
            .all(&self.pool)
            .await?;
        Ok((items, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule_doubles_per_attempt() {
        assert_eq!(backoff_delay(1), Duration::minutes(2));
        assert_eq!(backoff_delay(2), Duration::minutes(4));
        assert_eq!(backoff_delay(3), Duration::minutes(8));
        assert_eq!(backoff_delay(4), Duration::minutes(16));
    }

    #[test]
    fn test_backoff_clamps_negative_attempts() {
        assert_eq!(backoff_delay(-1), Duration::minutes(1));
        assert_eq!(backoff_delay(0), Duration::minutes(1));
    }

    #[test]
    fn test_backoff_caps_large_attempt_counts() {
        assert_eq!(backoff_delay(20), Duration::minutes(1 << 20));
        assert_eq!(backoff_delay(500), backoff_delay(20));
    }

    #[test]
    fn test_settle_retries_while_attempts_remain() {
        let (status, delay) = settle_decision(1, 5);
        assert_eq!(status, JobStatus::Retrying);
        assert_eq!(delay, Some(Duration::minutes(2)));

        let (status, delay) = settle_decision(4, 5);
        assert_eq!(status, JobStatus::Retrying);
        assert_eq!(delay, Some(Duration::minutes(16)));
    }

    #[test]
    fn test_settle_goes_terminal_exactly_at_max_attempts() {
        let (status, delay) = settle_decision(5, 5);
        assert_eq!(status, JobStatus::Failed);
        assert!(delay.is_none());
    }
}

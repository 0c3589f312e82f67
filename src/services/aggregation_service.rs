use crate::entities::{daily_aggregate_entity as daily, raw_event_entity as raw_events};
use crate::error::AppResult;
use crate::models::{AggregateCounts, AggregateKey, BatchOutcome};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use std::collections::HashMap;

/// 聚合 worker: 把未聚合的原始事件折叠进 (tenant, campaign, day) 日计数。
///
/// 已知并发窗口: 读取批次与置位 aggregated 分两步, 两个并发 drain 可能
/// 重复读到同一窗口并重复累加。单调度器部署下该行为被接受, 见 DESIGN.md。
#[derive(Clone)]
pub struct AggregationService {
    pool: DatabaseConnection,
    batch_size: u64,
    max_batches: u32,
}

impl AggregationService {
    pub fn new(pool: DatabaseConnection, batch_size: u64, max_batches: u32) -> Self {
        Self {
            pool,
            batch_size,
            max_batches,
        }
    }

    /// One pull-fold-apply pass over at most `batch_size` events.
    ///
    /// A failing aggregation key only loses its own group: the error is
    /// counted, the group's events keep `aggregated = false` and the next
    /// invocation retries them naturally.
    pub async fn run_once(&self) -> AppResult<BatchOutcome> {
        let events = raw_events::Entity::find()
            .filter(raw_events::Column::Aggregated.eq(false))
            .order_by_asc(raw_events::Column::OccurredAt)
            .limit(self.batch_size)
            .all(&self.pool)
            .await?;

        if events.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let groups = fold_groups(&events);

        let mut done_ids: Vec<i64> = Vec::with_capacity(events.len());
        let mut failed = 0u64;

        for (key, (counts, event_ids)) in groups {
            match self.apply_group(&key, &counts).await {
                Ok(()) => done_ids.extend(event_ids),
                Err(e) => {
                    log::error!(
                        "Aggregation failed for campaign={} day={}: {e:?}",
                        key.campaign_id,
                        key.day
                    );
                    failed += event_ids.len() as u64;
                }
            }
        }

        // 只有 upsert 成功的组才整体置位
        if !done_ids.is_empty() {
            raw_events::Entity::update_many()
                .col_expr(raw_events::Column::Aggregated, Expr::value(true))
                .filter(raw_events::Column::Id.is_in(done_ids.clone()))
                .exec(&self.pool)
                .await?;
        }

        Ok(BatchOutcome {
            processed: done_ids.len() as u64,
            failed,
        })
    }

    /// Repeat `run_once` until a pass consumes nothing, bounded by
    /// `max_batches` so one scheduler tick cannot chase a backlog forever.
    pub async fn drain(&self) -> AppResult<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for _ in 0..self.max_batches {
            let batch = self.run_once().await?;
            let advanced = batch.processed > 0;
            outcome.merge(batch);
            if !advanced {
                break;
            }
        }
        Ok(outcome)
    }

    /// Upsert-increment one counter row: try the in-place increment first,
    /// insert the row when it does not exist yet, and fall back to the
    /// increment once more if a concurrent insert wins the unique index.
    async fn apply_group(&self, key: &AggregateKey, counts: &AggregateCounts) -> AppResult<()> {
        if self.increment_row(key, counts).await? {
            return Ok(());
        }

        let insert = daily::ActiveModel {
            tenant_id: Set(key.tenant_id),
            campaign_id: Set(key.campaign_id),
            day: Set(key.day),
            impressions: Set(counts.impressions),
            opens: Set(counts.opens),
            game_starts: Set(counts.game_starts),
            game_finishes: Set(counts.game_finishes),
            form_submits: Set(counts.form_submits),
            prizes_won: Set(counts.prizes_won),
            cta_clicks: Set(counts.cta_clicks),
            ..Default::default()
        }
        .insert(&self.pool)
        .await;

        match insert {
            Ok(_) => Ok(()),
            // 撞唯一索引说明并发插入已建行, 改走累加
            Err(insert_err) => {
                if self.increment_row(key, counts).await? {
                    Ok(())
                } else {
                    Err(insert_err.into())
                }
            }
        }
    }

    /// Retention sweep: fully consumed events (both cursors set) older than
    /// the window are deleted; counters and submissions derived from them
    /// stay behind.
    pub async fn sweep_consumed(&self, retention_days: i64) -> AppResult<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let deleted = raw_events::Entity::delete_many()
            .filter(raw_events::Column::Aggregated.eq(true))
            .filter(raw_events::Column::Processed.eq(true))
            .filter(raw_events::Column::OccurredAt.lt(cutoff))
            .exec(&self.pool)
            .await?;
        if deleted.rows_affected > 0 {
            log::info!("Retention sweep deleted {} raw events", deleted.rows_affected);
        }
        Ok(deleted.rows_affected)
    }

    async fn increment_row(&self, key: &AggregateKey, counts: &AggregateCounts) -> AppResult<bool> {
        let result = daily::Entity::update_many()
            .col_expr(
                daily::Column::Impressions,
                Expr::col(daily::Column::Impressions).add(counts.impressions),
            )
            .col_expr(
                daily::Column::Opens,
                Expr::col(daily::Column::Opens).add(counts.opens),
            )
            .col_expr(
                daily::Column::GameStarts,
                Expr::col(daily::Column::GameStarts).add(counts.game_starts),
            )
            .col_expr(
                daily::Column::GameFinishes,
                Expr::col(daily::Column::GameFinishes).add(counts.game_finishes),
            )
            .col_expr(
                daily::Column::FormSubmits,
                Expr::col(daily::Column::FormSubmits).add(counts.form_submits),
            )
            .col_expr(
                daily::Column::PrizesWon,
                Expr::col(daily::Column::PrizesWon).add(counts.prizes_won),
            )
            .col_expr(
                daily::Column::CtaClicks,
                Expr::col(daily::Column::CtaClicks).add(counts.cta_clicks),
            )
            .col_expr(daily::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(daily::Column::TenantId.eq(key.tenant_id))
            .filter(daily::Column::CampaignId.eq(key.campaign_id))
            .filter(daily::Column::Day.eq(key.day))
            .exec(&self.pool)
            .await?;

        Ok(result.rows_affected > 0)
    }
}

/// Fold an event window into per-key counts plus the event ids behind each
/// key, so a failed key can withhold exactly its own events.
pub fn fold_groups(
    events: &[raw_events::Model],
) -> HashMap<AggregateKey, (AggregateCounts, Vec<i64>)> {
    let mut groups: HashMap<AggregateKey, (AggregateCounts, Vec<i64>)> = HashMap::new();
    for event in events {
        let key = AggregateKey {
            tenant_id: event.tenant_id,
            campaign_id: event.campaign_id,
            day: event.occurred_at.date_naive(),
        };
        let entry = groups.entry(key).or_default();
        entry.0.bump(event.kind);
        entry.1.push(event.id);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::EventKind;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn event(id: i64, campaign: Uuid, kind: EventKind, ts: &str) -> raw_events::Model {
        raw_events::Model {
            id,
            tenant_id: Uuid::nil(),
            campaign_id: campaign,
            session_id: "s1".into(),
            kind,
            occurred_at: ts.parse().unwrap(),
            payload: None,
            aggregated: false,
            processed: false,
            created_at: None,
        }
    }

    #[test]
    fn test_fold_counts_per_kind() {
        let campaign = Uuid::new_v4();
        let events = vec![
            event(1, campaign, EventKind::Impression, "2026-08-30T10:00:00Z"),
            event(2, campaign, EventKind::Impression, "2026-08-30T10:01:00Z"),
            event(3, campaign, EventKind::FormSubmit, "2026-08-30T10:02:00Z"),
            event(4, campaign, EventKind::PrizeAwarded, "2026-08-30T10:03:00Z"),
        ];

        let groups = fold_groups(&events);
        assert_eq!(groups.len(), 1);
        let (counts, ids) = groups.values().next().unwrap();
        assert_eq!(counts.impressions, 2);
        assert_eq!(counts.form_submits, 1);
        assert_eq!(counts.prizes_won, 1);
        assert_eq!(counts.opens, 0);
        assert_eq!(counts.total(), 4);
        assert_eq!(ids, &vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_fold_splits_on_calendar_day() {
        let campaign = Uuid::new_v4();
        let events = vec![
            event(1, campaign, EventKind::Open, "2026-08-30T23:59:59Z"),
            event(2, campaign, EventKind::Open, "2026-08-31T00:00:01Z"),
        ];

        let groups = fold_groups(&events);
        assert_eq!(groups.len(), 2);
        let day1 = chrono::Utc
            .with_ymd_and_hms(2026, 8, 30, 0, 0, 0)
            .unwrap()
            .date_naive();
        let key = AggregateKey {
            tenant_id: Uuid::nil(),
            campaign_id: campaign,
            day: day1,
        };
        assert_eq!(groups[&key].0.opens, 1);
    }

    #[test]
    fn test_fold_splits_on_campaign() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let events = vec![
            event(1, a, EventKind::GameStart, "2026-08-30T10:00:00Z"),
            event(2, b, EventKind::GameFinish, "2026-08-30T10:00:00Z"),
        ];
        assert_eq!(fold_groups(&events).len(), 2);
    }

    #[test]
    fn test_fold_empty_window() {
        assert!(fold_groups(&[]).is_empty());
    }
}

use crate::entities::{
    EventKind, PrizeCodeStatus, campaign_entity as campaigns, prize_code_entity as codes,
    prize_entity as prizes, raw_event_entity as raw_events, submission_entity as submissions,
};
use crate::error::{AppError, AppResult};
use crate::models::{ClaimRequest, ClaimResponse, WonPrize};
use crate::utils::{generate_code_batch, is_valid_email};
use chrono::Utc;
use rand::Rng;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Outcome of one allocation: the prize that was granted and, when the
/// inventory still had one, the claimed code.
#[derive(Debug, Clone)]
pub struct PrizeDraw {
    pub prize_id: Uuid,
    pub name: String,
    pub is_consolation: bool,
    pub code: Option<String>,
}

impl From<PrizeDraw> for WonPrize {
    fn from(d: PrizeDraw) -> Self {
        WonPrize {
            name: d.name,
            coupon_code: d.code,
            is_consolation: d.is_consolation,
        }
    }
}

/// Result of claiming against one candidate prize.
enum ClaimOutcome {
    /// Quantity slot secured; code is None when the code race was lost or an
    /// unlimited prize carries no inventory
    Won(Option<String>),
    /// Quantity cap already reached, or a capped prize ran out of codes
    Exhausted,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CodeImportReport {
    pub requested: usize,
    pub inserted: u64,
    /// In-batch repeats plus codes already present for this prize; counted
    /// and reported, never fatal
    pub duplicates: u64,
}

/// 奖品分配引擎。并发正确性要求:
/// - 同一个码绝不发给两个并发请求 (条件更新重查 status)
/// - claimed 绝不超过 quantity (条件更新带上限守卫)
/// - 常规奖品耗尽时退化到安慰奖, 再不行返回 None (不是错误)
#[derive(Clone)]
pub struct PrizeService {
    pool: DatabaseConnection,
}

impl PrizeService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    /// Weighted draw over the campaign's live prizes, then an atomic claim.
    /// Returns None only when nothing at all can be granted.
    pub async fn select_prize(&self, campaign_id: Uuid) -> AppResult<Option<PrizeDraw>> {
        let prize_list = prizes::Entity::find()
            .filter(prizes::Column::CampaignId.eq(campaign_id))
            .filter(prizes::Column::IsActive.eq(true))
            .order_by_asc(prizes::Column::CreatedAt)
            .all(&self.pool)
            .await?;

        let live: Vec<prizes::Model> = prize_list
            .into_iter()
            .filter(|p| p.has_remaining())
            .collect();
        let (mut regular, consolation) = partition_prizes(live);

        // 候选在并发扣减失败后被移除并重抽, 次数有界以约束最坏延迟
        let mut attempts = 0;
        while !regular.is_empty() && attempts < 5 {
            attempts += 1;

            let total: i64 = regular.iter().map(|p| p.weight_bp.max(0) as i64).sum();
            if total <= 0 {
                break;
            }
            let roll = rand::thread_rng().gen_range(0..total);
            let idx = draw_candidate(&regular, roll);
            let candidate = regular[idx].clone();

            match self.claim_prize(&candidate).await? {
                ClaimOutcome::Won(code) => {
                    return Ok(Some(PrizeDraw {
                        prize_id: candidate.id,
                        name: candidate.name,
                        is_consolation: false,
                        code,
                    }));
                }
                ClaimOutcome::Exhausted => {
                    regular.remove(idx);
                }
            }
        }

        // 常规奖品全部不可得: 安慰奖兜底
        if let Some(prize) = consolation {
            if let ClaimOutcome::Won(code) = self.claim_prize(&prize).await? {
                return Ok(Some(PrizeDraw {
                    prize_id: prize.id,
                    name: prize.name,
                    is_consolation: true,
                    code,
                }));
            }
        }

        Ok(None)
    }

    /// Claim one unit of `prize` in a single transaction.
    ///
    /// Two conditional updates carry the whole concurrency story: the
    /// quantity guard (`claimed < quantity`) and the code flip
    /// (`status = available` re-checked inside the UPDATE). Losing the code
    /// race yields a codeless win instead of an unbounded retry.
    async fn claim_prize(&self, prize: &prizes::Model) -> AppResult<ClaimOutcome> {
        let txn = self.pool.begin().await?;

        let quantity_guard = prizes::Entity::update_many()
            .col_expr(
                prizes::Column::Claimed,
                Expr::col(prizes::Column::Claimed).add(1),
            )
            .col_expr(prizes::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(prizes::Column::Id.eq(prize.id))
            .filter(
                Condition::any()
                    .add(prizes::Column::Quantity.is_null())
                    .add(Expr::col(prizes::Column::Claimed).lt(Expr::col(prizes::Column::Quantity))),
            )
            .exec(&txn)
            .await?;

        if quantity_guard.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(ClaimOutcome::Exhausted);
        }

        let code_row = codes::Entity::find()
            .filter(codes::Column::PrizeId.eq(prize.id))
            .filter(codes::Column::Status.eq(PrizeCodeStatus::Available))
            .order_by_asc(codes::Column::Id)
            .one(&txn)
            .await?;

        let Some(code_row) = code_row else {
            if prize.is_limited() {
                // 限量奖品无码可发: 整体回退, 留给安慰奖
                txn.rollback().await?;
                return Ok(ClaimOutcome::Exhausted);
            }
            // 无限量奖品允许裸发 (未导入码的配置)
            txn.commit().await?;
            return Ok(ClaimOutcome::Won(None));
        };

        let flip = codes::Entity::update_many()
            .col_expr(codes::Column::Status, Expr::value(PrizeCodeStatus::Claimed))
            .col_expr(codes::Column::ClaimedAt, Expr::value(Utc::now()))
            .filter(codes::Column::Id.eq(code_row.id))
            .filter(codes::Column::Status.eq(PrizeCodeStatus::Available))
            .exec(&txn)
            .await?;

        // 0 行说明并发方刚拿走这个码; 给出无码结果而不是无限重试
        let code = if flip.rows_affected == 1 {
            Some(code_row.code)
        } else {
            None
        };

        txn.commit().await?;
        Ok(ClaimOutcome::Won(code))
    }

    /// Return one unit of inventory after a draw that could not be used
    /// (the submission write-once race went to a concurrent claim).
    /// Mirrors claim_prize in reverse with the same conditional guards.
    async fn release_draw(&self, draw: &PrizeDraw) -> AppResult<()> {
        prizes::Entity::update_many()
            .col_expr(
                prizes::Column::Claimed,
                Expr::col(prizes::Column::Claimed).sub(1),
            )
            .col_expr(prizes::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(prizes::Column::Id.eq(draw.prize_id))
            .filter(Expr::col(prizes::Column::Claimed).gt(0))
            .exec(&self.pool)
            .await?;

        if let Some(code) = &draw.code {
            codes::Entity::update_many()
                .col_expr(
                    codes::Column::Status,
                    Expr::value(PrizeCodeStatus::Available),
                )
                .col_expr(
                    codes::Column::ClaimedAt,
                    Expr::value(sea_orm::Value::ChronoDateTimeUtc(None)),
                )
                .filter(codes::Column::PrizeId.eq(draw.prize_id))
                .filter(codes::Column::Code.eq(code.clone()))
                .filter(codes::Column::Status.eq(PrizeCodeStatus::Claimed))
                .exec(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Run the engine for a submission and persist the award exactly once.
    /// The `prize_awarded` raw event it appends is how wins re-enter the
    /// event pipeline (ESP notifications, webhooks).
    pub async fn assign_prize_to_submission(
        &self,
        submission_id: Uuid,
        campaign_id: Uuid,
    ) -> AppResult<Option<PrizeDraw>> {
        let submission = submissions::Entity::find_by_id(submission_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Submission {submission_id}")))?;

        let Some(draw) = self.select_prize(campaign_id).await? else {
            return Ok(None);
        };

        // write-once 守卫: 已有奖的 submission 不再覆盖
        let written = submissions::Entity::update_many()
            .col_expr(
                submissions::Column::PrizeName,
                Expr::value(draw.name.clone()),
            )
            .col_expr(
                submissions::Column::PrizeCode,
                Expr::value(draw.code.clone()),
            )
            .col_expr(submissions::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(submissions::Column::Id.eq(submission_id))
            .filter(submissions::Column::PrizeName.is_null())
            .exec(&self.pool)
            .await?;

        if written.rows_affected == 0 {
            // 并发 claim 先行写入: 归还本次抽到的库存, 不追加事件
            self.release_draw(&draw).await?;
            log::warn!(
                "Submission {submission_id} already holds a prize; released draw of '{}'",
                draw.name
            );
            return Ok(None);
        }

        raw_events::ActiveModel {
            tenant_id: Set(submission.tenant_id),
            campaign_id: Set(campaign_id),
            session_id: Set(submission.session_id),
            kind: Set(EventKind::PrizeAwarded),
            occurred_at: Set(Utc::now()),
            payload: Set(Some(serde_json::json!({
                "prizeName": draw.name,
                "couponCode": draw.code,
                "isConsolation": draw.is_consolation,
            }))),
            aggregated: Set(false),
            processed: Set(false),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;

        Ok(Some(draw))
    }

    /// Claim endpoint logic, idempotent per session: the second call returns
    /// the originally granted prize instead of drawing again.
    pub async fn claim_for_session(&self, request: ClaimRequest) -> AppResult<ClaimResponse> {
        let submission = self.find_or_create_submission(&request).await?;

        if let Some(response) = self.replay_response(&submission).await? {
            return Ok(response);
        }

        match self
            .assign_prize_to_submission(submission.id, submission.campaign_id)
            .await?
        {
            Some(draw) => Ok(ClaimResponse::won(draw.into())),
            None => {
                // None 不一定是真无奖: 并发 claim 可能在本次抽取期间先行
                // 写入, 重读后把先写方的结果作为本会话的结果返回
                let current = submissions::Entity::find_by_id(submission.id)
                    .one(&self.pool)
                    .await?;
                if let Some(current) = current
                    && let Some(response) = self.replay_response(&current).await?
                {
                    return Ok(response);
                }
                Ok(ClaimResponse::no_prize())
            }
        }
    }

    /// Stored-prize replay: a submission that already holds a prize answers
    /// every further claim with the original grant.
    async fn replay_response(
        &self,
        submission: &submissions::Model,
    ) -> AppResult<Option<ClaimResponse>> {
        let Some(name) = submission.prize_name.as_deref() else {
            return Ok(None);
        };
        let is_consolation = self
            .prize_is_consolation(submission.campaign_id, name)
            .await?;
        Ok(replay_granted(submission, is_consolation))
    }

    async fn find_or_create_submission(
        &self,
        request: &ClaimRequest,
    ) -> AppResult<submissions::Model> {
        let mut query = submissions::Entity::find()
            .filter(submissions::Column::SessionId.eq(request.session_id.clone()));
        if let Some(campaign_id) = request.campaign_id {
            query = query.filter(submissions::Column::CampaignId.eq(campaign_id));
        }
        if let Some(existing) = query
            .order_by_desc(submissions::Column::CreatedAt)
            .one(&self.pool)
            .await?
        {
            return Ok(existing);
        }

        // claim 先于 form_submit 到达: 就地建档, 这时必须携带 campaignId
        let campaign_id = request.campaign_id.ok_or_else(|| {
            AppError::ValidationError(
                "campaignId is required when the session has no submission yet".to_string(),
            )
        })?;
        let campaign = campaigns::Entity::find_by_id(campaign_id)
            .filter(campaigns::Column::IsActive.eq(true))
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Campaign {campaign_id}")))?;

        let email = request
            .email
            .as_deref()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| is_valid_email(e));

        let created = submissions::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(campaign.tenant_id),
            campaign_id: Set(campaign.id),
            session_id: Set(request.session_id.clone()),
            email: Set(email),
            name: Set(None),
            consent: Set(false),
            form_data: Set(request.form_data.clone()),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;

        Ok(created)
    }

    async fn prize_is_consolation(&self, campaign_id: Uuid, name: &str) -> AppResult<bool> {
        let prize = prizes::Entity::find()
            .filter(prizes::Column::CampaignId.eq(campaign_id))
            .filter(prizes::Column::Name.eq(name))
            .one(&self.pool)
            .await?;
        Ok(prize.map(|p| p.is_consolation).unwrap_or(false))
    }

    /// Bulk-import codes for a prize. Uniqueness within the batch is handled
    /// in-process; uniqueness against existing rows rides on the
    /// (prize_id, code) index with conflicting rows skipped and counted.
    pub async fn import_codes(
        &self,
        prize_id: Uuid,
        code_values: &[String],
    ) -> AppResult<CodeImportReport> {
        prizes::Entity::find_by_id(prize_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Prize {prize_id}")))?;

        let mut seen = std::collections::HashSet::new();
        let rows: Vec<codes::ActiveModel> = code_values
            .iter()
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty() && seen.insert(c.clone()))
            .map(|c| codes::ActiveModel {
                prize_id: Set(prize_id),
                code: Set(c),
                status: Set(PrizeCodeStatus::Available),
                ..Default::default()
            })
            .collect();

        if rows.is_empty() {
            return Ok(CodeImportReport {
                requested: code_values.len(),
                inserted: 0,
                duplicates: code_values.len() as u64,
            });
        }

        let inserted = codes::Entity::insert_many(rows)
            .on_conflict(
                OnConflict::columns([codes::Column::PrizeId, codes::Column::Code])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.pool)
            .await?;

        let report = CodeImportReport {
            requested: code_values.len(),
            inserted,
            duplicates: code_values.len() as u64 - inserted,
        };
        if report.duplicates > 0 {
            log::info!(
                "Code import for prize {prize_id}: {} duplicates skipped",
                report.duplicates
            );
        }
        Ok(report)
    }

    /// Generate `count` fresh codes on the restricted alphabet and import them.
    pub async fn generate_codes(
        &self,
        prize_id: Uuid,
        count: usize,
        len: usize,
    ) -> AppResult<CodeImportReport> {
        if count == 0 || count > 100_000 {
            return Err(AppError::ValidationError(
                "Code count must be between 1 and 100000".to_string(),
            ));
        }
        if !(4..=32).contains(&len) {
            return Err(AppError::ValidationError(
                "Code length must be between 4 and 32".to_string(),
            ));
        }
        let batch = generate_code_batch(count, len);
        self.import_codes(prize_id, &batch).await
    }
}

/// Build the alreadyClaimed response from a submission's stored prize.
/// Every claim after the first, concurrent or not, replays the identical
/// name and coupon code.
pub fn replay_granted(
    submission: &submissions::Model,
    is_consolation: bool,
) -> Option<ClaimResponse> {
    submission.prize_name.clone().map(|name| {
        ClaimResponse::already_claimed(WonPrize {
            name,
            coupon_code: submission.prize_code.clone(),
            is_consolation,
        })
    })
}

/// Split live prizes into the weighted regular pool and the consolation
/// fallback. At most one consolation prize is honored per campaign; extras
/// are ignored with a warning rather than failing the draw.
pub fn partition_prizes(live: Vec<prizes::Model>) -> (Vec<prizes::Model>, Option<prizes::Model>) {
    let mut regular = Vec::with_capacity(live.len());
    let mut consolation: Option<prizes::Model> = None;
    for prize in live {
        if prize.is_consolation {
            if consolation.is_some() {
                log::warn!(
                    "Campaign {} has more than one consolation prize; ignoring '{}'",
                    prize.campaign_id,
                    prize.name
                );
            } else {
                consolation = Some(prize);
            }
        } else {
            regular.push(prize);
        }
    }
    (regular, consolation)
}

/// Pure weighted pick: the first prize whose cumulative weight exceeds the
/// roll. The roll is continuous over [0, total), so ties cannot occur and a
/// given roll picks deterministically.
pub fn draw_candidate(prize_list: &[prizes::Model], roll: i64) -> usize {
    let mut acc = 0i64;
    for (idx, prize) in prize_list.iter().enumerate() {
        acc += prize.weight_bp.max(0) as i64;
        if roll < acc {
            return idx;
        }
    }
    prize_list.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prize(name: &str, weight_bp: i32, consolation: bool) -> prizes::Model {
        prizes::Model {
            id: Uuid::new_v4(),
            campaign_id: Uuid::nil(),
            name: name.into(),
            weight_bp,
            quantity: None,
            claimed: 0,
            is_consolation: consolation,
            is_active: true,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_draw_candidate_is_deterministic_for_a_roll() {
        let list = vec![prize("A", 7000, false), prize("B", 3000, false)];
        assert_eq!(draw_candidate(&list, 0), 0);
        assert_eq!(draw_candidate(&list, 6999), 0);
        assert_eq!(draw_candidate(&list, 7000), 1);
        assert_eq!(draw_candidate(&list, 9999), 1);
    }

    #[test]
    fn test_draw_candidate_skips_zero_weight() {
        let list = vec![prize("zero", 0, false), prize("B", 100, false)];
        assert_eq!(draw_candidate(&list, 0), 1);
        assert_eq!(draw_candidate(&list, 99), 1);
    }

    #[test]
    fn test_draw_distribution_converges() {
        // 70/30 奖品在 10 万次抽取后的经验分布应落在 ±1% 内
        let list = vec![prize("A", 7000, false), prize("B", 3000, false)];
        let total: i64 = list.iter().map(|p| p.weight_bp as i64).sum();
        let mut rng = rand::thread_rng();
        let draws = 100_000;
        let mut hits_a = 0u32;
        for _ in 0..draws {
            let roll = rng.gen_range(0..total);
            if draw_candidate(&list, roll) == 0 {
                hits_a += 1;
            }
        }
        let share_a = hits_a as f64 / draws as f64;
        assert!(
            (share_a - 0.7).abs() < 0.01,
            "share of A was {share_a}, expected 0.70 ± 0.01"
        );
    }

    fn submission_with(prize: Option<(&str, Option<&str>)>) -> submissions::Model {
        submissions::Model {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            campaign_id: Uuid::nil(),
            session_id: "sess-1".into(),
            email: None,
            name: None,
            consent: false,
            form_data: None,
            prize_name: prize.map(|(n, _)| n.to_string()),
            prize_code: prize.and_then(|(_, c)| c.map(str::to_string)),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_replay_returns_identical_stored_prize() {
        // 同一 session 的重复或并发 claim 都必须拿回首次发放的结果
        let submission = submission_with(Some(("10% off", Some("XK7M9P2Q"))));
        let response = replay_granted(&submission, false).unwrap();
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["alreadyClaimed"], true);
        assert_eq!(value["prize"]["name"], "10% off");
        assert_eq!(value["prize"]["couponCode"], "XK7M9P2Q");
    }

    #[test]
    fn test_replay_handles_codeless_grant() {
        let submission = submission_with(Some(("Free shipping", None)));
        let response = replay_granted(&submission, true).unwrap();
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["prize"]["isConsolation"], true);
        assert!(value["prize"]["couponCode"].is_null());
    }

    #[test]
    fn test_replay_without_stored_prize_falls_through() {
        let submission = submission_with(None);
        assert!(replay_granted(&submission, false).is_none());
    }

    #[test]
    fn test_partition_pulls_out_single_consolation() {
        let live = vec![
            prize("A", 7000, false),
            prize("fallback", 0, true),
            prize("B", 3000, false),
        ];
        let (regular, consolation) = partition_prizes(live);
        assert_eq!(regular.len(), 2);
        assert_eq!(consolation.unwrap().name, "fallback");
    }

    #[test]
    fn test_partition_ignores_second_consolation() {
        let live = vec![prize("c1", 0, true), prize("c2", 0, true)];
        let (regular, consolation) = partition_prizes(live);
        assert!(regular.is_empty());
        assert_eq!(consolation.unwrap().name, "c1");
    }

    #[test]
    fn test_partition_empty_regulars_means_consolation_only() {
        // 常规奖品被扣完后 has_remaining 过滤为空, 只剩安慰奖
        let exhausted = prizes::Model {
            quantity: Some(1),
            claimed: 1,
            ..prize("A", 7000, false)
        };
        assert!(!exhausted.has_remaining());
        let live: Vec<prizes::Model> = vec![exhausted, prize("fallback", 0, true)]
            .into_iter()
            .filter(|p| p.has_remaining())
            .collect();
        let (regular, consolation) = partition_prizes(live);
        assert!(regular.is_empty());
        assert!(consolation.is_some());
    }
}

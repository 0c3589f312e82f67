use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum PrizeCodeStatus {
    #[sea_orm(string_value = "available")]
    Available,
    #[sea_orm(string_value = "claimed")]
    Claimed,
}

impl std::fmt::Display for PrizeCodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrizeCodeStatus::Available => write!(f, "available"),
            PrizeCodeStatus::Claimed => write!(f, "claimed"),
        }
    }
}

/// 单个可兑换码。状态只允许 available -> claimed 一次, 不可回退;
/// 条件更新 (re-check status in the UPDATE itself) 保证并发下不重复发码。
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "prize_codes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub prize_id: Uuid,
    pub code: String,
    pub status: PrizeCodeStatus,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Interaction event kinds reported by the widget, plus `prize_awarded`
/// which the prize engine appends itself so wins re-enter the pipeline.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema, DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    #[sea_orm(string_value = "impression")]
    Impression,
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "game_start")]
    GameStart,
    #[sea_orm(string_value = "game_finish")]
    GameFinish,
    #[sea_orm(string_value = "form_submit")]
    FormSubmit,
    #[sea_orm(string_value = "prize_awarded")]
    PrizeAwarded,
    #[sea_orm(string_value = "cta_click")]
    CtaClick,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::Impression => "impression",
            EventKind::Open => "open",
            EventKind::GameStart => "game_start",
            EventKind::GameFinish => "game_finish",
            EventKind::FormSubmit => "form_submit",
            EventKind::PrizeAwarded => "prize_awarded",
            EventKind::CtaClick => "cta_click",
        };
        write!(f, "{s}")
    }
}

/// 原始事件 (append-only)
/// 两个消费标记各归一个消费者:
/// - aggregated: 聚合 worker 置位
/// - processed: 编排器置位
/// 除这两个标记外行内容写入后不可变。
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "raw_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tenant_id: Uuid,
    pub campaign_id: Uuid,
    pub session_id: String,
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
    pub payload: Option<Json>,
    pub aggregated: bool,
    pub processed: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

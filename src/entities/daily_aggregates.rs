use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Per (tenant, campaign, calendar day) counters, one column per event kind.
/// Counters only ever increase; the row is unique on its key.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "daily_aggregates")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tenant_id: Uuid,
    pub campaign_id: Uuid,
    pub day: NaiveDate,
    pub impressions: i64,
    pub opens: i64,
    pub game_starts: i64,
    pub game_finishes: i64,
    pub form_submits: i64,
    pub prizes_won: i64,
    pub cta_clicks: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
#[serde(rename_all = "snake_case")]
pub enum IntegrationKind {
    /// Generic signed webhook endpoint
    #[sea_orm(string_value = "webhook")]
    Webhook,
    #[sea_orm(string_value = "mailchimp")]
    Mailchimp,
    #[sea_orm(string_value = "brevo")]
    Brevo,
}

impl IntegrationKind {
    /// ESP/CRM providers can receive contacts, tags and custom events;
    /// plain webhooks only mirror raw payloads.
    pub fn is_contact_capable(&self) -> bool {
        !matches!(self, IntegrationKind::Webhook)
    }
}

impl std::fmt::Display for IntegrationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrationKind::Webhook => write!(f, "webhook"),
            IntegrationKind::Mailchimp => write!(f, "mailchimp"),
            IntegrationKind::Brevo => write!(f, "brevo"),
        }
    }
}

/// 下游集成配置
/// - campaign_id 为 NULL 表示租户级集成（对该租户所有 campaign 生效）
/// - config 按 kind 存放各自需要的字段 (url/secret 或 api_key/list_id)
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "integrations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub kind: IntegrationKind,
    pub name: String,
    pub config: Json,
    pub is_active: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

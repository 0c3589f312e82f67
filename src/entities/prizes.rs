use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 奖品配置实体
/// 概念说明:
/// - weight_bp: 抽中概率权重 (basis points) 1% = 100bp, 100% = 10000bp
/// - quantity: 发放上限 (NULL 表示无限)
/// - claimed: 已发放数量, 仅由奖品分配引擎原子递增
/// - is_consolation: 安慰奖标记, 常规奖品耗尽时兜底
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "prizes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub name: String,
    /// 权重 (basis points)
    pub weight_bp: i32,
    /// 发放上限 (NULL=无限)
    pub quantity: Option<i64>,
    /// 已发放数量
    pub claimed: i64,
    pub is_consolation: bool,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    /// 是否还可发放 (无限量或 claimed < quantity)
    pub fn has_remaining(&self) -> bool {
        match self.quantity {
            None => true,
            Some(cap) => self.claimed < cap,
        }
    }

    /// 是否是限量奖品
    pub fn is_limited(&self) -> bool {
        self.quantity.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

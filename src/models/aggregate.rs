use crate::entities::EventKind;
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

/// Grouping key for one daily counter row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AggregateKey {
    pub tenant_id: Uuid,
    pub campaign_id: Uuid,
    pub day: NaiveDate,
}

/// In-memory counter bundle folded from one aggregation window before it is
/// applied to the daily_aggregates row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateCounts {
    pub impressions: i64,
    pub opens: i64,
    pub game_starts: i64,
    pub game_finishes: i64,
    pub form_submits: i64,
    pub prizes_won: i64,
    pub cta_clicks: i64,
}

impl AggregateCounts {
    pub fn bump(&mut self, kind: EventKind) {
        match kind {
            EventKind::Impression => self.impressions += 1,
            EventKind::Open => self.opens += 1,
            EventKind::GameStart => self.game_starts += 1,
            EventKind::GameFinish => self.game_finishes += 1,
            EventKind::FormSubmit => self.form_submits += 1,
            EventKind::PrizeAwarded => self.prizes_won += 1,
            EventKind::CtaClick => self.cta_clicks += 1,
        }
    }

    pub fn total(&self) -> i64 {
        self.impressions
            + self.opens
            + self.game_starts
            + self.game_finishes
            + self.form_submits
            + self.prizes_won
            + self.cta_clicks
    }
}

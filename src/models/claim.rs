use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Prize claim request. `campaign_id` is only needed when the session has no
/// submission yet (claim arriving before the form_submit event was ingested).
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    /// Falls back to the session cookie when omitted
    #[serde(default)]
    pub session_id: String,
    pub campaign_id: Option<Uuid>,
    pub email: Option<String>,
    #[serde(default)]
    pub form_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WonPrize {
    pub name: String,
    /// None when the prize slot had no remaining code (lost the claim race,
    /// or an unlimited prize configured without imported codes)
    pub coupon_code: Option<String>,
    pub is_consolation: bool,
}

/// Wire shape is one of three variants; absent fields are omitted entirely.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prize: Option<WonPrize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub already_claimed: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub no_prize_available: bool,
}

impl ClaimResponse {
    pub fn won(prize: WonPrize) -> Self {
        Self {
            prize: Some(prize),
            already_claimed: false,
            no_prize_available: false,
        }
    }

    /// 同一 session 的第二次 claim: 返回首次结果, 不再抽奖
    pub fn already_claimed(prize: WonPrize) -> Self {
        Self {
            prize: Some(prize),
            already_claimed: true,
            no_prize_available: false,
        }
    }

    pub fn no_prize() -> Self {
        Self {
            prize: None,
            already_claimed: false,
            no_prize_available: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_response_shapes() {
        let won = serde_json::to_value(ClaimResponse::won(WonPrize {
            name: "10% off".into(),
            coupon_code: Some("XK7M9P2Q".into()),
            is_consolation: false,
        }))
        .unwrap();
        assert_eq!(won["prize"]["couponCode"], "XK7M9P2Q");
        assert!(won.get("alreadyClaimed").is_none());

        let empty = serde_json::to_value(ClaimResponse::no_prize()).unwrap();
        assert_eq!(empty["noPrizeAvailable"], true);
        assert!(empty.get("prize").is_none());
    }
}

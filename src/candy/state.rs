//! Mint window evaluation.
//!
//! All timestamps are unix seconds. Decoding the on-chain account is left to
//! the caller; [`CandyMachineData`] also loads from TOML for offline checks.

use serde::{Deserialize, Serialize};

/// How a candy machine's sale ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndSettingKind {
    /// `number` is a unix timestamp.
    Date,
    /// `number` is a redemption cap.
    Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndSetting {
    pub kind: EndSettingKind,
    pub number: u64,
}

/// The decoded candy machine fields the mint window depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CandyMachineData {
    pub items_available: u64,
    pub items_redeemed: u64,
    pub go_live_date: Option<i64>,
    /// Whitelist holders may mint before go-live.
    pub whitelist_presale: bool,
    pub end_setting: Option<EndSetting>,
}

/// Derived state of a candy machine at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintState {
    pub items_remaining: u64,
    pub is_sold_out: bool,
    pub is_presale: bool,
    pub is_active: bool,
}

impl MintState {
    pub fn evaluate(data: &CandyMachineData, now: i64) -> Self {
        let items_remaining = data.items_available.saturating_sub(data.items_redeemed);

        let before_go_live = data.go_live_date.map_or(true, |date| date > now);
        let is_presale = data.whitelist_presale && before_go_live;
        let is_live = data.go_live_date.is_some_and(|date| date < now);

        let within_end = match data.end_setting {
            Some(EndSetting {
                kind: EndSettingKind::Date,
                number,
            }) => i64::try_from(number).map_or(true, |end| end > now),
            Some(EndSetting {
                kind: EndSettingKind::Amount,
                number,
            }) => data.items_redeemed < number,
            None => true,
        };

        Self {
            items_remaining,
            is_sold_out: items_remaining == 0,
            is_presale,
            is_active: (is_presale || is_live) && within_end,
        }
    }
}

//! Persisted progress for a single pool instance.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::hash::Hasher;
use twox_hash::XxHash64;

use crate::bonus::{BonusReport, BonusTable, evaluate_bonuses};
use crate::category::PoolCategory;
use crate::numbers::len_to_u32;

const DRAW_LOG_KEY: &str = "draw_log";
const CATEGORY_KEY: &str = "category";

/// Rarity tier of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Top,
    Second,
    Lower,
}

impl Tier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Second => "second",
            Self::Lower => "lower",
        }
    }
}

/// How a draw reached its tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Probability roll at base or soft-pity odds.
    #[default]
    Roll,
    /// Hard ceiling forced the tier.
    Ceiling,
    /// Long-horizon guarantee pre-empted the rolls.
    LongHorizon,
}

/// Append-only log entry for one draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRecord {
    pub tier: Tier,
    #[serde(default)]
    pub featured: bool,
    /// One-based paid draw index. Free draws carry the paid total at the time.
    pub draw_index: u32,
    #[serde(default)]
    pub timestamp_ms: u64,
    #[serde(default)]
    pub free: bool,
    #[serde(default)]
    pub trigger: Trigger,
    /// Featured result forced by the carried or long-horizon guarantee.
    #[serde(default)]
    pub featured_guaranteed: bool,
    #[serde(default)]
    pub item: Option<String>,
}

impl DrawRecord {
    #[must_use]
    pub fn is_top_tier(&self) -> bool {
        self.tier == Tier::Top
    }
}

/// Pity counters and cumulative tallies; the part the resolver advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Progress {
    pub top_tier_pity: u32,
    pub second_tier_pity: u32,
    pub featured_guaranteed: bool,
    pub long_horizon_counter: u32,
    pub long_horizon_received: bool,
    pub total_draws: u32,
    pub top_tier_count: u32,
    pub second_tier_count: u32,
    pub featured_top_tier_count: u32,
}

impl Progress {
    #[must_use]
    pub const fn lower_tier_count(&self) -> u32 {
        self.total_draws
            .saturating_sub(self.top_tier_count)
            .saturating_sub(self.second_tier_count)
    }
}

/// Full persisted state for one pool instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PullState {
    #[serde(default)]
    pub category: PoolCategory,
    #[serde(flatten)]
    pub progress: Progress,
    /// Latched one-time bonus ids.
    #[serde(default)]
    pub unlocked_one_time: BTreeSet<String>,
    /// Memo of repeating bonus counts; always recomputed from `total_draws`.
    #[serde(default)]
    pub gifts_received: BTreeMap<String, u32>,
    #[serde(default)]
    pub free_batches_claimed: u32,
    #[serde(default)]
    pub draw_log: Vec<DrawRecord>,
}

/// Fields that a lenient import had to default or drop.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportReport {
    pub defaulted: Vec<String>,
    pub ignored: Vec<String>,
    pub dropped_records: usize,
    /// Category found in the blob when it differs from the expected one. Such
    /// blobs import as a fresh state.
    pub category_mismatch: Option<String>,
}

impl ImportReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.defaulted.is_empty()
            && self.ignored.is_empty()
            && self.dropped_records == 0
            && self.category_mismatch.is_none()
    }
}

impl PullState {
    #[must_use]
    pub fn new(category: PoolCategory) -> Self {
        Self {
            category,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn lower_tier_count(&self) -> u32 {
        self.progress.lower_tier_count()
    }

    pub fn paid_records(&self) -> impl Iterator<Item = &DrawRecord> {
        self.draw_log.iter().filter(|r| !r.free)
    }

    pub fn free_records(&self) -> impl Iterator<Item = &DrawRecord> {
        self.draw_log.iter().filter(|r| r.free)
    }

    /// Re-derive bonus memos from `total_draws`, latching one-time unlocks.
    pub fn refresh_bonus_memo(&mut self, table: &BonusTable) -> BonusReport {
        let report = evaluate_bonuses(
            self.progress.total_draws,
            table,
            &self.unlocked_one_time,
        );
        self.unlocked_one_time.extend(report.unlocked_one_time());
        self.gifts_received = report.repeating_counts();
        report
    }

    /// `XxHash64` of the canonical JSON export.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(&bytes);
        hasher.finish()
    }

    /// Cross-check counters against the paid draw log.
    ///
    /// Returns one message per discrepancy; empty when the ledger is consistent.
    #[must_use]
    pub fn audit(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let p = &self.progress;
        let paid: Vec<&DrawRecord> = self.paid_records().collect();
        let count = |tier: Tier| len_to_u32(paid.iter().filter(|r| r.tier == tier).count());

        if len_to_u32(paid.len()) != p.total_draws {
            issues.push(format!(
                "paid log has {} entries but total_draws is {}",
                paid.len(),
                p.total_draws
            ));
        }
        if count(Tier::Top) != p.top_tier_count {
            issues.push(format!(
                "log shows {} top-tier draws, counter says {}",
                count(Tier::Top),
                p.top_tier_count
            ));
        }
        if count(Tier::Second) != p.second_tier_count {
            issues.push(format!(
                "log shows {} second-tier draws, counter says {}",
                count(Tier::Second),
                p.second_tier_count
            ));
        }
        let featured = len_to_u32(paid.iter().filter(|r| r.is_top_tier() && r.featured).count());
        if featured != p.featured_top_tier_count {
            issues.push(format!(
                "log shows {featured} featured draws, counter says {}",
                p.featured_top_tier_count
            ));
        }
        let since_top = len_to_u32(paid.iter().rev().take_while(|r| !r.is_top_tier()).count());
        if since_top != p.top_tier_pity {
            issues.push(format!(
                "{since_top} draws since last top-tier, pity counter is {}",
                p.top_tier_pity
            ));
        }
        if p.featured_guaranteed
            && let Some(last_top) = paid.iter().rev().find(|r| r.is_top_tier())
            && last_top.featured
        {
            issues.push("carried guarantee armed after a featured result".to_string());
        }
        issues
    }

    /// Rebuild a state from an untrusted blob, defaulting whatever does not fit.
    ///
    /// Never fails: unknown keys are ignored, mistyped fields take their defaults
    /// and malformed draw-log entries are dropped one by one. A blob recorded for
    /// another category keeps none of its counters or log.
    #[must_use]
    pub fn from_blob(blob: &Value, expected: PoolCategory) -> (Self, ImportReport) {
        let mut report = ImportReport::default();
        let fresh = Self::new(expected);
        let Some(source) = blob.as_object() else {
            report.defaulted.push("<root>".to_string());
            return (fresh, report);
        };
        if let Some(value) = source.get(CATEGORY_KEY)
            && value.as_str().and_then(PoolCategory::from_token) != Some(expected)
        {
            report.category_mismatch = Some(value.to_string());
            return (fresh, report);
        }
        let Ok(Value::Object(defaults)) = serde_json::to_value(&fresh) else {
            return (fresh, report);
        };

        let mut merged: Map<String, Value> = defaults.clone();
        for (key, value) in source {
            match key.as_str() {
                DRAW_LOG_KEY | CATEGORY_KEY => {}
                _ if defaults.contains_key(key) => {
                    let previous = merged.insert(key.clone(), value.clone());
                    if serde_json::from_value::<Self>(Value::Object(merged.clone())).is_err() {
                        if let Some(previous) = previous {
                            merged.insert(key.clone(), previous);
                        }
                        report.defaulted.push(key.clone());
                    }
                }
                _ => report.ignored.push(key.clone()),
            }
        }

        let mut state = serde_json::from_value::<Self>(Value::Object(merged)).unwrap_or(fresh);
        state.category = expected;
        state.draw_log = match source.get(DRAW_LOG_KEY) {
            None => Vec::new(),
            Some(Value::Array(entries)) => {
                let records: Vec<DrawRecord> = entries
                    .iter()
                    .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
                    .collect();
                report.dropped_records = entries.len() - records.len();
                records
            }
            Some(_) => {
                report.defaulted.push(DRAW_LOG_KEY.to_string());
                Vec::new()
            }
        };
        (state, report)
    }
}

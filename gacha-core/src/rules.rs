//! Rule descriptors for each pool category and the rule book that groups them.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::bonus::BonusTable;
use crate::category::PoolCategory;
use crate::error::SessionError;

const DEFAULT_RULES_DATA: &str = include_str!("../assets/rules.json");

/// Immutable odds and guarantee parameters for one pool category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolRules {
    pub base_top_tier_probability: f64,
    pub base_second_tier_probability: f64,
    #[serde(default)]
    pub has_soft_pity: bool,
    #[serde(default)]
    pub soft_pity_start: u32,
    #[serde(default)]
    pub soft_pity_increase_per_draw: f64,
    pub top_tier_pity_ceiling: u32,
    #[serde(default = "PoolRules::default_second_tier_pity_ceiling")]
    pub second_tier_pity_ceiling: u32,
    #[serde(default)]
    pub featured_win_probability: f64,
    /// Whether a non-featured top-tier result forces the next one to be featured.
    #[serde(default = "PoolRules::default_carries_guarantee")]
    pub carries_guarantee: bool,
    /// Draws without a featured result before one is forced. `None` disables it.
    #[serde(default)]
    pub hard_guarantee_ceiling: Option<u32>,
    #[serde(default)]
    pub bonuses: BonusTable,
}

impl PoolRules {
    #[must_use]
    pub const fn default_second_tier_pity_ceiling() -> u32 {
        10
    }

    #[must_use]
    pub const fn default_carries_guarantee() -> bool {
        true
    }

    /// Validate odds, ceilings and bonus thresholds.
    ///
    /// # Errors
    ///
    /// Returns `RuleConfigError` when any field violates the documented bounds.
    pub fn validate(&self) -> Result<(), RuleConfigError> {
        validate_probability("base_top_tier_probability", self.base_top_tier_probability)?;
        validate_probability(
            "base_second_tier_probability",
            self.base_second_tier_probability,
        )?;
        validate_probability("featured_win_probability", self.featured_win_probability)?;
        validate_ceiling("top_tier_pity_ceiling", self.top_tier_pity_ceiling)?;
        validate_ceiling("second_tier_pity_ceiling", self.second_tier_pity_ceiling)?;
        if let Some(ceiling) = self.hard_guarantee_ceiling {
            validate_ceiling("hard_guarantee_ceiling", ceiling)?;
        }
        if self.has_soft_pity {
            self.validate_soft_pity()?;
        }
        self.bonuses.validate()
    }

    fn validate_soft_pity(&self) -> Result<(), RuleConfigError> {
        if self.soft_pity_start > self.top_tier_pity_ceiling {
            return Err(RuleConfigError::SoftPityWindow {
                start: self.soft_pity_start,
                ceiling: self.top_tier_pity_ceiling,
            });
        }
        validate_probability(
            "soft_pity_increase_per_draw",
            self.soft_pity_increase_per_draw,
        )
    }
}

fn validate_probability(field: &'static str, value: f64) -> Result<(), RuleConfigError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(RuleConfigError::RangeViolation {
            field,
            min: 0.0,
            max: 1.0,
            value,
        });
    }
    Ok(())
}

fn validate_ceiling(field: &'static str, value: u32) -> Result<(), RuleConfigError> {
    if value == 0 {
        return Err(RuleConfigError::ZeroThreshold { field });
    }
    Ok(())
}

/// Errors raised when rule descriptors violate their invariants.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuleConfigError {
    #[error("{field} must be between {min:.2} and {max:.2} (got {value})")]
    RangeViolation {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("{field} must be greater than zero")]
    ZeroThreshold { field: &'static str },
    #[error("soft pity start {start} must fall within 0..={ceiling}")]
    SoftPityWindow { start: u32, ceiling: u32 },
    #[error("bonus '{id}' has a zero interval or threshold")]
    ZeroBonusStep { id: String },
    #[error("alternating bonus reward cycle is empty")]
    EmptyRewardCycle,
    #[error("bonus id '{0}' is declared more than once")]
    DuplicateBonus(String),
    #[error("default category {0} has no rules")]
    MissingDefault(PoolCategory),
    #[error("rules for {category} are invalid: {source}")]
    Category {
        category: PoolCategory,
        #[source]
        source: Box<RuleConfigError>,
    },
}

/// Rule descriptors keyed by category with a designated fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleBook {
    #[serde(default)]
    pub default_category: PoolCategory,
    pub pools: BTreeMap<PoolCategory, PoolRules>,
}

impl RuleBook {
    /// Parse a rule book from JSON without validating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into a rule book.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The rule book bundled with the crate.
    ///
    /// # Panics
    ///
    /// Panics if the bundled asset is not a valid rule book.
    #[must_use]
    pub fn default_book() -> Self {
        Self::from_json(DEFAULT_RULES_DATA).expect("bundled rules.json is valid")
    }

    /// Validate every pool and the default category.
    ///
    /// # Errors
    ///
    /// Returns the first `RuleConfigError` encountered.
    pub fn validate(&self) -> Result<(), RuleConfigError> {
        if !self.pools.contains_key(&self.default_category) {
            return Err(RuleConfigError::MissingDefault(self.default_category));
        }
        for (category, rules) in &self.pools {
            rules
                .validate()
                .map_err(|source| RuleConfigError::Category {
                    category: *category,
                    source: Box::new(source),
                })?;
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, category: PoolCategory) -> Option<&PoolRules> {
        self.pools.get(&category)
    }

    /// Normalize a category token and look up its rules.
    ///
    /// Unknown tokens, and categories without rules, fall back to the default category.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownCategory` when neither the requested nor the
    /// default category has rules.
    pub fn resolve(&self, token: &str) -> Result<(PoolCategory, &PoolRules), SessionError> {
        let requested = PoolCategory::from_token(token);
        if let Some(category) = requested
            && let Some(rules) = self.pools.get(&category)
        {
            return Ok((category, rules));
        }
        log::debug!(
            "category token '{token}' has no rules; falling back to {}",
            self.default_category
        );
        self.pools
            .get(&self.default_category)
            .map(|rules| (self.default_category, rules))
            .ok_or_else(|| SessionError::UnknownCategory {
                token: token.to_string(),
            })
    }

    /// Categories with registered rules, in canonical order.
    #[must_use]
    pub fn categories(&self) -> BTreeSet<PoolCategory> {
        self.pools.keys().copied().collect()
    }
}

impl Default for RuleBook {
    fn default() -> Self {
        Self::default_book()
    }
}

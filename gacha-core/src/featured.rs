//! Injected collaborators: item naming and wall-clock time.
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::category::PoolCategory;

/// Resolves display names for top-tier results.
///
/// Implementations may consult a release schedule; the resolver itself never does.
pub trait FeaturedItemSource {
    fn display_name(&self, category: PoolCategory, featured: bool, draw_index: u32) -> String;
}

/// Fixed per-category names; off-banner picks rotate by draw index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticRoster {
    featured: BTreeMap<PoolCategory, String>,
    off_banner: BTreeMap<PoolCategory, Vec<String>>,
}

impl StaticRoster {
    #[must_use]
    pub fn new(
        featured: BTreeMap<PoolCategory, String>,
        off_banner: BTreeMap<PoolCategory, Vec<String>>,
    ) -> Self {
        Self {
            featured,
            off_banner,
        }
    }

    #[must_use]
    pub fn with_featured(mut self, category: PoolCategory, name: impl Into<String>) -> Self {
        self.featured.insert(category, name.into());
        self
    }
}

impl Default for StaticRoster {
    fn default() -> Self {
        let names = |list: &[&str]| list.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();
        let featured = BTreeMap::from([
            (PoolCategory::Limited, "Featured Operator".to_string()),
            (PoolCategory::Weapon, "Featured Armament".to_string()),
        ]);
        let off_banner = BTreeMap::from([
            (
                PoolCategory::Limited,
                names(&["Vanguard Ash", "Medic Lirien", "Sniper Corwen", "Caster Ysolde"]),
            ),
            (
                PoolCategory::Weapon,
                names(&["Tempered Glaive", "Signal Carbine", "Ward Tome"]),
            ),
            (
                PoolCategory::Standard,
                names(&[
                    "Vanguard Ash",
                    "Medic Lirien",
                    "Sniper Corwen",
                    "Caster Ysolde",
                    "Guard Hollis",
                ]),
            ),
        ]);
        Self::new(featured, off_banner)
    }
}

impl FeaturedItemSource for StaticRoster {
    fn display_name(&self, category: PoolCategory, featured: bool, draw_index: u32) -> String {
        if featured && let Some(name) = self.featured.get(&category) {
            return name.clone();
        }
        match self.off_banner.get(&category) {
            Some(list) if !list.is_empty() => {
                let idx = usize::try_from(draw_index).unwrap_or(0) % list.len();
                list[idx].clone()
            }
            _ => format!("{category} top-tier"),
        }
    }
}

/// Millisecond wall clock used to stamp draw records.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default()
    }
}

/// Clock pinned to a single instant, for replay and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now_ms(&self) -> u64 {
        self.0
    }
}

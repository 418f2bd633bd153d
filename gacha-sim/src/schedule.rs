//! Date-driven featured item lookup for simulated banners.
use anyhow::{Context, Result, ensure};
use chrono::{NaiveDate, Utc};
use gacha_core::{FeaturedItemSource, PoolCategory, StaticRoster};
use serde::Deserialize;

const SCHEDULE_DATA: &str = include_str!("../assets/schedule.json");

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BannerWindow {
    pub category: PoolCategory,
    pub featured: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl BannerWindow {
    fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Deserialize)]
struct ScheduleFile {
    windows: Vec<BannerWindow>,
}

/// Featured names picked by date, off-banner names from a static roster.
#[derive(Debug, Clone)]
pub struct ScheduledRoster {
    windows: Vec<BannerWindow>,
    date: NaiveDate,
    fallback: StaticRoster,
}

impl ScheduledRoster {
    /// Parse a schedule and pin it to `date`.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a window ends before it starts.
    pub fn from_json(json: &str, date: NaiveDate) -> Result<Self> {
        let file: ScheduleFile = serde_json::from_str(json).context("parsing banner schedule")?;
        for window in &file.windows {
            ensure!(
                window.start <= window.end,
                "banner window for {} ends before it starts ({} > {})",
                window.featured,
                window.start,
                window.end
            );
        }
        Ok(Self {
            windows: file.windows,
            date,
            fallback: StaticRoster::default(),
        })
    }

    /// The bundled schedule pinned to `date`, or today when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled schedule fails to parse.
    pub fn bundled(date: Option<NaiveDate>) -> Result<Self> {
        Self::from_json(SCHEDULE_DATA, date.unwrap_or_else(|| Utc::now().date_naive()))
    }

    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.date
    }

    /// Item scheduled for `category` on the pinned date.
    #[must_use]
    pub fn featured_for(&self, category: PoolCategory) -> Option<&str> {
        self.windows
            .iter()
            .find(|w| w.category == category && w.contains(self.date))
            .map(|w| w.featured.as_str())
    }
}

impl FeaturedItemSource for ScheduledRoster {
    fn display_name(&self, category: PoolCategory, featured: bool, draw_index: u32) -> String {
        if featured && let Some(name) = self.featured_for(category) {
            return name.to_string();
        }
        self.fallback.display_name(category, featured, draw_index)
    }
}

/// Parse a `YYYY-MM-DD` CLI date.
///
/// # Errors
///
/// Returns an error if the token is not a valid calendar date.
pub fn parse_date(token: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(token.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date '{token}', expected YYYY-MM-DD"))
}

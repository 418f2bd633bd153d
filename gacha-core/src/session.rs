//! Live pull session: owns state, rules, randomness and observers.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::smallvec;

use crate::bonus::{BonusReport, BonusUnlock, evaluate_bonuses};
use crate::category::PoolCategory;
use crate::error::SessionError;
use crate::featured::{Clock, FeaturedItemSource, StaticRoster, SystemClock};
use crate::resolver::{
    BATCH_SIZE, BatchRecords, DrawContext, resolve_batch, resolve_draw, resolve_free_batch,
};
use crate::rng::RollSource;
use crate::rules::{PoolRules, RuleBook};
use crate::state::{ImportReport, Progress, PullState};
use crate::stats::{PityInfo, PullStatistics, pity_info, statistics};

/// Handle returned by [`PullSession::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Committed mutation broadcast to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Pulled { draws: usize },
    FreeBatch { draws: usize },
    Reset,
    Imported,
    FeaturedChanged,
}

type Listener = Box<dyn FnMut(&SessionEvent, &PullState) + Send>;

/// Records produced by one pull operation plus bonuses it unlocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullReport {
    pub outcomes: BatchRecords,
    pub unlocked: Vec<BonusUnlock>,
}

/// Session over one pool instance.
///
/// Methods take `&mut self`; concurrent hosts keep one session per task or wrap
/// it in a mutex. The session is `Send` whenever its roll source is.
///
/// Listeners run synchronously after each commit and only see the state
/// immutably, so they cannot mutate the session they observe.
pub struct PullSession<R: RollSource> {
    category: PoolCategory,
    rules: PoolRules,
    state: PullState,
    rolls: R,
    featured: Option<String>,
    items: Box<dyn FeaturedItemSource + Send>,
    clock: Box<dyn Clock + Send>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl<R: RollSource> PullSession<R> {
    /// Open a session for `token`, normalizing aliases and falling back to the
    /// book's default category.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownCategory` when no rules apply, or
    /// `SessionError::InvalidRules` when the selected rules fail validation.
    pub fn new(book: &RuleBook, token: &str, rolls: R) -> Result<Self, SessionError> {
        let (category, rules) = book.resolve(token)?;
        Self::with_rules(category, rules.clone(), rolls)
    }

    /// Open a session over explicit rules.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidRules` when `rules` fail validation.
    pub fn with_rules(
        category: PoolCategory,
        rules: PoolRules,
        rolls: R,
    ) -> Result<Self, SessionError> {
        rules
            .validate()
            .map_err(|source| SessionError::InvalidRules { category, source })?;
        let mut state = PullState::new(category);
        state.refresh_bonus_memo(&rules.bonuses);
        Ok(Self {
            category,
            rules,
            state,
            rolls,
            featured: None,
            items: Box::new(StaticRoster::default()),
            clock: Box::new(SystemClock),
            listeners: Vec::new(),
            next_listener: 0,
        })
    }

    #[must_use]
    pub fn with_item_source(mut self, items: impl FeaturedItemSource + Send + 'static) -> Self {
        self.items = Box::new(items);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    #[must_use]
    pub fn with_featured(mut self, featured: impl Into<String>) -> Self {
        self.featured = Some(featured.into());
        self
    }

    #[must_use]
    pub const fn category(&self) -> PoolCategory {
        self.category
    }

    #[must_use]
    pub const fn rules(&self) -> &PoolRules {
        &self.rules
    }

    #[must_use]
    pub const fn state(&self) -> &PullState {
        &self.state
    }

    #[must_use]
    pub fn featured(&self) -> Option<&str> {
        self.featured.as_deref()
    }

    #[must_use]
    pub const fn rolls(&self) -> &R {
        &self.rolls
    }

    /// Swap the random source, returning the previous one.
    pub fn replace_rolls(&mut self, rolls: R) -> R {
        std::mem::replace(&mut self.rolls, rolls)
    }

    /// Set or clear the featured item override.
    pub fn set_featured(&mut self, featured: Option<String>) {
        if self.featured != featured {
            self.featured = featured;
            self.notify(SessionEvent::FeaturedChanged);
        }
    }

    /// Resolve and commit one paid draw.
    pub fn pull_one(&mut self) -> PullReport {
        let ctx = DrawContext::new(self.category, self.featured.as_deref(), self.clock.now_ms());
        let outcome = resolve_draw(&self.state.progress, &self.rules, &ctx, &mut self.rolls);
        self.commit_paid(smallvec![outcome.record], outcome.next)
    }

    /// Resolve and commit a paid batch of ten.
    ///
    /// # Errors
    ///
    /// Never fails for the fixed batch size; shares the error type of [`Self::pull_many`].
    pub fn pull_batch(&mut self) -> Result<PullReport, SessionError> {
        self.pull_many(BATCH_SIZE)
    }

    /// Resolve and commit `n` paid draws.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::EmptyBatch` when `n` is zero.
    pub fn pull_many(&mut self, n: usize) -> Result<PullReport, SessionError> {
        let ctx = DrawContext::new(self.category, self.featured.as_deref(), self.clock.now_ms());
        let batch = resolve_batch(&self.state.progress, &self.rules, &ctx, &mut self.rolls, n)?;
        Ok(self.commit_paid(batch.records, batch.final_progress))
    }

    /// Resolve a free batch and commit only its log records.
    ///
    /// Pity counters, tier tallies and `total_draws` stay untouched. Availability is
    /// the caller's call; see [`Self::free_batches_available`].
    ///
    /// # Errors
    ///
    /// Never fails for the fixed batch size; shares the error type of [`Self::pull_many`].
    pub fn pull_free_batch(&mut self) -> Result<PullReport, SessionError> {
        if self.free_batches_available() == 0 {
            log::debug!("{} free batch claimed with none available", self.category);
        }
        let ctx = DrawContext::new(self.category, self.featured.as_deref(), self.clock.now_ms());
        let mut records = resolve_free_batch(
            self.state.progress.total_draws,
            &self.rules,
            &ctx,
            &mut self.rolls,
            BATCH_SIZE,
        )?;
        self.name_items(&mut records);
        self.state.draw_log.extend(records.iter().cloned());
        self.state.free_batches_claimed = self.state.free_batches_claimed.saturating_add(1);
        self.state.refresh_bonus_memo(&self.rules.bonuses);
        log::debug!(
            "{} free batch committed ({} claimed)",
            self.category,
            self.state.free_batches_claimed
        );
        self.notify(SessionEvent::FreeBatch {
            draws: records.len(),
        });
        Ok(PullReport {
            outcomes: records,
            unlocked: Vec::new(),
        })
    }

    /// Replace the state with an empty one; rules and featured context stay.
    pub fn reset(&mut self) {
        self.state = PullState::new(self.category);
        self.state.refresh_bonus_memo(&self.rules.bonuses);
        log::info!("{} session reset", self.category);
        self.notify(SessionEvent::Reset);
    }

    /// Snapshot of the persisted state.
    #[must_use]
    pub fn export_state(&self) -> PullState {
        self.state.clone()
    }

    /// Pretty JSON export of the persisted state.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.state)
    }

    /// Leniently restore state from a blob, defaulting whatever does not fit.
    pub fn import_state(&mut self, blob: &Value) -> ImportReport {
        let (mut state, report) = PullState::from_blob(blob, self.category);
        state.refresh_bonus_memo(&self.rules.bonuses);
        if let Some(found) = &report.category_mismatch {
            log::warn!(
                "imported blob is for category {found}; starting {} fresh",
                self.category
            );
        }
        for field in &report.defaulted {
            log::warn!("import defaulted field '{field}'");
        }
        if report.dropped_records > 0 {
            log::warn!(
                "import dropped {} malformed draw records",
                report.dropped_records
            );
        }
        for issue in state.audit() {
            log::warn!("imported state inconsistent: {issue}");
        }
        self.state = state;
        log::info!(
            "{} state imported at {} draws",
            self.category,
            self.state.progress.total_draws
        );
        self.notify(SessionEvent::Imported);
        report
    }

    /// Parse and import a JSON string. Unparseable input imports as a fresh state.
    pub fn import_json(&mut self, json: &str) -> ImportReport {
        let blob = serde_json::from_str(json).unwrap_or_else(|err| {
            log::warn!("state blob is not valid JSON: {err}");
            Value::Null
        });
        self.import_state(&blob)
    }

    #[must_use]
    pub fn statistics(&self) -> PullStatistics {
        statistics(&self.state, &self.rules)
    }

    #[must_use]
    pub fn pity_info(&self) -> PityInfo {
        pity_info(&self.state, &self.rules)
    }

    /// Fresh evaluation of every bonus for the current draw total.
    #[must_use]
    pub fn bonus_report(&self) -> BonusReport {
        evaluate_bonuses(
            self.state.progress.total_draws,
            &self.rules.bonuses,
            &self.state.unlocked_one_time,
        )
    }

    /// Free-batch grants unlocked so far minus those already claimed.
    #[must_use]
    pub fn free_batches_available(&self) -> u32 {
        self.bonus_report()
            .free_batches_unlocked
            .saturating_sub(self.state.free_batches_claimed)
    }

    /// Register a listener invoked after every committed mutation.
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&SessionEvent, &PullState) + Send + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    fn commit_paid(&mut self, mut records: BatchRecords, next: Progress) -> PullReport {
        let before = self.bonus_report();
        self.name_items(&mut records);
        self.state.progress = next;
        self.state.draw_log.extend(records.iter().cloned());
        let after = self.state.refresh_bonus_memo(&self.rules.bonuses);
        let unlocked = after.unlocked_since(&before);
        log::debug!(
            "{} committed {} draws (total {}, pity {})",
            self.category,
            records.len(),
            next.total_draws,
            next.top_tier_pity
        );
        for unlock in &unlocked {
            log::debug!("bonus '{}' unlocked x{}", unlock.id, unlock.count);
        }
        self.notify(SessionEvent::Pulled {
            draws: records.len(),
        });
        PullReport {
            outcomes: records,
            unlocked,
        }
    }

    fn name_items(&self, records: &mut BatchRecords) {
        for record in records.iter_mut().filter(|r| r.is_top_tier() && r.item.is_none()) {
            record.item = Some(self.items.display_name(
                self.category,
                record.featured,
                record.draw_index,
            ));
        }
    }

    fn notify(&mut self, event: SessionEvent) {
        for (_, listener) in &mut self.listeners {
            listener(&event, &self.state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::featured::FixedClock;
    use crate::rng::{ScriptedRolls, SeededRolls};
    use crate::rules::RuleConfigError;
    use crate::state::Tier;
    use std::sync::{Arc, Mutex};
    use std::thread;

    const NO_HIT: f64 = 0.999_999;

    fn limited(rolls: ScriptedRolls) -> PullSession<ScriptedRolls> {
        PullSession::new(&RuleBook::default_book(), "limited", rolls)
            .unwrap()
            .with_clock(FixedClock(1_000))
    }

    #[test]
    fn aliases_resolve_and_unknown_tokens_fall_back() {
        let book = RuleBook::default_book();
        let weapon =
            PullSession::new(&book, "Limited-Weapon", ScriptedRolls::constant(0.5)).unwrap();
        assert_eq!(weapon.category(), PoolCategory::Weapon);
        let fallback = PullSession::new(&book, "mystery", ScriptedRolls::constant(0.5)).unwrap();
        assert_eq!(fallback.category(), PoolCategory::Limited);
    }

    #[test]
    fn invalid_rules_refuse_to_build() {
        let mut rules = RuleBook::default_book()
            .get(PoolCategory::Limited)
            .cloned()
            .unwrap();
        rules.base_top_tier_probability = 1.5;
        let err =
            PullSession::with_rules(PoolCategory::Limited, rules, ScriptedRolls::constant(0.5))
                .err()
                .unwrap();
        assert!(matches!(
            err,
            SessionError::InvalidRules {
                source: RuleConfigError::RangeViolation { .. },
                ..
            }
        ));
    }

    #[test]
    fn paid_pulls_commit_counters_and_log() {
        let mut session = limited(ScriptedRolls::constant(NO_HIT));
        let one = session.pull_one();
        assert_eq!(one.outcomes.len(), 1);
        assert_eq!(one.outcomes[0].timestamp_ms, 1_000);
        let batch = session.pull_batch().unwrap();
        assert_eq!(batch.outcomes.len(), 10);
        assert_eq!(session.state().progress.total_draws, 11);
        assert_eq!(session.state().draw_log.len(), 11);
        assert_eq!(session.state().progress.second_tier_count, 1);
        assert!(session.state().audit().is_empty());
        assert_eq!(session.pull_many(0), Err(SessionError::EmptyBatch));
    }

    #[test]
    fn featured_override_names_featured_results() {
        let mut session = limited(ScriptedRolls::new(vec![0.0, 0.0, 0.0, 0.9], NO_HIT))
            .with_featured("Ember Queen");
        let first = session.pull_one();
        assert_eq!(first.outcomes[0].item.as_deref(), Some("Ember Queen"));
        let second = session.pull_one();
        assert_eq!(second.outcomes[0].tier, Tier::Top);
        assert!(!second.outcomes[0].featured);
        let name = second.outcomes[0].item.clone().unwrap();
        assert_ne!(name, "Ember Queen");
        assert!(session.state().progress.featured_guaranteed);
    }

    #[test]
    fn free_batch_leaves_counters_untouched() {
        let mut session = limited(ScriptedRolls::constant(NO_HIT));
        session.pull_many(35).unwrap();
        let before = session.state().progress;
        assert_eq!(session.free_batches_available(), 1);

        for _ in 0..10 {
            let report = session.pull_free_batch().unwrap();
            assert!(report.outcomes.iter().all(|r| r.free && r.draw_index == 35));
        }
        assert_eq!(session.state().progress, before);
        assert_eq!(session.state().draw_log.len(), 35 + 100);
        assert_eq!(session.state().free_batches_claimed, 10);
        assert_eq!(session.free_batches_available(), 0);
        assert!(session.state().audit().is_empty());
    }

    #[test]
    fn pull_reports_newly_unlocked_bonuses() {
        let mut session = limited(ScriptedRolls::constant(NO_HIT));
        session.pull_many(25).unwrap();
        let report = session.pull_batch().unwrap();
        let ids: Vec<&str> = report.unlocked.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["free_batch"]);
        assert!(session.pull_batch().unwrap().unlocked.is_empty());
        assert!(session.state().unlocked_one_time.contains("free_batch"));
    }

    #[test]
    fn reset_keeps_rules_and_featured() {
        let mut session = limited(ScriptedRolls::constant(NO_HIT)).with_featured("Ember");
        session.pull_batch().unwrap();
        session.reset();
        assert_eq!(session.state().progress, Progress::default());
        assert!(session.state().draw_log.is_empty());
        assert!(session.state().unlocked_one_time.is_empty());
        assert_eq!(session.featured(), Some("Ember"));
    }

    #[test]
    fn listeners_see_each_commit_until_unsubscribed() {
        let mut session = limited(ScriptedRolls::constant(NO_HIT));
        let seen: Arc<Mutex<Vec<(SessionEvent, u32)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let id = session.subscribe(move |event, state| {
            sink.lock().unwrap().push((*event, state.progress.total_draws));
        });
        session.pull_one();
        session.pull_batch().unwrap();
        session.set_featured(Some("Ember".to_string()));
        session.set_featured(Some("Ember".to_string()));
        session.reset();
        assert!(session.unsubscribe(id));
        assert!(!session.unsubscribe(id));
        session.pull_one();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (SessionEvent::Pulled { draws: 1 }, 1),
                (SessionEvent::Pulled { draws: 10 }, 11),
                (SessionEvent::FeaturedChanged, 11),
                (SessionEvent::Reset, 0),
            ]
        );
    }

    #[test]
    fn export_import_round_trip_replays_identically() {
        let book = RuleBook::default_book();
        let mut original =
            PullSession::new(&book, "weapon", SeededRolls::from_user_seed(9, b"pull")).unwrap();
        original.pull_many(57).unwrap();
        let json = original.export_json().unwrap();

        let mut restored =
            PullSession::new(&book, "weapon", SeededRolls::from_user_seed(1, b"pull")).unwrap();
        let report = restored.import_json(&json);
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(restored.state(), original.state());

        restored.replace_rolls(SeededRolls::from_user_seed(77, b"pull"));
        original.replace_rolls(SeededRolls::from_user_seed(77, b"pull"));
        let a = original.pull_many(40).unwrap();
        let b = restored.pull_many(40).unwrap();
        let tiers = |r: &PullReport| {
            r.outcomes
                .iter()
                .map(|o| (o.tier, o.featured))
                .collect::<Vec<_>>()
        };
        assert_eq!(tiers(&a), tiers(&b));
        assert_eq!(original.state().progress, restored.state().progress);
    }

    fn assert_send<T: Send>() {}

    #[test]
    fn sessions_move_across_threads_behind_a_mutex() {
        assert_send::<PullSession<SeededRolls>>();
        assert_send::<PullSession<ScriptedRolls>>();

        let session = PullSession::new(
            &RuleBook::default_book(),
            "limited",
            SeededRolls::from_user_seed(3, b"pull"),
        )
        .unwrap()
        .with_clock(FixedClock(5));
        let shared = Arc::new(Mutex::new(session));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    shared.lock().unwrap().pull_batch().unwrap();
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        let session = shared.lock().unwrap();
        assert_eq!(session.state().progress.total_draws, 40);
        assert!(session.state().audit().is_empty());
    }

    #[test]
    fn garbage_import_yields_fresh_state() {
        let mut session = limited(ScriptedRolls::constant(NO_HIT));
        session.pull_batch().unwrap();
        let report = session.import_json("not json");
        assert_eq!(report.defaulted, vec!["<root>".to_string()]);
        assert_eq!(session.state().progress, Progress::default());
    }
}

//! Gacha pull engine
//!
//! Platform-agnostic pull resolution, pity accounting and bonus evaluation.
//! This crate has no UI or storage dependencies; hosts plug in rule loading
//! and state persistence through the traits below.

pub mod bonus;
pub mod category;
pub mod error;
pub mod featured;
pub mod numbers;
pub mod probability;
pub mod resolver;
pub mod rng;
pub mod rules;
pub mod session;
pub mod state;
pub mod stats;

use std::convert::Infallible;

// Re-export commonly used types
pub use bonus::{
    AlternatingBonus, BonusGrant, BonusReport, BonusTable, BonusUnlock, OneTimeBonus,
    RepeatingBonus, evaluate_bonuses,
};
pub use category::PoolCategory;
pub use error::SessionError;
pub use featured::{Clock, FeaturedItemSource, FixedClock, StaticRoster, SystemClock};
pub use probability::{
    expected_draws_per_top_tier, resolve_featured, second_tier_probability, top_tier_probability,
};
pub use resolver::{
    BATCH_SIZE, BatchOutcome, BatchRecords, DrawContext, DrawOutcome, resolve_batch, resolve_draw,
    resolve_free_batch,
};
pub use rng::{CountingRng, RollSource, ScriptedRolls, SeededRolls};
pub use rules::{PoolRules, RuleBook, RuleConfigError};
pub use session::{ListenerId, PullReport, PullSession, SessionEvent};
pub use state::{DrawRecord, ImportReport, Progress, PullState, Tier, Trigger};
pub use stats::{CounterInfo, PityHistoryEntry, PityInfo, PullStatistics};

/// Trait for abstracting rule book loading
/// Platform-specific implementations should provide this
pub trait RulesLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the rule book from the platform-specific source
    ///
    /// # Errors
    ///
    /// Returns an error if the rule book cannot be loaded or parsed.
    fn load_rule_book(&self) -> Result<RuleBook, Self::Error>;
}

/// Loader returning the rule book compiled into the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledRules;

impl RulesLoader for BundledRules {
    type Error = Infallible;

    fn load_rule_book(&self) -> Result<RuleBook, Self::Error> {
        Ok(RuleBook::default_book())
    }
}

/// Trait for abstracting save/load of state blobs
/// Platform-specific implementations should provide this
pub trait StateStorage {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Save a state blob
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be saved.
    fn save_state(&self, slot: &str, blob: &serde_json::Value) -> Result<(), Self::Error>;

    /// Load a state blob
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be loaded.
    fn load_state(&self, slot: &str) -> Result<Option<serde_json::Value>, Self::Error>;

    /// Delete a saved blob
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be deleted.
    fn delete_state(&self, slot: &str) -> Result<(), Self::Error>;
}

/// Creates sessions from loaded rules and persists their state
pub struct GachaEngine<L, S>
where
    L: RulesLoader,
    S: StateStorage,
{
    rules_loader: L,
    storage: S,
}

impl<L, S> GachaEngine<L, S>
where
    L: RulesLoader,
    S: StateStorage,
{
    /// Create a new engine with the provided loader and storage
    pub const fn new(rules_loader: L, storage: S) -> Self {
        Self {
            rules_loader,
            storage,
        }
    }

    /// Load and validate the rule book.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails or the book is invalid.
    pub fn rule_book(&self) -> Result<RuleBook, anyhow::Error> {
        let book = self.rules_loader.load_rule_book()?;
        book.validate()?;
        Ok(book)
    }

    /// Open a session for a category token.
    ///
    /// # Errors
    ///
    /// Returns an error if the rules cannot be loaded or no category applies.
    pub fn create_session<R: RollSource>(
        &self,
        token: &str,
        rolls: R,
    ) -> Result<PullSession<R>, anyhow::Error> {
        let book = self.rule_book()?;
        Ok(PullSession::new(&book, token, rolls)?)
    }

    /// Save a session's state under `slot`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be serialized or stored.
    pub fn save_session<R: RollSource>(
        &self,
        slot: &str,
        session: &PullSession<R>,
    ) -> Result<(), anyhow::Error> {
        let blob = serde_json::to_value(session.state())?;
        self.storage.save_state(slot, &blob)?;
        Ok(())
    }

    /// Restore the blob in `slot` into `session` through the lenient import.
    ///
    /// Returns `None` when nothing is saved under `slot`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the storage itself fails.
    pub fn restore_session<R: RollSource>(
        &self,
        slot: &str,
        session: &mut PullSession<R>,
    ) -> Result<Option<ImportReport>, S::Error> {
        Ok(self
            .storage
            .load_state(slot)?
            .map(|blob| session.import_state(&blob)))
    }

    /// Delete a saved slot
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be deleted.
    pub fn delete_save(&self, slot: &str) -> Result<(), S::Error> {
        self.storage.delete_state(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct MemoryStorage {
        saves: Rc<RefCell<HashMap<String, serde_json::Value>>>,
    }

    impl StateStorage for MemoryStorage {
        type Error = Infallible;

        fn save_state(&self, slot: &str, blob: &serde_json::Value) -> Result<(), Self::Error> {
            self.saves
                .borrow_mut()
                .insert(slot.to_string(), blob.clone());
            Ok(())
        }

        fn load_state(&self, slot: &str) -> Result<Option<serde_json::Value>, Self::Error> {
            Ok(self.saves.borrow().get(slot).cloned())
        }

        fn delete_state(&self, slot: &str) -> Result<(), Self::Error> {
            self.saves.borrow_mut().remove(slot);
            Ok(())
        }
    }

    #[test]
    fn engine_creates_and_roundtrips_state() {
        let engine = GachaEngine::new(BundledRules, MemoryStorage::default());
        let mut session = engine
            .create_session("event", SeededRolls::from_user_seed(0xABCD, b"pull"))
            .unwrap();
        session.pull_many(45).unwrap();
        engine.save_session("slot-one", &session).unwrap();

        let mut restored = engine
            .create_session("limited", SeededRolls::from_user_seed(1, b"pull"))
            .unwrap();
        let report = engine
            .restore_session("slot-one", &mut restored)
            .unwrap()
            .expect("save exists");
        assert!(report.is_clean());
        assert_eq!(restored.state(), session.state());
        assert!(
            engine
                .restore_session("missing-slot", &mut restored)
                .unwrap()
                .is_none()
        );

        engine.delete_save("slot-one").unwrap();
        assert!(
            engine
                .restore_session("slot-one", &mut restored)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn partial_saves_restore_with_defaults() {
        let storage = MemoryStorage::default();
        storage
            .save_state("old", &json!({ "total_draws": 61, "unlocked_one_time": ["free_batch"] }))
            .unwrap();
        let engine = GachaEngine::new(BundledRules, storage);
        let mut session = engine
            .create_session("limited", ScriptedRolls::constant(0.5))
            .unwrap();
        let report = engine.restore_session("old", &mut session).unwrap().unwrap();
        assert!(report.is_clean());
        assert_eq!(session.state().progress.total_draws, 61);
        assert!(session.state().unlocked_one_time.contains("info_item"));
        assert_eq!(session.state().progress.top_tier_pity, 0);
    }
}

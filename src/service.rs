//! Store handle exposing the draft mutation API
use super::config::StoreConfig;
use super::draft::DraftState;
use super::error::DraftError;
use super::meal_box::MealBoxProgress;
use super::storage::{DraftStorage, Dirty, RecordWrite, WriteOutcome};
use super::types::{CartLineItem, ItemId, ServiceCategory, TimeStamp};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PersistenceStatus {
    #[default]
    Healthy,
    /// The last write failed. The in-memory draft is still usable but may not
    /// survive a restart.
    Degraded { last_error: String },
}

/// Owner of the shopper's draft. Construct once at startup and hand it to the
/// screens that need it.
///
/// Mutations never fail from the caller's point of view. Storage problems are
/// logged and surfaced through [`OrderDraftStore::persistence_status`].
pub struct OrderDraftStore {
    state: DraftState,
    storage: DraftStorage,
    status: PersistenceStatus,
    cart_saved_at: Option<TimeStamp<Utc>>,
    meal_box_saved_at: Option<TimeStamp<Utc>>,
}

impl OrderDraftStore {
    /// Hydrate from an already open database
    pub fn new(instance: Arc<sled::Db>) -> Self {
        let storage = DraftStorage::new(instance);
        let hydrated = storage.load();

        let mut store = Self {
            state: hydrated.state,
            storage,
            status: PersistenceStatus::Healthy,
            cart_saved_at: hydrated.cart_saved_at,
            meal_box_saved_at: hydrated.meal_box_saved_at,
        };
        if hydrated.repairs.any() {
            store.persist(hydrated.repairs);
        }

        store
    }

    pub fn open(config: &StoreConfig) -> anyhow::Result<Self> {
        let db = config.open()?;
        Ok(Self::new(Arc::new(db)))
    }

    // Reads

    /// Borrowed view. The state can only change through the methods below.
    pub fn state(&self) -> &DraftState {
        &self.state
    }
    pub fn snapshot(&self) -> DraftState {
        self.state.clone()
    }
    pub fn active_category(&self) -> Option<ServiceCategory> {
        self.state.active_category()
    }
    pub fn cart(&self) -> &[CartLineItem] {
        self.state.cart()
    }
    pub fn meal_box_progress(&self) -> Option<&MealBoxProgress> {
        self.state.meal_box_progress()
    }
    pub fn draft_id(&self) -> Option<&str> {
        self.state.draft_id()
    }
    pub fn get_quantity(&self, item_id: ItemId) -> u32 {
        self.state.get_quantity(item_id)
    }
    pub fn has_pending_progress(&self, category: ServiceCategory) -> bool {
        self.state.has_pending_progress(category)
    }
    pub fn item_count(&self) -> u64 {
        self.state.item_count()
    }
    pub fn subtotal(&self) -> Decimal {
        self.state.subtotal()
    }
    pub fn cart_saved_at(&self) -> Option<DateTime<Utc>> {
        self.cart_saved_at.as_ref().map(|at| at.to_datetime_utc())
    }
    pub fn meal_box_saved_at(&self) -> Option<DateTime<Utc>> {
        self.meal_box_saved_at.as_ref().map(|at| at.to_datetime_utc())
    }
    pub fn persistence_status(&self) -> &PersistenceStatus {
        &self.status
    }

    // Mutations

    pub fn enter_category(&mut self, category: ServiceCategory) {
        tracing::debug!(%category, "enter category");
        self.apply(|state| state.with_category_entered(category), false);
    }

    pub fn add_to_cart(&mut self, category: ServiceCategory, item: CartLineItem) {
        tracing::debug!(
            %category,
            item_id = %item.id,
            quantity = item.quantity,
            draft_id = ?self.state.draft_id(),
            "add to cart"
        );
        if item.quantity == 0 {
            tracing::debug!(item_id = %item.id, "ignoring add with zero quantity");
        }
        self.apply(|state| state.with_item_added(category, item), false);
    }

    pub fn remove_from_cart(&mut self, item_id: ItemId) {
        tracing::debug!(%item_id, draft_id = ?self.state.draft_id(), "remove from cart");
        self.apply(|state| state.with_item_removed(item_id), false);
    }

    /// Absolute set. A quantity of zero removes the line.
    pub fn update_quantity(&mut self, item_id: ItemId, quantity: u32) {
        tracing::debug!(%item_id, quantity, draft_id = ?self.state.draft_id(), "update quantity");
        self.apply(|state| state.with_quantity_set(item_id, quantity), false);
    }

    /// Empties the cart and rewrites its record even if nothing changed in memory.
    ///
    /// With meal-box progress saved, the category stays `MealBox` and the cart
    /// record is kept (empty) instead of deleted.
    pub fn clear_cart(&mut self) {
        tracing::debug!(draft_id = ?self.state.draft_id(), "clear cart");
        self.apply(DraftState::with_cart_cleared, true);
    }

    pub fn save_meal_box_progress(&mut self, progress: MealBoxProgress) {
        tracing::debug!(step = progress.current_step, "save meal-box progress");
        self.apply(|state| state.with_meal_box_progress(progress), false);
    }

    pub fn clear_meal_box_progress(&mut self) {
        tracing::debug!("clear meal-box progress");
        self.apply(DraftState::without_meal_box_progress, false);
    }

    /// Push pending writes to disk, e.g. when the app is backgrounded
    pub fn flush(&self) -> anyhow::Result<()> {
        self.storage.flush()?;
        Ok(())
    }

    // Run one full transition, then mirror it to disk.
    fn apply(&mut self, transition: impl FnOnce(DraftState) -> DraftState, force_cart: bool) {
        let previous = self.state.clone();
        let next = transition(std::mem::take(&mut self.state));
        debug_assert!(next.check_invariants().is_ok(), "{:?}", next.check_invariants());

        let mut dirty = Dirty::between(&previous, &next);
        dirty.cart |= force_cart;
        self.state = next;

        if dirty.any() {
            self.persist(dirty);
        }
    }

    fn persist(&mut self, dirty: Dirty) {
        let result = self.storage.write(&self.state, dirty);
        self.record_outcome(result);
    }

    fn record_outcome(&mut self, result: Result<WriteOutcome, DraftError>) {
        match result {
            Ok(outcome) => {
                apply_write(&mut self.cart_saved_at, outcome.cart);
                apply_write(&mut self.meal_box_saved_at, outcome.meal_box);
                self.status = PersistenceStatus::Healthy;
            }
            Err(err) => {
                tracing::warn!(%err, "draft not persisted, keeping in-memory state");
                self.status = PersistenceStatus::Degraded {
                    last_error: err.to_string(),
                };
            }
        }
    }
}

fn apply_write(saved_at: &mut Option<TimeStamp<Utc>>, write: RecordWrite) {
    match write {
        RecordWrite::Unchanged => {}
        RecordWrite::Saved(at) => *saved_at = Some(at),
        RecordWrite::Deleted => *saved_at = None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ACTIVE_CART_KEY;
    use crate::types::Price;

    fn store() -> (Arc<sled::Db>, OrderDraftStore) {
        let db = Arc::new(sled::Config::new().temporary(true).open().unwrap());
        let store = OrderDraftStore::new(db.clone());
        (db, store)
    }

    #[test]
    fn fresh_store_is_empty_and_healthy() {
        let (_db, store) = store();

        assert_eq!(store.active_category(), None);
        assert!(store.cart().is_empty());
        assert!(store.cart_saved_at().is_none());
        assert_eq!(store.persistence_status(), &PersistenceStatus::Healthy);
    }

    #[test]
    fn mutations_stamp_save_time() {
        let (db, mut store) = store();
        store.add_to_cart(
            ServiceCategory::BulkMeals,
            CartLineItem::new(1, "Veg Pulao Tray", Price::from_minor(45_00), 2),
        );

        assert!(store.cart_saved_at().is_some());
        assert!(db.contains_key(ACTIVE_CART_KEY).unwrap());

        store.remove_from_cart(ItemId(1));
        assert!(store.cart_saved_at().is_none());
        assert!(!db.contains_key(ACTIVE_CART_KEY).unwrap());
    }

    #[test]
    fn snapshot_is_detached() {
        let (_db, mut store) = store();
        store.add_to_cart(
            ServiceCategory::BulkMeals,
            CartLineItem::new(1, "Veg Pulao Tray", Price::from_minor(45_00), 2),
        );

        let snapshot = store.snapshot();
        store.clear_cart();

        assert_eq!(snapshot.get_quantity(ItemId(1)), 2);
        assert_eq!(store.get_quantity(ItemId(1)), 0);
    }

    #[test]
    fn failed_write_degrades_then_recovers() {
        let (_db, mut store) = store();
        store.add_to_cart(
            ServiceCategory::Catering,
            CartLineItem::new(4, "Samosa Platter", Price::from_minor(18_00), 3),
        );
        let before = store.snapshot();
        let saved_at = store.cart_saved_at();

        store.record_outcome(Err(DraftError::Encode("disk full".into())));

        match store.persistence_status() {
            PersistenceStatus::Degraded { last_error } => assert!(last_error.contains("disk full")),
            other => panic!("expected degraded status, got {other:?}"),
        }
        assert_eq!(store.snapshot(), before);
        assert_eq!(store.cart_saved_at(), saved_at);

        let at = TimeStamp::new();
        store.record_outcome(Ok(WriteOutcome {
            cart: RecordWrite::Saved(at.clone()),
            meal_box: RecordWrite::Unchanged,
        }));

        assert_eq!(store.persistence_status(), &PersistenceStatus::Healthy);
        assert_eq!(store.cart_saved_at(), Some(at.to_datetime_utc()));
        assert_eq!(store.snapshot(), before);
    }
}

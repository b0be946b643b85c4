//! Property-based tests for the draft state machine and its persistence
//!
//! Random sequences of shopper actions are replayed against the pure
//! `DraftState` transitions and against a sled-backed `OrderDraftStore`. The
//! structural invariants must hold after every single call, and a store
//! reloaded from the same database must see exactly what the live one holds.
//!
//! What these tests DON'T cover (deliberately):
//!
//! - Storage write failures (sled can't be made to fail on demand; the
//!   status handling is unit tested in src/service.rs)
//! - Restart across processes (tests/scenarios.rs reopens by path)

use order_draft::{
    draft::DraftState,
    meal_box::{DietaryPreference, MealBoxProgress, PortionCount},
    storage::{ACTIVE_CART_KEY, MEAL_BOX_PROGRESS_KEY},
    CartLineItem, ItemId, OrderDraftStore, Price, ServiceCategory,
};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Action {
    Enter(ServiceCategory),
    Add(ServiceCategory, u64, u32),
    Remove(u64),
    Update(u64, u32),
    ClearCart,
    SaveProgress(u32),
    ClearProgress,
}

fn category_strategy() -> impl Strategy<Value = ServiceCategory> {
    prop::sample::select(ServiceCategory::ALL.to_vec())
}

/// Small id space so adds, removes and updates actually collide
fn item_id_strategy() -> impl Strategy<Value = u64> {
    1u64..=5
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        category_strategy().prop_map(Action::Enter),
        (category_strategy(), item_id_strategy(), 0u32..=4)
            .prop_map(|(category, id, quantity)| Action::Add(category, id, quantity)),
        item_id_strategy().prop_map(Action::Remove),
        (item_id_strategy(), 0u32..=6).prop_map(|(id, quantity)| Action::Update(id, quantity)),
        Just(Action::ClearCart),
        (1u32..=4).prop_map(Action::SaveProgress),
        Just(Action::ClearProgress),
    ]
}

fn line(id: u64, quantity: u32) -> CartLineItem {
    let price = Price::from_minor(id as i64 * 1_50);
    CartLineItem::new(id, format!("dish {id}"), price, quantity)
}

fn progress(step: u32) -> MealBoxProgress {
    MealBoxProgress::new(PortionCount::Six, DietaryPreference::Egg).at_step(step)
}

fn apply_to_state(state: DraftState, action: &Action) -> DraftState {
    match *action {
        Action::Enter(category) => state.with_category_entered(category),
        Action::Add(category, id, quantity) => state.with_item_added(category, line(id, quantity)),
        Action::Remove(id) => state.with_item_removed(ItemId(id)),
        Action::Update(id, quantity) => state.with_quantity_set(ItemId(id), quantity),
        Action::ClearCart => state.with_cart_cleared(),
        Action::SaveProgress(step) => state.with_meal_box_progress(progress(step)),
        Action::ClearProgress => state.without_meal_box_progress(),
    }
}

fn apply_to_store(store: &mut OrderDraftStore, action: &Action) {
    match *action {
        Action::Enter(category) => store.enter_category(category),
        Action::Add(category, id, quantity) => store.add_to_cart(category, line(id, quantity)),
        Action::Remove(id) => store.remove_from_cart(ItemId(id)),
        Action::Update(id, quantity) => store.update_quantity(ItemId(id), quantity),
        Action::ClearCart => store.clear_cart(),
        Action::SaveProgress(step) => store.save_meal_box_progress(progress(step)),
        Action::ClearProgress => store.clear_meal_box_progress(),
    }
}

proptest! {
    /// Property: the added-items index is exactly the set of cart ids, and
    /// there is never more than one line per id
    #[test]
    fn prop_added_items_mirror_cart(actions in prop::collection::vec(action_strategy(), 1..40)) {
        let mut state = DraftState::new();

        for action in &actions {
            state = apply_to_state(state, action);

            let ids: BTreeSet<ItemId> = state.cart().iter().map(|line| line.id).collect();
            prop_assert_eq!(&ids, state.added_items(), "mirror broke after {:?}", action);
            prop_assert_eq!(ids.len(), state.cart().len(), "duplicate line after {:?}", action);
        }
    }

    /// Property: no draft data exists without a category, and meal-box
    /// progress only exists under the meal-box category
    #[test]
    fn prop_category_invariants_hold(actions in prop::collection::vec(action_strategy(), 1..40)) {
        let mut state = DraftState::new();

        for action in &actions {
            state = apply_to_state(state, action);

            if state.active_category().is_none() {
                prop_assert!(state.cart().is_empty(), "cart without category after {:?}", action);
                prop_assert!(state.meal_box_progress().is_none(), "progress without category after {:?}", action);
                prop_assert!(state.draft_id().is_none(), "draft id without category after {:?}", action);
            }
            if state.meal_box_progress().is_some() {
                prop_assert_eq!(state.active_category(), Some(ServiceCategory::MealBox));
            }
            prop_assert!(state.cart().iter().all(|line| line.quantity > 0));
            prop_assert_eq!(state.check_invariants(), Ok(()));
        }
    }

    /// Property: adding the same item twice under one category sums quantities
    #[test]
    fn prop_same_category_adds_merge(
        category in category_strategy(),
        id in item_id_strategy(),
        first in 1u32..100,
        second in 1u32..100,
    ) {
        let state = DraftState::new()
            .with_item_added(category, line(id, first))
            .with_item_added(category, line(id, second));

        prop_assert_eq!(state.cart().len(), 1);
        prop_assert_eq!(state.get_quantity(ItemId(id)), first + second);
    }

    /// Property: an add under a different category leaves a one-line cart
    #[test]
    fn prop_cross_category_add_seeds_single_line(
        actions in prop::collection::vec(action_strategy(), 0..20),
        category in category_strategy(),
        id in item_id_strategy(),
        quantity in 1u32..10,
    ) {
        let mut state = DraftState::new();
        for action in &actions {
            state = apply_to_state(state, action);
        }
        prop_assume!(state.active_category().is_some_and(|active| active != category));

        let state = state.with_item_added(category, line(id, quantity));

        let expected = vec![line(id, quantity)];
        prop_assert_eq!(state.cart(), expected.as_slice());
        prop_assert_eq!(state.active_category(), Some(category));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: the records on disk always describe the live state
    ///
    /// After every call the cart key exists iff there is a category or a
    /// line, the meal-box key exists iff there is progress, and a second
    /// store hydrated from the same database sees an identical state.
    #[test]
    fn prop_store_matches_reload(actions in prop::collection::vec(action_strategy(), 1..25)) {
        let db = Arc::new(sled::Config::new().temporary(true).open().unwrap());
        let mut store = OrderDraftStore::new(db.clone());

        for action in &actions {
            apply_to_store(&mut store, action);

            let expects_cart = store.active_category().is_some() || !store.cart().is_empty();
            prop_assert_eq!(db.contains_key(ACTIVE_CART_KEY).unwrap(), expects_cart);
            prop_assert_eq!(
                db.contains_key(MEAL_BOX_PROGRESS_KEY).unwrap(),
                store.meal_box_progress().is_some()
            );
        }

        let reloaded = OrderDraftStore::new(db.clone());
        prop_assert_eq!(reloaded.snapshot(), store.snapshot());
    }
}

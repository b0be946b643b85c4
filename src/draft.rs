//! Draft state and the category exclusivity policy.
//!
//! `DraftState` is a plain value. Every transition consumes the current state
//! and returns the next one, so a caller only ever observes a state that went
//! through a full transition.
use super::error::DraftError;
use super::meal_box::MealBoxProgress;
use super::types::{CartLineItem, ItemId, ServiceCategory};
use super::utils;
use rust_decimal::Decimal;
use std::collections::BTreeSet;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("Added-items index does not match the cart ids")]
    MirrorOutOfSync,
    #[error("Cart holds the same item id more than once")]
    DuplicateLineItem,
    #[error("Draft data present without an active category")]
    CategorylessDraft,
    #[error("Meal-box progress present while another category is active")]
    ProgressOutsideMealBox,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftState {
    active_category: Option<ServiceCategory>,
    cart: Vec<CartLineItem>,
    added_items: BTreeSet<ItemId>, // mirror of cart ids
    meal_box_progress: Option<MealBoxProgress>,
    draft_id: Option<String>,
}

impl DraftState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a state from persisted parts, repairing what can be repaired.
    ///
    /// Duplicate ids are merged and zero-quantity lines dropped. Anything that
    /// still breaks the invariants is reported so the caller can discard it.
    pub fn from_records(
        active_category: Option<ServiceCategory>,
        cart: Vec<CartLineItem>,
        draft_id: Option<String>,
        meal_box_progress: Option<MealBoxProgress>,
    ) -> Result<Self, InvariantViolation> {
        let mut merged: Vec<CartLineItem> = Vec::with_capacity(cart.len());
        for line in cart.into_iter().filter(|line| line.quantity > 0) {
            match merged.iter_mut().find(|existing| existing.id == line.id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(line.quantity)
                }
                None => merged.push(line),
            }
        }

        let active_category = match (active_category, &meal_box_progress) {
            // progress alone still implies the meal-box flow owns the draft
            (None, Some(_)) if merged.is_empty() => Some(ServiceCategory::MealBox),
            (None, _) if !merged.is_empty() => return Err(InvariantViolation::CategorylessDraft),
            (Some(category), Some(_)) if category != ServiceCategory::MealBox => {
                return Err(InvariantViolation::ProgressOutsideMealBox);
            }
            (category, _) => category,
        };

        let state = Self {
            active_category,
            added_items: merged.iter().map(|line| line.id).collect(),
            cart: merged,
            meal_box_progress,
            draft_id: active_category.and(draft_id),
        };
        state.check_invariants()?;

        Ok(state)
    }

    pub fn active_category(&self) -> Option<ServiceCategory> {
        self.active_category
    }
    pub fn cart(&self) -> &[CartLineItem] {
        &self.cart
    }
    pub fn added_items(&self) -> &BTreeSet<ItemId> {
        &self.added_items
    }
    pub fn meal_box_progress(&self) -> Option<&MealBoxProgress> {
        self.meal_box_progress.as_ref()
    }
    /// Id of the live draft, minted when a category is first adopted
    pub fn draft_id(&self) -> Option<&str> {
        self.draft_id.as_deref()
    }

    pub fn contains(&self, item_id: ItemId) -> bool {
        self.added_items.contains(&item_id)
    }

    /// Quantity of `item_id` in the cart, zero when absent
    pub fn get_quantity(&self, item_id: ItemId) -> u32 {
        self.cart
            .iter()
            .find(|line| line.id == item_id)
            .map_or(0, |line| line.quantity)
    }

    /// Whether a "resume your order" banner should be offered for `category`.
    ///
    /// Bulk meals are judged by cart contents, the meal box by wizard depth.
    /// Catering and corporate orders never keep a resumable draft.
    pub fn has_pending_progress(&self, category: ServiceCategory) -> bool {
        match category {
            ServiceCategory::BulkMeals => {
                !self.cart.is_empty() && self.active_category == Some(ServiceCategory::BulkMeals)
            }
            ServiceCategory::MealBox => self
                .meal_box_progress
                .as_ref()
                .is_some_and(MealBoxProgress::is_in_progress),
            ServiceCategory::Catering | ServiceCategory::Corporate => false,
        }
    }

    pub fn item_count(&self) -> u64 {
        self.cart.iter().map(|line| u64::from(line.quantity)).sum()
    }

    pub fn subtotal(&self) -> Decimal {
        self.cart.iter().map(CartLineItem::line_total).sum()
    }

    /// SHA-256 over the CBOR encoding of the category and cart lines.
    /// Checkout compares this against the value it priced to spot drift.
    pub fn cart_fingerprint(&self) -> Result<String, DraftError> {
        let contents = minicbor::to_vec((&self.active_category, &self.cart))?;

        Ok(sha256::digest(&contents))
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let ids: BTreeSet<ItemId> = self.cart.iter().map(|line| line.id).collect();
        if ids.len() != self.cart.len() {
            return Err(InvariantViolation::DuplicateLineItem);
        }
        if ids != self.added_items {
            return Err(InvariantViolation::MirrorOutOfSync);
        }
        if self.active_category.is_none()
            && (!self.cart.is_empty() || self.meal_box_progress.is_some())
        {
            return Err(InvariantViolation::CategorylessDraft);
        }
        if self.meal_box_progress.is_some()
            && self.active_category != Some(ServiceCategory::MealBox)
        {
            return Err(InvariantViolation::ProgressOutsideMealBox);
        }
        Ok(())
    }

    /// Shopper navigated to a category's landing screen.
    pub fn with_category_entered(self, category: ServiceCategory) -> Self {
        match self.active_category {
            Some(active) if active == category => self,
            Some(active) => self.purged(active).adopted(category),
            None => self.adopted(category),
        }
    }

    /// Shopper added a catalog item while possibly mid-draft.
    ///
    /// Switching category seeds a fresh single-item cart. Otherwise the item is
    /// merged by id, summing quantities. Zero quantities change nothing.
    pub fn with_item_added(mut self, category: ServiceCategory, item: CartLineItem) -> Self {
        if item.quantity == 0 {
            return self;
        }

        match self.active_category {
            Some(active) if active != category => {
                tracing::info!(from = %active, to = %category, "category switch replaced cart");
                if active == ServiceCategory::MealBox {
                    self.meal_box_progress = None;
                }
                self.added_items = BTreeSet::from([item.id]);
                self.cart = vec![item];
            }
            _ => {
                match self.cart.iter_mut().find(|line| line.id == item.id) {
                    Some(line) => line.quantity = line.quantity.saturating_add(item.quantity),
                    None => {
                        self.added_items.insert(item.id);
                        self.cart.push(item);
                    }
                }
            }
        }

        self.adopted(category)
    }

    pub fn with_item_removed(mut self, item_id: ItemId) -> Self {
        let before = self.cart.len();
        self.cart.retain(|line| line.id != item_id);
        if self.cart.len() == before {
            return self;
        }
        self.added_items.remove(&item_id);

        self.collapsed_if_empty()
    }

    /// Absolute set. Zero behaves as a removal.
    pub fn with_quantity_set(mut self, item_id: ItemId, quantity: u32) -> Self {
        if quantity == 0 {
            return self.with_item_removed(item_id);
        }
        if let Some(line) = self.cart.iter_mut().find(|line| line.id == item_id) {
            line.quantity = quantity;
        }
        self
    }

    /// Drops every line item. Meal-box progress is left alone.
    pub fn with_cart_cleared(mut self) -> Self {
        self.cart.clear();
        self.added_items.clear();
        self.collapsed_if_empty()
    }

    /// Wizard step saved. Adopts the meal box without purging anything.
    pub fn with_meal_box_progress(mut self, progress: MealBoxProgress) -> Self {
        self.meal_box_progress = Some(progress);
        self.adopted(ServiceCategory::MealBox)
    }

    pub fn without_meal_box_progress(mut self) -> Self {
        self.meal_box_progress = None;
        self
    }

    // discard whatever draft data `outgoing` owns before another category takes over
    fn purged(mut self, outgoing: ServiceCategory) -> Self {
        tracing::info!(category = %outgoing, "purging draft on category switch");
        match outgoing {
            ServiceCategory::BulkMeals => {
                self.cart.clear();
                self.added_items.clear();
            }
            ServiceCategory::MealBox => self.meal_box_progress = None,
            ServiceCategory::Catering | ServiceCategory::Corporate => {}
        }
        self
    }

    fn adopted(mut self, category: ServiceCategory) -> Self {
        if self.draft_id.is_none() {
            self.draft_id = utils::new_draft_id()
                .inspect_err(|err| tracing::warn!(%err, "draft started without an id"))
                .ok();
        }
        self.active_category = Some(category);
        self
    }

    // a cart-based draft with no items is no draft, unless the wizard still holds progress
    fn collapsed_if_empty(mut self) -> Self {
        if !self.cart.is_empty() {
            return self;
        }
        if self.meal_box_progress.is_some() {
            self.active_category = Some(ServiceCategory::MealBox);
        } else {
            self.active_category = None;
            self.draft_id = None;
        }
        self
    }
}

//! Meal-box wizard snapshot.
//!
//! The wizard always hands over the complete snapshot on each step save, so
//! there is no patch operation here, only constructors and read helpers.
use super::types::{ItemId, Price};
use std::collections::BTreeSet;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum PortionCount {
    #[n(0)]
    Three,
    #[n(1)]
    Five,
    #[n(2)]
    Six,
    #[n(3)]
    Eight,
}

impl PortionCount {
    /// Number of plate slots in one box of this size
    pub fn slots(&self) -> u8 {
        match self {
            PortionCount::Three => 3,
            PortionCount::Five => 5,
            PortionCount::Six => 6,
            PortionCount::Eight => 8,
        }
    }
}

impl TryFrom<u8> for PortionCount {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(PortionCount::Three),
            5 => Ok(PortionCount::Five),
            6 => Ok(PortionCount::Six),
            8 => Ok(PortionCount::Eight),
            other => Err(other),
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum DietaryPreference {
    #[n(0)]
    Veg,
    #[n(1)]
    Egg,
    #[n(2)]
    NonVeg,
}

/// Denormalised catalog entry kept so the wizard can render a slot without a fetch.
/// It's a cache: price and availability are re-read from the catalog at checkout.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct ItemSnapshot {
    #[n(0)]
    pub id: ItemId,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub price: Price,
    #[n(3)]
    pub rating: f32,
    #[n(4)]
    pub review_count: u32,
    #[n(5)]
    pub category: String,
    #[n(6)]
    pub kind: String,
    #[n(7)]
    pub image: Option<String>,
}

/// One plate slot within a wizard step
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct PortionSelection {
    #[n(0)]
    pub slot: u32,
    #[n(1)]
    pub item_id: Option<ItemId>,
    #[n(2)]
    pub item: Option<ItemSnapshot>,
}

impl PortionSelection {
    pub fn empty(slot: u32) -> Self {
        Self {
            slot,
            item_id: None,
            item: None,
        }
    }
    pub fn filled(slot: u32, item: ItemSnapshot) -> Self {
        Self {
            slot,
            item_id: Some(item.id),
            item: Some(item),
        }
    }
    pub fn is_filled(&self) -> bool {
        self.item_id.is_some()
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct MealBoxProgress {
    #[n(0)]
    pub current_step: u32,
    #[n(1)]
    pub selected_portions: PortionCount,
    #[n(2)]
    pub meal_preference: DietaryPreference,
    #[n(3)]
    pub selected_meal_type: String,
    // counts come straight from the wizard's text inputs
    #[n(4)]
    pub veg_boxes: String,
    #[n(5)]
    pub egg_boxes: String,
    #[n(6)]
    pub non_veg_boxes: String,
    #[n(7)]
    pub veg_plate_selections: Vec<PortionSelection>,
    #[n(8)]
    pub egg_plate_selections: Vec<PortionSelection>,
    #[n(9)]
    pub non_veg_plate_selections: Vec<PortionSelection>,
    #[n(10)]
    pub selected_addons: BTreeSet<String>,
    #[n(11)]
    pub current_dietary_tab: DietaryPreference,
}

impl MealBoxProgress {
    /// A fresh wizard sitting on its first step
    pub fn new(selected_portions: PortionCount, meal_preference: DietaryPreference) -> Self {
        Self {
            current_step: 1,
            selected_portions,
            meal_preference,
            selected_meal_type: String::new(),
            veg_boxes: String::new(),
            egg_boxes: String::new(),
            non_veg_boxes: String::new(),
            veg_plate_selections: Vec::new(),
            egg_plate_selections: Vec::new(),
            non_veg_plate_selections: Vec::new(),
            selected_addons: BTreeSet::new(),
            current_dietary_tab: meal_preference,
        }
    }
    pub fn at_step(mut self, step: u32) -> Self {
        self.current_step = step;
        self
    }
    /// Step 1 is only the landing screen; nothing there is worth resuming.
    pub fn is_in_progress(&self) -> bool {
        self.current_step > 1
    }
    /// Parsed box count for a preference. Blank or garbage input counts as zero.
    pub fn box_count(&self, preference: DietaryPreference) -> u32 {
        let raw = match preference {
            DietaryPreference::Veg => &self.veg_boxes,
            DietaryPreference::Egg => &self.egg_boxes,
            DietaryPreference::NonVeg => &self.non_veg_boxes,
        };
        raw.trim().parse().unwrap_or(0)
    }
    pub fn total_boxes(&self) -> u32 {
        [
            DietaryPreference::Veg,
            DietaryPreference::Egg,
            DietaryPreference::NonVeg,
        ]
        .into_iter()
        .map(|preference| self.box_count(preference))
        .sum()
    }
    pub fn plate_selections(&self, preference: DietaryPreference) -> &[PortionSelection] {
        match preference {
            DietaryPreference::Veg => &self.veg_plate_selections,
            DietaryPreference::Egg => &self.egg_plate_selections,
            DietaryPreference::NonVeg => &self.non_veg_plate_selections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_count_is_lenient() {
        let mut progress = MealBoxProgress::new(PortionCount::Five, DietaryPreference::Veg);
        progress.veg_boxes = " 4 ".into();
        progress.egg_boxes = "".into();
        progress.non_veg_boxes = "two".into();

        assert_eq!(progress.box_count(DietaryPreference::Veg), 4);
        assert_eq!(progress.box_count(DietaryPreference::Egg), 0);
        assert_eq!(progress.box_count(DietaryPreference::NonVeg), 0);
        assert_eq!(progress.total_boxes(), 4);
    }

    #[test]
    fn first_step_is_not_in_progress() {
        let progress = MealBoxProgress::new(PortionCount::Three, DietaryPreference::Egg);
        assert!(!progress.is_in_progress());
        assert!(progress.at_step(2).is_in_progress());
    }

    #[test]
    fn portion_count_accepts_only_box_sizes() {
        assert_eq!(PortionCount::try_from(6), Ok(PortionCount::Six));
        assert_eq!(PortionCount::try_from(4), Err(4));
        assert_eq!(PortionCount::Eight.slots(), 8);
    }

    #[test]
    fn filled_slot_tracks_item_id() {
        let snapshot = ItemSnapshot {
            id: ItemId(31),
            name: "Dal Makhani".into(),
            price: Price::from_minor(3_00),
            rating: 4.5,
            review_count: 120,
            category: "curry".into(),
            kind: "veg".into(),
            image: None,
        };
        let slot = PortionSelection::filled(2, snapshot);
        assert!(slot.is_filled());
        assert_eq!(slot.item_id, Some(ItemId(31)));
        assert!(!PortionSelection::empty(0).is_filled());
    }
}

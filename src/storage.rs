//! Durable mirror of the draft state.
//!
//! Two records live in the sled default tree, one for the active cart and one
//! for the meal-box wizard. A record is present only while it holds something;
//! an absent key means "no draft". This layer never decides policy, it writes
//! whatever `DraftState` it is handed.
use super::draft::{DraftState, InvariantViolation};
use super::error::DraftError;
use super::meal_box::MealBoxProgress;
use super::types::{CartLineItem, ServiceCategory, TimeStamp};
use chrono::Utc;
use sled::Batch;
use std::sync::Arc;

// Changing either key silently drops every draft saved by older builds.
pub const ACTIVE_CART_KEY: &str = "order_draft/active_cart";
pub const MEAL_BOX_PROGRESS_KEY: &str = "order_draft/meal_box_progress";

pub const RECORD_VERSION: u16 = 1;

// Leading fields shared by every record, decoded first to check the version.
#[derive(minicbor::Decode, Debug)]
struct RecordHeader {
    #[n(0)]
    version: u16,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug)]
struct CartRecord {
    #[n(0)]
    version: u16,
    #[n(1)]
    saved_at: TimeStamp<Utc>,
    #[n(2)]
    active_category: Option<ServiceCategory>,
    #[n(3)]
    cart: Vec<CartLineItem>,
    #[n(4)]
    draft_id: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug)]
struct MealBoxRecord {
    #[n(0)]
    version: u16,
    #[n(1)]
    saved_at: TimeStamp<Utc>,
    #[n(2)]
    progress: MealBoxProgress,
}

/// Which records a transition touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dirty {
    pub cart: bool,
    pub meal_box: bool,
}

impl Dirty {
    pub fn between(previous: &DraftState, next: &DraftState) -> Self {
        Self {
            cart: previous.active_category() != next.active_category()
                || previous.cart() != next.cart()
                || previous.draft_id() != next.draft_id(),
            meal_box: previous.meal_box_progress() != next.meal_box_progress(),
        }
    }
    pub fn any(&self) -> bool {
        self.cart || self.meal_box
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordWrite {
    Unchanged,
    Saved(TimeStamp<Utc>),
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub cart: RecordWrite,
    pub meal_box: RecordWrite,
}

/// What came back from disk at startup
#[derive(Debug, Default)]
pub struct Hydrated {
    pub state: DraftState,
    pub cart_saved_at: Option<TimeStamp<Utc>>,
    pub meal_box_saved_at: Option<TimeStamp<Utc>>,
    /// Records that no longer match `state` and must be rewritten
    pub repairs: Dirty,
}

pub struct DraftStorage {
    instance: Arc<sled::Db>,
}

impl DraftStorage {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }

    /// Read both records. Anything unreadable or inconsistent is logged,
    /// removed from disk and replaced by the empty default. Never fails.
    pub fn load(&self) -> Hydrated {
        let cart = self
            .read_record::<CartRecord>(ACTIVE_CART_KEY)
            .unwrap_or_else(|err| {
                tracing::warn!(%err, "discarding unreadable cart record");
                self.discard(ACTIVE_CART_KEY);
                None
            });
        let meal_box = self
            .read_record::<MealBoxRecord>(MEAL_BOX_PROGRESS_KEY)
            .unwrap_or_else(|err| {
                tracing::warn!(%err, "discarding unreadable meal-box record");
                self.discard(MEAL_BOX_PROGRESS_KEY);
                None
            });

        let hydrated = self.reconcile(cart, meal_box);
        tracing::info!(
            category = ?hydrated.state.active_category(),
            lines = hydrated.state.cart().len(),
            meal_box = hydrated.state.meal_box_progress().is_some(),
            "draft state hydrated"
        );

        hydrated
    }

    /// Mirror the dirty parts of `state` to disk in one batch.
    pub fn write(&self, state: &DraftState, dirty: Dirty) -> Result<WriteOutcome, DraftError> {
        let mut batch = Batch::default();
        let mut outcome = WriteOutcome {
            cart: RecordWrite::Unchanged,
            meal_box: RecordWrite::Unchanged,
        };

        if dirty.cart {
            if state.active_category().is_some() || !state.cart().is_empty() {
                let saved_at = TimeStamp::new();
                let record = CartRecord {
                    version: RECORD_VERSION,
                    saved_at: saved_at.clone(),
                    active_category: state.active_category(),
                    cart: state.cart().to_vec(),
                    draft_id: state.draft_id().map(str::to_owned),
                };
                batch.insert(ACTIVE_CART_KEY, minicbor::to_vec(&record)?);
                outcome.cart = RecordWrite::Saved(saved_at);
            } else {
                batch.remove(ACTIVE_CART_KEY);
                outcome.cart = RecordWrite::Deleted;
            }
        }

        if dirty.meal_box {
            match state.meal_box_progress() {
                Some(progress) => {
                    let saved_at = TimeStamp::new();
                    let record = MealBoxRecord {
                        version: RECORD_VERSION,
                        saved_at: saved_at.clone(),
                        progress: progress.clone(),
                    };
                    batch.insert(MEAL_BOX_PROGRESS_KEY, minicbor::to_vec(&record)?);
                    outcome.meal_box = RecordWrite::Saved(saved_at);
                }
                None => {
                    batch.remove(MEAL_BOX_PROGRESS_KEY);
                    outcome.meal_box = RecordWrite::Deleted;
                }
            }
        }

        self.instance.apply_batch(batch)?;

        Ok(outcome)
    }

    pub fn has_record(&self, key: &str) -> Result<bool, DraftError> {
        Ok(self.instance.contains_key(key)?)
    }

    pub fn flush(&self) -> Result<usize, DraftError> {
        Ok(self.instance.flush()?)
    }

    fn read_record<T>(&self, key: &str) -> Result<Option<T>, DraftError>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        let Some(bytes) = self.instance.get(key)? else {
            return Ok(None);
        };

        let header: RecordHeader = minicbor::decode(&bytes).map_err(|source| DraftError::Decode {
            key: key.to_string(),
            source,
        })?;
        if header.version != RECORD_VERSION {
            return Err(DraftError::SchemaVersion {
                key: key.to_string(),
                found: header.version,
                expected: RECORD_VERSION,
            });
        }

        let record = minicbor::decode(&bytes).map_err(|source| DraftError::Decode {
            key: key.to_string(),
            source,
        })?;

        Ok(Some(record))
    }

    // the cart record names the category of record, so it wins any disagreement
    fn reconcile(&self, cart: Option<CartRecord>, meal_box: Option<MealBoxRecord>) -> Hydrated {
        let (active_category, lines, draft_id, mut cart_saved_at) = match cart {
            Some(record) => (
                record.active_category,
                record.cart,
                record.draft_id,
                Some(record.saved_at),
            ),
            None => (None, Vec::new(), None, None),
        };
        let (progress, mut meal_box_saved_at) = match meal_box {
            Some(record) => (Some(record.progress), Some(record.saved_at)),
            None => (None, None),
        };

        let state = match DraftState::from_records(
            active_category,
            lines.clone(),
            draft_id.clone(),
            progress.clone(),
        ) {
            Ok(state) => state,
            Err(violation @ InvariantViolation::ProgressOutsideMealBox) => {
                let err = DraftError::Malformed {
                    key: MEAL_BOX_PROGRESS_KEY.to_string(),
                    violation,
                };
                tracing::warn!(%err, category = ?active_category, "dropping meal-box record");
                self.discard(MEAL_BOX_PROGRESS_KEY);
                meal_box_saved_at = None;
                DraftState::from_records(active_category, lines.clone(), draft_id.clone(), None)
                    .unwrap_or_default()
            }
            Err(violation) => {
                let err = DraftError::Malformed {
                    key: ACTIVE_CART_KEY.to_string(),
                    violation,
                };
                tracing::warn!(%err, "dropping cart record");
                self.discard(ACTIVE_CART_KEY);
                cart_saved_at = None;
                DraftState::from_records(None, Vec::new(), None, progress.clone())
                    .unwrap_or_default()
            }
        };

        // whatever hydration changed has to reach disk, or the next restart
        // reads the unrepaired records again
        let repairs = Dirty {
            cart: state.active_category() != active_category
                || state.cart() != lines.as_slice()
                || state.draft_id() != draft_id.as_deref(),
            meal_box: state.meal_box_progress() != progress.as_ref(),
        };
        if repairs.any() {
            tracing::info!(?repairs, "hydrated draft differs from stored records");
        }

        Hydrated {
            state,
            cart_saved_at,
            meal_box_saved_at,
            repairs,
        }
    }

    fn discard(&self, key: &str) {
        if let Err(err) = self.instance.remove(key) {
            tracing::warn!(key, %err, "failed to remove record");
        }
    }
}

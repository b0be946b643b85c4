pub mod config;
pub mod draft;
pub mod error;
pub mod meal_box;
pub mod service;
pub mod storage;
pub mod types;
pub mod utils;

pub use draft::DraftState;
pub use service::{OrderDraftStore, PersistenceStatus};
pub use types::{CartLineItem, ItemId, Price, ServiceCategory};

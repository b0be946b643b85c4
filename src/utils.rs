//! Utility functions for identifiers

use super::error::DraftError;
use bech32::Bech32m;
use uuid7::uuid7;

pub const DRAFT_ID_HRP: &str = "draft";

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String, DraftError> {
    let hrp = bech32::Hrp::parse(hrp).map_err(|err| DraftError::DraftId(err.to_string()))?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|err| DraftError::DraftId(err.to_string()))?;
    Ok(encode)
}

/// Fresh draft id, e.g. `draft1...`
pub fn new_draft_id() -> Result<String, DraftError> {
    new_uuid_to_bech32(DRAFT_ID_HRP)
}

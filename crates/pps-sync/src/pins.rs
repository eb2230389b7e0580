use chrono::Utc;
use pps_core::{Candidate, PinnedSnapshot};
use pps_storage::{PinRepository, StoreError};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum PinError {
    #[error("sign in to pin candidates")]
    Unauthenticated,
    #[error("candidate has neither a local nor an ATS id")]
    Unkeyed,
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn pin_keys(candidate: &Candidate) -> Result<Vec<String>, PinError> {
    let keys = candidate.overlay_keys();
    if keys.is_empty() {
        return Err(PinError::Unkeyed);
    }
    Ok(keys)
}

/// Flips the viewer's pin on `candidate` and returns the new state.
///
/// Pinning records a snapshot so the pin survives the candidate dropping out
/// of both the canonical store and search results. Unpinning removes the flag
/// and snapshot together, leaving no residue.
pub fn toggle_pin(
    pins: &PinRepository,
    candidate: &Candidate,
    user_id: Option<&str>,
) -> Result<bool, PinError> {
    let user_id = user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(PinError::Unauthenticated)?;
    let keys = pin_keys(candidate)?;
    let snapshot = PinnedSnapshot::capture(candidate, Utc::now());
    let pinned = pins.toggle(user_id, &keys, snapshot)?;
    info!(user_id, key = %keys[0], pinned, "pin toggled");
    Ok(pinned)
}

/// Drives the pin to `desired`; a no-op when it is already there.
pub fn set_pin(
    pins: &PinRepository,
    candidate: &Candidate,
    user_id: Option<&str>,
    desired: bool,
) -> Result<bool, PinError> {
    let user = user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(PinError::Unauthenticated)?;
    let keys = pin_keys(candidate)?;
    if pins.is_pinned(user, &keys)? == desired {
        return Ok(desired);
    }
    toggle_pin(pins, candidate, user_id)
}

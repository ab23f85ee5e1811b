//! The request lifecycle state machine and the pure view derivation it
//! feeds. Everything here is a plain function of its inputs; the runtime in
//! the crate root wires these to the live snapshot feed.

use shared::domain::{
    DonationRequest, RequestRow, RequestSnapshot, RequestStatus, Role, UserId,
};

/// Maximum number of rows the summary (dashboard) view keeps, counted from
/// the end of the filtered sequence.
pub const SUMMARY_ROW_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAction {
    Accept,
    MarkReceived,
}

/// Applies a role-gated transition to a request. Returns the replacement
/// record for the full overwrite, or `None` when the guard rejects: wrong
/// role, wrong current status, or no role at all. `Received` is terminal and
/// no transition skips `Pending`.
pub fn apply(
    request: &DonationRequest,
    action: RequestAction,
    role: Option<Role>,
    actor: &UserId,
) -> Option<DonationRequest> {
    match (action, role, request.status) {
        (RequestAction::Accept, Some(Role::Volunteer), RequestStatus::Deliver) => {
            let mut updated = request.clone();
            updated.status = RequestStatus::Pending;
            updated.delivered_by = actor.clone();
            Some(updated)
        }
        (RequestAction::MarkReceived, Some(Role::Recipient), RequestStatus::Pending) => {
            let mut updated = request.clone();
            updated.status = RequestStatus::Received;
            updated.received_by = actor.clone();
            Some(updated)
        }
        _ => None,
    }
}

/// Derives the rows to display from a full snapshot. The summary view drops
/// `Received` rows and keeps the last [`SUMMARY_ROW_LIMIT`] of the rest,
/// preserving relative order; the full view is the snapshot unchanged.
pub fn derive_view(snapshot: &RequestSnapshot, summary_view: bool) -> Vec<RequestRow> {
    if !summary_view {
        return snapshot.clone();
    }

    let kept: Vec<RequestRow> = snapshot
        .iter()
        .filter(|row| row.request.status != RequestStatus::Received)
        .cloned()
        .collect();
    let skip = kept.len().saturating_sub(SUMMARY_ROW_LIMIT);
    kept.into_iter().skip(skip).collect()
}

/// Columns a presentation layer renders for a request row. The two fixed
/// subsets below are part of the controller's contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Title,
    Description,
    ExpirationDate,
    FoodType,
    FoodQuantity,
    FoodWeight,
    PickupDateTime,
}

impl Column {
    pub fn as_str(self) -> &'static str {
        match self {
            Column::Title => "title",
            Column::Description => "description",
            Column::ExpirationDate => "expirationDate",
            Column::FoodType => "foodType",
            Column::FoodQuantity => "foodQuantity",
            Column::FoodWeight => "foodWeight",
            Column::PickupDateTime => "pickupDateTime",
        }
    }
}

pub fn displayed_columns(summary_view: bool) -> &'static [Column] {
    const SUMMARY: &[Column] = &[
        Column::Title,
        Column::Description,
        Column::FoodType,
        Column::PickupDateTime,
    ];
    const FULL: &[Column] = &[
        Column::Title,
        Column::Description,
        Column::ExpirationDate,
        Column::FoodType,
        Column::FoodQuantity,
        Column::FoodWeight,
        Column::PickupDateTime,
    ];

    if summary_view {
        SUMMARY
    } else {
        FULL
    }
}

#[cfg(test)]
#[path = "tests/lifecycle_tests.rs"]
mod tests;

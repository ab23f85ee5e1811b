use super::*;
use shared::domain::{Location, RequestId};

fn request(status: RequestStatus) -> DonationRequest {
    DonationRequest {
        title: "Bread".into(),
        description: "Day-old loaves".into(),
        food_type: "Packaged Meals".into(),
        food_quantity: "10".into(),
        food_weight: "2kg".into(),
        expiration_date: "2024-06-01".into(),
        pickup_date_time: "2024-05-30T10:00".into(),
        location: Location::parse_input("12.9, 77.6"),
        donated_by: UserId::new("donor-1"),
        delivered_by: UserId::default(),
        received_by: UserId::default(),
        status,
        time: "2024-05-29T08:00:00Z".into(),
    }
}

fn row(id: &str, status: RequestStatus) -> RequestRow {
    RequestRow {
        request_id: RequestId::new(id),
        request: request(status),
    }
}

fn ids(rows: &[RequestRow]) -> Vec<&str> {
    rows.iter().map(|row| row.request_id.as_str()).collect()
}

#[test]
fn accept_requires_the_volunteer_role() {
    let record = request(RequestStatus::Deliver);
    let actor = UserId::new("v1");

    for role in [None, Some(Role::Donor), Some(Role::Recipient)] {
        assert_eq!(apply(&record, RequestAction::Accept, role, &actor), None);
    }

    let updated = apply(&record, RequestAction::Accept, Some(Role::Volunteer), &actor)
        .expect("volunteer accept");
    assert_eq!(updated.status, RequestStatus::Pending);
    assert_eq!(updated.delivered_by, actor);
    // Everything else survives the overwrite untouched.
    assert_eq!(updated.title, record.title);
    assert_eq!(updated.donated_by, record.donated_by);
    assert_eq!(updated.time, record.time);
}

#[test]
fn accept_only_applies_to_deliver_status() {
    let actor = UserId::new("v1");
    for status in [RequestStatus::Pending, RequestStatus::Received] {
        let record = request(status);
        assert_eq!(
            apply(&record, RequestAction::Accept, Some(Role::Volunteer), &actor),
            None
        );
    }
}

#[test]
fn mark_received_requires_recipient_on_pending() {
    let actor = UserId::new("r1");
    let pending = request(RequestStatus::Pending);

    for role in [None, Some(Role::Donor), Some(Role::Volunteer)] {
        assert_eq!(
            apply(&pending, RequestAction::MarkReceived, role, &actor),
            None
        );
    }
    assert_eq!(
        apply(
            &request(RequestStatus::Deliver),
            RequestAction::MarkReceived,
            Some(Role::Recipient),
            &actor
        ),
        None
    );

    let updated = apply(
        &pending,
        RequestAction::MarkReceived,
        Some(Role::Recipient),
        &actor,
    )
    .expect("recipient confirm");
    assert_eq!(updated.status, RequestStatus::Received);
    assert_eq!(updated.received_by, actor);
}

#[test]
fn received_is_terminal() {
    let actor = UserId::new("r1");
    let received = apply(
        &request(RequestStatus::Pending),
        RequestAction::MarkReceived,
        Some(Role::Recipient),
        &actor,
    )
    .expect("first confirm");

    // A second confirm finds no transition defined from `received`.
    assert_eq!(
        apply(
            &received,
            RequestAction::MarkReceived,
            Some(Role::Recipient),
            &actor
        ),
        None
    );
    assert_eq!(
        apply(
            &received,
            RequestAction::Accept,
            Some(Role::Volunteer),
            &actor
        ),
        None
    );
}

#[test]
fn full_view_is_the_snapshot_unchanged() {
    let snapshot = vec![
        row("r1", RequestStatus::Deliver),
        row("r2", RequestStatus::Received),
        row("r3", RequestStatus::Pending),
    ];
    assert_eq!(derive_view(&snapshot, false), snapshot);
}

#[test]
fn summary_view_excludes_received_and_keeps_order() {
    let snapshot = vec![
        row("r1", RequestStatus::Deliver),
        row("r2", RequestStatus::Received),
        row("r3", RequestStatus::Pending),
        row("r4", RequestStatus::Deliver),
        row("r5", RequestStatus::Pending),
        row("r6", RequestStatus::Deliver),
    ];

    let view = derive_view(&snapshot, true);
    assert_eq!(ids(&view), vec!["r1", "r3", "r4", "r5", "r6"]);
}

#[test]
fn summary_view_keeps_only_the_last_five() {
    let snapshot: Vec<RequestRow> = (1..=8)
        .map(|n| row(&format!("r{n}"), RequestStatus::Deliver))
        .collect();

    let view = derive_view(&snapshot, true);
    assert_eq!(ids(&view), vec!["r4", "r5", "r6", "r7", "r8"]);
}

#[test]
fn summary_view_filters_before_slicing() {
    // Received rows in the tail must not shrink the kept window.
    let snapshot = vec![
        row("r1", RequestStatus::Deliver),
        row("r2", RequestStatus::Deliver),
        row("r3", RequestStatus::Deliver),
        row("r4", RequestStatus::Deliver),
        row("r5", RequestStatus::Deliver),
        row("r6", RequestStatus::Received),
        row("r7", RequestStatus::Received),
    ];

    let view = derive_view(&snapshot, true);
    assert_eq!(ids(&view), vec!["r1", "r2", "r3", "r4", "r5"]);
}

#[test]
fn empty_snapshot_derives_empty_views() {
    assert!(derive_view(&Vec::new(), true).is_empty());
    assert!(derive_view(&Vec::new(), false).is_empty());
}

#[test]
fn column_subsets_are_fixed() {
    let summary: Vec<&str> = displayed_columns(true).iter().map(|c| c.as_str()).collect();
    assert_eq!(
        summary,
        vec!["title", "description", "foodType", "pickupDateTime"]
    );

    let full: Vec<&str> = displayed_columns(false).iter().map(|c| c.as_str()).collect();
    assert_eq!(
        full,
        vec![
            "title",
            "description",
            "expirationDate",
            "foodType",
            "foodQuantity",
            "foodWeight",
            "pickupDateTime"
        ]
    );
}

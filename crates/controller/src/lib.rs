use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::{
    sync::{broadcast, watch, RwLock},
    task::JoinHandle,
};
use tracing::{error, info, warn};

use shared::{
    domain::{
        DonationRequest, Location, RequestId, RequestRow, RequestSnapshot, RequestStatus, Role,
        UserId, UserProfile,
    },
    error::StoreError,
};
use storage::Storage;

pub mod lifecycle;

pub use lifecycle::{
    apply, derive_view, displayed_columns, Column, RequestAction, SUMMARY_ROW_LIMIT,
};

/// The live request store seam: full-snapshot reads, a push feed that
/// delivers the entire mapping on every mutation, generated-key creation,
/// and the status-conditional full overwrite.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn snapshot(&self) -> Result<RequestSnapshot, StoreError>;
    fn subscribe(&self) -> broadcast::Receiver<RequestSnapshot>;
    async fn create_request(&self, record: &DonationRequest) -> Result<RequestId, StoreError>;
    async fn overwrite_request_if_status(
        &self,
        request_id: &RequestId,
        expected: RequestStatus,
        record: &DonationRequest,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn profile(&self, user_id: &UserId) -> Result<Option<UserProfile>, StoreError>;
}

/// Sign-in state feed. The receiver holds the current user (delivered
/// immediately) and fires on every sign-in and sign-out.
pub trait IdentityProvider: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<Option<UserId>>;
}

#[async_trait]
impl RequestStore for Storage {
    async fn snapshot(&self) -> Result<RequestSnapshot, StoreError> {
        Storage::snapshot(self).await
    }

    fn subscribe(&self) -> broadcast::Receiver<RequestSnapshot> {
        Storage::subscribe(self)
    }

    async fn create_request(&self, record: &DonationRequest) -> Result<RequestId, StoreError> {
        Storage::create_request(self, record).await
    }

    async fn overwrite_request_if_status(
        &self,
        request_id: &RequestId,
        expected: RequestStatus,
        record: &DonationRequest,
    ) -> Result<(), StoreError> {
        Storage::overwrite_request_if_status(self, request_id, expected, record).await
    }
}

#[async_trait]
impl ProfileStore for Storage {
    async fn profile(&self, user_id: &UserId) -> Result<Option<UserProfile>, StoreError> {
        Storage::profile(self, user_id).await
    }
}

/// An identity provider driven by explicit `sign_in`/`sign_out` calls. Used
/// by tests and by hosts that bridge an external auth callback.
pub struct ManualIdentity {
    tx: watch::Sender<Option<UserId>>,
}

impl ManualIdentity {
    pub fn signed_out() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn signed_in(user_id: UserId) -> Self {
        let (tx, _) = watch::channel(Some(user_id));
        Self { tx }
    }

    pub fn sign_in(&self, user_id: UserId) {
        let _ = self.tx.send(Some(user_id));
    }

    pub fn sign_out(&self) {
        let _ = self.tx.send(None);
    }
}

impl IdentityProvider for ManualIdentity {
    fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.tx.subscribe()
    }
}

/// Result of an `accept` or `mark_received` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The transition was applied and the store confirmed the overwrite.
    Applied,
    /// The guard rejected the action (wrong role, wrong status, no user, or
    /// a write failure that was logged); the record is unchanged.
    Ignored,
    /// The conditional overwrite lost a race: the stored status no longer
    /// matched the one this client derived the transition from. The caller
    /// decides whether to retry against `actual` or refresh the view.
    Conflict { actual: RequestStatus },
}

/// Fields of the submission form. The location is parsed at input time via
/// [`Location::parse_input`], before this struct reaches the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestForm {
    pub title: String,
    pub description: String,
    pub location: Location,
    pub expiration_date: String,
    pub food_type: String,
    pub food_quantity: String,
    pub food_weight: String,
    pub pickup_date_time: String,
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    user_id: Option<UserId>,
    role: Option<Role>,
    display_name: Option<String>,
}

/// Derives view state from store snapshots, applies role-gated transitions,
/// and publishes the filtered/sliced table rows.
///
/// Both long-lived subscriptions (the snapshot feed and the sign-in feed)
/// are owned by the instance: acquired in [`RequestListingController::start`]
/// and released by [`RequestListingController::shutdown`] or on drop. After
/// any write the controller waits for the next snapshot push instead of
/// patching its local copy.
pub struct RequestListingController {
    request_store: Arc<dyn RequestStore>,
    summary_view: bool,
    session: Arc<RwLock<SessionState>>,
    latest: Arc<RwLock<RequestSnapshot>>,
    view_tx: Arc<watch::Sender<Vec<RequestRow>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl RequestListingController {
    pub async fn start(
        request_store: Arc<dyn RequestStore>,
        profile_store: Arc<dyn ProfileStore>,
        identity: &dyn IdentityProvider,
        summary_view: bool,
    ) -> Result<Self, StoreError> {
        // Subscribe before the initial read so no mutation between the two
        // can be missed.
        let mut snapshots = request_store.subscribe();
        let initial = request_store.snapshot().await?;

        let (view_tx, _) = watch::channel(lifecycle::derive_view(&initial, summary_view));
        let view_tx = Arc::new(view_tx);
        let latest = Arc::new(RwLock::new(initial));
        let session = Arc::new(RwLock::new(SessionState::default()));

        let snapshot_task = tokio::spawn({
            let store = Arc::clone(&request_store);
            let latest = Arc::clone(&latest);
            let view_tx = Arc::clone(&view_tx);
            async move {
                loop {
                    match snapshots.recv().await {
                        Ok(snapshot) => {
                            *latest.write().await = snapshot.clone();
                            // send_replace stores the value even with no
                            // receivers, so current_view() never goes stale.
                            view_tx.send_replace(lifecycle::derive_view(&snapshot, summary_view));
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "snapshot feed lagged; resyncing from the store");
                            match store.snapshot().await {
                                Ok(snapshot) => {
                                    *latest.write().await = snapshot.clone();
                                    view_tx
                                        .send_replace(lifecycle::derive_view(&snapshot, summary_view));
                                }
                                Err(err) => {
                                    error!("resync after lagged feed failed: {err}");
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });

        let mut auth = identity.subscribe();
        let initial_user = auth.borrow_and_update().clone();
        refresh_session(&session, profile_store.as_ref(), initial_user).await;

        let identity_task = tokio::spawn({
            let session = Arc::clone(&session);
            let profile_store = Arc::clone(&profile_store);
            async move {
                while auth.changed().await.is_ok() {
                    let current = auth.borrow_and_update().clone();
                    refresh_session(&session, profile_store.as_ref(), current).await;
                }
            }
        });

        Ok(Self {
            request_store,
            summary_view,
            session,
            latest,
            view_tx,
            tasks: vec![snapshot_task, identity_task],
        })
    }

    /// The derived table rows, updated on every snapshot push.
    pub fn subscribe_view(&self) -> watch::Receiver<Vec<RequestRow>> {
        self.view_tx.subscribe()
    }

    pub fn current_view(&self) -> Vec<RequestRow> {
        self.view_tx.borrow().clone()
    }

    pub fn displayed_columns(&self) -> &'static [Column] {
        lifecycle::displayed_columns(self.summary_view)
    }

    pub async fn user_id(&self) -> Option<UserId> {
        self.session.read().await.user_id.clone()
    }

    pub async fn role(&self) -> Option<Role> {
        self.session.read().await.role
    }

    /// First name from the profile with its first letter capitalized.
    pub async fn display_name(&self) -> Option<String> {
        self.session.read().await.display_name.clone()
    }

    /// Volunteer action: `deliver` → `pending`, recording the actor as the
    /// deliverer. A silent no-op for every other role or status.
    pub async fn accept(&self, request_id: &RequestId) -> TransitionOutcome {
        self.transition(request_id, RequestAction::Accept).await
    }

    /// Recipient action: `pending` → `received`, recording the actor as the
    /// receiver. A silent no-op for every other role or status.
    pub async fn mark_received(&self, request_id: &RequestId) -> TransitionOutcome {
        self.transition(request_id, RequestAction::MarkReceived).await
    }

    async fn transition(
        &self,
        request_id: &RequestId,
        action: RequestAction,
    ) -> TransitionOutcome {
        let (actor, role) = {
            let session = self.session.read().await;
            (session.user_id.clone(), session.role)
        };
        let Some(actor) = actor else {
            info!(request_id = %request_id, "transition ignored: no signed-in user");
            return TransitionOutcome::Ignored;
        };

        let current = {
            let latest = self.latest.read().await;
            latest
                .iter()
                .find(|row| &row.request_id == request_id)
                .cloned()
        };
        let Some(row) = current else {
            info!(request_id = %request_id, "transition ignored: request not in snapshot");
            return TransitionOutcome::Ignored;
        };

        let expected = row.request.status;
        let Some(updated) = lifecycle::apply(&row.request, action, role, &actor) else {
            info!(
                request_id = %request_id,
                status = %expected,
                "transition ignored: role or status guard rejected"
            );
            return TransitionOutcome::Ignored;
        };

        match self
            .request_store
            .overwrite_request_if_status(request_id, expected, &updated)
            .await
        {
            Ok(()) => TransitionOutcome::Applied,
            Err(StoreError::PreconditionFailed { actual, .. }) => {
                warn!(
                    request_id = %request_id,
                    expected = %expected,
                    actual = %actual,
                    "transition lost an overwrite race"
                );
                TransitionOutcome::Conflict { actual }
            }
            Err(err) => {
                error!("error updating status: {err}");
                TransitionOutcome::Ignored
            }
        }
    }

    /// Builds a new request from the form and appends it under a freshly
    /// generated key: donated by the current user, deliverer and receiver
    /// unset, status `deliver`, creation time stamped now. Returns `None`
    /// (after logging) when nobody is signed in or the write fails.
    pub async fn submit(&self, form: RequestForm) -> Option<RequestId> {
        let donor = self.session.read().await.user_id.clone();
        let Some(donor) = donor else {
            info!("submission ignored: no signed-in user");
            return None;
        };

        let record = DonationRequest {
            title: form.title,
            description: form.description,
            food_type: form.food_type,
            food_quantity: form.food_quantity,
            food_weight: form.food_weight,
            expiration_date: form.expiration_date,
            pickup_date_time: form.pickup_date_time,
            location: form.location,
            donated_by: donor,
            delivered_by: UserId::default(),
            received_by: UserId::default(),
            status: RequestStatus::Deliver,
            time: Utc::now().to_rfc3339(),
        };

        match self.request_store.create_request(&record).await {
            Ok(request_id) => Some(request_id),
            Err(err) => {
                error!("error storing donation request: {err}");
                None
            }
        }
    }

    /// Releases both subscriptions. Also runs on drop.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for RequestListingController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn refresh_session(
    session: &RwLock<SessionState>,
    profile_store: &dyn ProfileStore,
    user_id: Option<UserId>,
) {
    let Some(user_id) = user_id else {
        *session.write().await = SessionState::default();
        return;
    };

    let profile = match profile_store.profile(&user_id).await {
        Ok(profile) => profile.unwrap_or_default(),
        Err(err) => {
            warn!(user_id = %user_id, "profile read failed, role stays unset: {err}");
            UserProfile::default()
        }
    };

    *session.write().await = SessionState {
        user_id: Some(user_id),
        role: profile.account_type,
        display_name: profile.first_name.map(capitalize_first),
    };
}

fn capitalize_first(value: String) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => value,
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

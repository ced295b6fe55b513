use std::{collections::BTreeMap, sync::Arc};

use shared::{
    domain::{EntitySnapshot, UserContext},
    error::ServerFailure,
    protocol::{EntityEnvelope, EntityRequest, VersionMap},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub mod account;
pub mod api;
pub mod controller;
pub mod error;
pub mod location;
pub mod transport;

pub use api::{HttpOctoApi, OctoApi};
pub use controller::{IterationController, IterationSlot};
pub use error::{ClientError, Direction, Mutation};
pub use location::{EntityLocation, PageQuery};

const SESSION_EVENT_CAPACITY: usize = 256;
pub const MINT_SUCCESS_NOTICE: &str = "Entity minted successfully!";

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The displayed card changed; carries what should now be shown.
    Rendered(CardView),
    Notice(String),
    Error(String),
}

/// What a front end needs to draw the current iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct CardView {
    pub iter: u32,
    pub total_iterations: usize,
    pub snapshot: EntitySnapshot,
    pub pending: bool,
    pub owned_by_viewer: bool,
    /// Mint may be offered: viewer owns it, it is unminted and confirmed.
    pub mintable: bool,
    pub banner: Vec<String>,
    pub query: PageQuery,
}

#[derive(Default)]
struct SessionState {
    controller: IterationController,
    /// Zone the entity was opened from; snapshots may omit it.
    zone: u8,
    redirect: Option<String>,
    user_context: Option<UserContext>,
    banner: Vec<String>,
}

/// Drives the iteration controller against the API.
///
/// The state lock is never held across a request: local effects are applied
/// and the lock released before awaiting the server, then re-acquired to
/// commit or roll back.
pub struct EntitySession {
    api: Arc<dyn OctoApi>,
    inner: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl EntitySession {
    pub fn new(api: Arc<dyn OctoApi>) -> Arc<Self> {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Arc::new(Self {
            api,
            inner: Mutex::new(SessionState::default()),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn current_iter(&self) -> Option<u32> {
        self.inner.lock().await.controller.current_iter()
    }

    pub async fn versions(&self) -> BTreeMap<u32, IterationSlot> {
        self.inner.lock().await.controller.versions().clone()
    }

    pub async fn in_flight(&self) -> Option<Mutation> {
        self.inner.lock().await.controller.in_flight()
    }

    pub async fn user_context(&self) -> Option<UserContext> {
        self.inner.lock().await.user_context.clone()
    }

    pub async fn current_card(&self) -> Result<CardView, ClientError> {
        card_view(&*self.inner.lock().await)
    }

    /// Fetches the entity at `query.location` and shows its intended
    /// iteration. Refused while a mint or new iteration is outstanding.
    pub async fn open(&self, query: PageQuery) -> Result<CardView, ClientError> {
        let result = self.open_inner(query).await;
        self.report(result)
    }

    pub async fn navigate(&self, direction: Direction) -> Result<CardView, ClientError> {
        let result = self.navigate_inner(direction).await;
        self.report(result)
    }

    pub async fn navigate_latest(&self) -> Result<CardView, ClientError> {
        let result = async {
            let mut state = self.inner.lock().await;
            state.controller.navigate_latest()?;
            self.render(&state)
        }
        .await;
        self.report(result)
    }

    pub async fn request_mint(&self) -> Result<CardView, ClientError> {
        let result = self.mint_inner().await;
        self.report(result)
    }

    /// Shows a pending placeholder for the next iteration immediately, then
    /// replaces it with the server's history or removes it on failure.
    pub async fn request_new_iteration(&self) -> Result<CardView, ClientError> {
        let result = self.new_iteration_inner().await;
        self.report(result)
    }

    async fn open_inner(&self, query: PageQuery) -> Result<CardView, ClientError> {
        self.inner.lock().await.controller.ensure_idle()?;
        let envelope = self.api.render_one(query.location.request()).await?;
        let versions = versions_of(&envelope)?;
        let intended_iter = envelope.intended_iter();

        let mut state = self.inner.lock().await;
        // A mutation may have begun while the entity was being fetched.
        state.controller.ensure_idle().inspect_err(|err| {
            debug!(error = %err, "open discarded; mutation started meanwhile");
        })?;
        state.zone = query.location.zone;
        state.redirect = query.redirect;
        state.user_context = envelope.user_context;
        state.banner = envelope.banner;
        state.controller.load_entity(versions, intended_iter);
        info!(
            location = %query.location.to_xyzi(),
            iterations = state.controller.versions().len(),
            current = ?state.controller.current_iter(),
            "entity loaded"
        );

        match (intended_iter, state.controller.current_iter()) {
            (Some(iter), None) => Err(ClientError::NoCardForIteration { iter }),
            _ => self.render(&state),
        }
    }

    async fn navigate_inner(&self, direction: Direction) -> Result<CardView, ClientError> {
        let mut state = self.inner.lock().await;
        state.controller.navigate(direction)?;
        self.render(&state)
    }

    async fn mint_inner(&self) -> Result<CardView, ClientError> {
        let (ticket, request) = {
            let mut state = self.inner.lock().await;
            let ticket = state.controller.begin_mint().inspect_err(|err| {
                debug!(error = %err, "mint rejected locally");
            })?;
            let request = EntityRequest::new(ticket.snapshot.position(state.zone), ticket.iter);
            (ticket, request)
        };

        let outcome = match self.api.mint(request).await {
            Ok(envelope) => versions_of(&envelope).map(|versions| (envelope, versions)),
            Err(err) => Err(err),
        };

        let mut state = self.inner.lock().await;
        match outcome {
            Ok((envelope, versions)) => {
                let iter = ticket.iter;
                state.controller.commit_mint(ticket, versions);
                if let Some(user) = envelope.user_context {
                    state.user_context = Some(user);
                }
                info!(iter, "entity minted");
                let card = self.render(&state)?;
                let _ = self
                    .events
                    .send(SessionEvent::Notice(MINT_SUCCESS_NOTICE.to_string()));
                Ok(card)
            }
            Err(err) => {
                state.controller.abort_mint(ticket);
                warn!(error = %err, "mint failed");
                Err(err)
            }
        }
    }

    async fn new_iteration_inner(&self) -> Result<CardView, ClientError> {
        let (ticket, request) = {
            let mut state = self.inner.lock().await;
            let ticket = state.controller.begin_new_iteration().inspect_err(|err| {
                debug!(error = %err, "new iteration rejected locally");
            })?;
            let request = EntityRequest::new(ticket.base.position(state.zone), ticket.prev_iter);
            let _ = self.render(&state);
            (ticket, request)
        };

        let outcome = match self.api.new_iteration(request).await {
            Ok(envelope) => versions_of(&envelope).map(|versions| (envelope, versions)),
            Err(err) => Err(err),
        };

        let mut state = self.inner.lock().await;
        match outcome {
            Ok((envelope, versions)) => {
                let current = state.controller.commit_new_iteration(ticket, versions);
                if let Some(user) = envelope.user_context {
                    state.user_context = Some(user);
                }
                info!(current = ?current, "new iteration confirmed");
                self.render(&state)
            }
            Err(err) => {
                let next_iter = ticket.next_iter;
                let rollback = state.controller.rollback_new_iteration(ticket);
                warn!(
                    error = %err,
                    next_iter,
                    placeholder_removed = rollback.placeholder_removed,
                    "new iteration failed; rolled back"
                );
                if rollback.current_iter.is_some() {
                    let _ = self.render(&state);
                }
                Err(err)
            }
        }
    }

    fn render(&self, state: &SessionState) -> Result<CardView, ClientError> {
        let card = card_view(state)?;
        let _ = self.events.send(SessionEvent::Rendered(card.clone()));
        Ok(card)
    }

    fn report<T>(&self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(err) = &result {
            let _ = self.events.send(SessionEvent::Error(err.to_string()));
        }
        result
    }
}

/// The version map of a response. A response that claims success but
/// carries no map is malformed; otherwise the server's message is used.
fn versions_of(envelope: &EntityEnvelope) -> Result<VersionMap, ClientError> {
    if let Some(versions) = &envelope.entity {
        return Ok(versions.clone());
    }
    let claims_success = envelope.db_health.is_none()
        && envelope
            .message
            .as_deref()
            .map_or(true, |message| message == "OK");
    if claims_success {
        return Err(ClientError::MalformedResponse { field: "entity" });
    }
    Err(ServerFailure::from_health(envelope.db_health.as_ref()).into())
}

fn card_view(state: &SessionState) -> Result<CardView, ClientError> {
    let (iter, slot) = state.controller.current()?;
    let snapshot = slot.snapshot().clone();
    let pending = slot.is_pending();
    let viewer = state.user_context.as_ref();
    let owned_by_viewer =
        viewer.is_some_and(|user| user.decryption_success && snapshot.is_owned_by(user));
    let mintable = !pending && viewer.is_some_and(|user| snapshot.mintable_by(user));
    let location = EntityLocation::at_iteration(snapshot.position(state.zone), iter);

    Ok(CardView {
        iter,
        total_iterations: state.controller.versions().len(),
        pending,
        owned_by_viewer,
        mintable,
        banner: state.banner.clone(),
        query: PageQuery::new(location, state.redirect.clone()),
        snapshot,
    })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

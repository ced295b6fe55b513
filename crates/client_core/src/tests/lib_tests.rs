use std::{
    collections::VecDeque,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use super::*;
use crate::{
    account::{load_profile, login, owned_entities, renew_key, AccountSummary},
    api::RENDER_ONE_PATH,
    transport::{Endpoint, EndpointSet, Timeouts},
};
use async_trait::async_trait;
use axum::{routing::post, Json, Router};
use serde_json::{json, Value};
use shared::{
    domain::{Aesthetics, EntityIndex},
    protocol::{
        HealthResponse, KeyCheckResponse, OwnershipPage, OwnershipQuery, RenewKeyResponse,
    },
};
use tokio::{net::TcpListener, sync::oneshot};

const OWNER_ID: &str = "c0ffee00-1234-4abc-8def-000000000042";

type Reply = Result<EntityEnvelope, ClientError>;

#[derive(Default)]
struct ScriptedApi {
    render_replies: std::sync::Mutex<VecDeque<Reply>>,
    render_gates: std::sync::Mutex<VecDeque<oneshot::Receiver<Reply>>>,
    mint_replies: std::sync::Mutex<VecDeque<Reply>>,
    new_iteration_gates: std::sync::Mutex<VecDeque<oneshot::Receiver<Reply>>>,
    ownership_pages: std::sync::Mutex<VecDeque<OwnershipPage>>,
    profile: std::sync::Mutex<Option<UserContext>>,
    calls: std::sync::Mutex<Vec<(&'static str, Value)>>,
}

impl ScriptedApi {
    fn record(&self, name: &'static str, payload: impl serde::Serialize) {
        let payload = serde_json::to_value(payload).expect("payload");
        self.calls.lock().expect("calls").push((name, payload));
    }

    fn calls_to(&self, name: &str) -> Vec<Value> {
        self.calls
            .lock()
            .expect("calls")
            .iter()
            .filter(|(call, _)| *call == name)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    fn push_render(&self, reply: Reply) {
        self.render_replies.lock().expect("render").push_back(reply);
    }

    fn gate_render(&self) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.render_gates.lock().expect("gates").push_back(rx);
        tx
    }

    fn push_mint(&self, reply: Reply) {
        self.mint_replies.lock().expect("mint").push_back(reply);
    }

    fn gate_new_iteration(&self) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.new_iteration_gates
            .lock()
            .expect("gates")
            .push_back(rx);
        tx
    }
}

fn unscripted() -> ClientError {
    ClientError::Unreachable {
        attempts: vec!["scripted: no reply queued".into()],
    }
}

#[async_trait]
impl OctoApi for ScriptedApi {
    async fn render_one(&self, request: EntityRequest) -> Result<EntityEnvelope, ClientError> {
        self.record("render_one", request);
        let gate = self.render_gates.lock().expect("gates").pop_front();
        if let Some(gate) = gate {
            return gate.await.unwrap_or_else(|_| Err(unscripted()));
        }
        let reply = self.render_replies.lock().expect("render").pop_front();
        reply.unwrap_or_else(|| Err(unscripted()))
    }

    async fn mint(&self, request: EntityRequest) -> Result<EntityEnvelope, ClientError> {
        self.record("mint", request);
        let reply = self.mint_replies.lock().expect("mint").pop_front();
        reply.unwrap_or_else(|| Err(unscripted()))
    }

    async fn new_iteration(&self, request: EntityRequest) -> Result<EntityEnvelope, ClientError> {
        self.record("new_iteration", request);
        let gate = self.new_iteration_gates.lock().expect("gates").pop_front();
        match gate {
            Some(gate) => gate.await.unwrap_or_else(|_| Err(unscripted())),
            None => Err(unscripted()),
        }
    }

    async fn ownership_page(&self, query: OwnershipQuery) -> Result<OwnershipPage, ClientError> {
        self.record("ownership_page", &query);
        let page = self.ownership_pages.lock().expect("pages").pop_front();
        page.ok_or_else(unscripted)
    }

    async fn check_api_key(&self, api_key: &str) -> Result<KeyCheckResponse, ClientError> {
        self.record("check_api_key", api_key);
        Ok(KeyCheckResponse {
            valid_key: api_key == "good-key",
        })
    }

    async fn profile(&self, api_key: &str) -> Result<UserContext, ClientError> {
        self.record("profile", api_key);
        let profile = self.profile.lock().expect("profile").clone();
        profile.ok_or_else(unscripted)
    }

    async fn renew_api_key(&self, api_key: &str) -> Result<RenewKeyResponse, ClientError> {
        self.record("renew_api_key", api_key);
        Ok(RenewKeyResponse { api_key: None })
    }

    async fn health(&self) -> Result<transport::Answered<HealthResponse>, ClientError> {
        Err(unscripted())
    }
}

fn owner() -> UserContext {
    UserContext {
        decryption_success: true,
        data: Vec::new(),
        days_old: 3,
        id: OWNER_ID.to_string(),
    }
}

fn snapshot(iter: u32, name: &str) -> EntitySnapshot {
    EntitySnapshot {
        index: Some(EntityIndex(900)),
        iter,
        uuid: uuid::Uuid::nil(),
        state: 0,
        name: name.to_string(),
        description: "Genesis".into(),
        position_x: 3,
        position_y: 12,
        zone: None,
        aesthetics: Aesthetics::default(),
        ownership: Some(OWNER_ID.to_string()),
        minted: false,
        exists: true,
        timestamp: 1_700_000_000.0,
    }
}

fn envelope(cards: &[(u32, &str)], intended: Option<u32>) -> EntityEnvelope {
    EntityEnvelope {
        message: Some("OK".into()),
        entity: Some(
            cards
                .iter()
                .map(|(iter, name)| (*iter, snapshot(*iter, name)))
                .collect(),
        ),
        intended_iter: intended.map(|iter| json!(iter)),
        user_context: Some(owner()),
        banner: vec!["#7489c9".into(), "#74c9c5".into()],
        ..EntityEnvelope::default()
    }
}

fn location(iter: u32) -> PageQuery {
    PageQuery::new(
        EntityLocation {
            x: 3,
            y: 12,
            zone: 2,
            iter,
        },
        None,
    )
}

async fn opened(cards: &[(u32, &str)], intended: u32) -> (Arc<ScriptedApi>, Arc<EntitySession>) {
    let api = Arc::new(ScriptedApi::default());
    api.push_render(Ok(envelope(cards, Some(intended))));
    let session = EntitySession::new(api.clone());
    session.open(location(intended)).await.expect("open");
    (api, session)
}

async fn next_event(rx: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event in time")
        .expect("event")
}

async fn wait_for_pending_card(rx: &mut broadcast::Receiver<SessionEvent>) -> CardView {
    loop {
        if let SessionEvent::Rendered(card) = next_event(rx).await {
            if card.pending {
                return card;
            }
        }
    }
}

#[tokio::test]
async fn open_shows_intended_iteration() {
    let api = Arc::new(ScriptedApi::default());
    api.push_render(Ok(envelope(&[(0, "A"), (1, "B")], Some(1))));
    let session = EntitySession::new(api.clone());
    let mut events = session.subscribe();

    let card = session.open(location(1)).await.expect("open");

    assert_eq!(card.iter, 1);
    assert_eq!(card.snapshot.name, "B");
    assert_eq!(card.total_iterations, 2);
    assert!(card.mintable);
    assert_eq!(card.query.location.zone, 2);
    assert_eq!(session.current_iter().await, Some(1));
    assert_eq!(next_event(&mut events).await, SessionEvent::Rendered(card));
    assert_eq!(
        api.calls_to("render_one"),
        vec![json!({"x_pos": 3, "y_pos": 12, "zone": 2, "iter": 1})]
    );
}

#[tokio::test]
async fn open_without_entity_reports_server_message() {
    let api = Arc::new(ScriptedApi::default());
    api.push_render(Ok(EntityEnvelope {
        message: Some("ERROR".into()),
        db_health: Some(shared::error::DbHealth::with_message("Rate Limit Exceeded")),
        ..EntityEnvelope::default()
    }));
    let session = EntitySession::new(api);
    let mut events = session.subscribe();

    let err = session.open(location(0)).await.expect_err("no entity");
    assert_eq!(err.to_string(), "Rate Limit Exceeded");
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Error("Rate Limit Exceeded".into())
    );
    assert_eq!(session.current_iter().await, None);
}

#[tokio::test]
async fn open_with_ok_but_no_entity_is_malformed() {
    let api = Arc::new(ScriptedApi::default());
    api.push_render(Ok(EntityEnvelope {
        message: Some("OK".into()),
        ..EntityEnvelope::default()
    }));
    let session = EntitySession::new(api);

    let err = session.open(location(0)).await.expect_err("malformed");
    assert!(matches!(
        err,
        ClientError::MalformedResponse { field: "entity" }
    ));
}

#[tokio::test]
async fn open_with_unknown_intended_iteration_reports_missing_card() {
    let api = Arc::new(ScriptedApi::default());
    api.push_render(Ok(envelope(&[(0, "A")], Some(4))));
    let session = EntitySession::new(api);

    let err = session.open(location(4)).await.expect_err("missing card");
    assert_eq!(err.to_string(), "No card available for this iteration.");
    assert_eq!(session.current_iter().await, None);
}

#[tokio::test]
async fn navigate_past_latest_signals_and_keeps_pointer() {
    let (_api, session) = opened(&[(0, "A"), (1, "B"), (2, "C")], 2).await;
    let mut events = session.subscribe();

    let err = session
        .navigate(Direction::Next)
        .await
        .expect_err("no next");
    assert_eq!(err.to_string(), "No next card available.");
    assert_eq!(session.current_iter().await, Some(2));
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Error("No next card available.".into())
    );

    let card = session
        .navigate(Direction::Previous)
        .await
        .expect("previous");
    assert_eq!(card.snapshot.name, "B");
}

#[tokio::test]
async fn iterating_an_older_card_after_moving_to_latest() {
    let (api, session) = opened(&[(0, "A"), (1, "B"), (2, "C")], 0).await;
    let gate = api.gate_new_iteration();
    gate.send(Ok(envelope(&[(0, "A"), (1, "B"), (2, "C"), (3, "D")], None)))
        .expect("prime gate");

    let err = session.request_new_iteration().await.expect_err("not latest");
    assert!(matches!(err, ClientError::IterationAlreadyExists { iter: 1 }));
    assert!(api.calls_to("new_iteration").is_empty());

    let latest = session.navigate_latest().await.expect("latest");
    assert_eq!(latest.snapshot.name, "C");
    let card = session.request_new_iteration().await.expect("confirmed");
    assert_eq!(card.iter, 3);
    assert_eq!(
        api.calls_to("new_iteration"),
        vec![json!({"x_pos": 3, "y_pos": 12, "zone": 2, "iter": 2})]
    );
}

#[tokio::test]
async fn new_iteration_failure_rolls_back_placeholder() {
    let (api, session) = opened(&[(0, "Foo")], 0).await;
    let before = session.versions().await;
    let gate = api.gate_new_iteration();
    let mut events = session.subscribe();

    let worker = {
        let session = session.clone();
        tokio::spawn(async move { session.request_new_iteration().await })
    };

    let placeholder = wait_for_pending_card(&mut events).await;
    assert_eq!(placeholder.iter, 1);
    assert_eq!(placeholder.snapshot.name, "Foo (pending)");
    assert!(!placeholder.snapshot.exists);
    assert!(!placeholder.mintable);
    assert_eq!(session.current_iter().await, Some(1));
    assert!(session.versions().await[&1].is_pending());

    gate.send(Err(ClientError::Unreachable {
        attempts: vec!["production: timed out".into(), "local: refused".into()],
    }))
    .expect("release gate");

    let err = worker.await.expect("join").expect_err("failed");
    assert_eq!(err.to_string(), "No server reachable.");
    assert_eq!(session.versions().await, before);
    assert_eq!(session.current_iter().await, Some(0));
    assert_eq!(session.in_flight().await, None);
    assert_eq!(
        api.calls_to("new_iteration"),
        vec![json!({"x_pos": 3, "y_pos": 12, "zone": 2, "iter": 0})]
    );
}

#[tokio::test]
async fn overlapping_new_iteration_is_rejected_without_request() {
    let (api, session) = opened(&[(0, "Foo")], 0).await;
    let gate = api.gate_new_iteration();
    let mut events = session.subscribe();

    let worker = {
        let session = session.clone();
        tokio::spawn(async move { session.request_new_iteration().await })
    };
    wait_for_pending_card(&mut events).await;
    let after_first = session.versions().await;

    let err = session
        .request_new_iteration()
        .await
        .expect_err("already pending");
    assert!(err.to_string().contains("already in progress"));
    assert_eq!(session.versions().await, after_first);
    assert_eq!(session.current_iter().await, Some(1));
    assert_eq!(api.calls_to("new_iteration").len(), 1);

    gate.send(Ok(envelope(&[(0, "Foo"), (1, "Foo")], None)))
        .expect("release gate");
    let card = worker.await.expect("join").expect("confirmed");
    assert_eq!(card.iter, 1);
    assert!(!card.pending);
}

#[tokio::test]
async fn new_iteration_success_points_at_latest_confirmed() {
    let (api, session) = opened(&[(0, "Foo")], 0).await;
    let gate = api.gate_new_iteration();
    gate.send(Ok(envelope(&[(0, "Foo"), (1, "Foo v1"), (2, "Foo v2")], None)))
        .expect("prime gate");

    let card = session.request_new_iteration().await.expect("confirmed");

    assert_eq!(card.iter, 2);
    assert_eq!(card.snapshot.name, "Foo v2");
    assert!(session
        .versions()
        .await
        .values()
        .all(|slot| !slot.is_pending()));
}

fn location_at(x: u32, y: u32, zone: u8) -> PageQuery {
    PageQuery::new(
        EntityLocation {
            x,
            y,
            zone,
            iter: 0,
        },
        None,
    )
}

#[tokio::test]
async fn open_is_refused_while_new_iteration_pending() {
    let (api, session) = opened(&[(0, "Foo")], 0).await;
    let gate = api.gate_new_iteration();
    let mut events = session.subscribe();

    let worker = {
        let session = session.clone();
        tokio::spawn(async move { session.request_new_iteration().await })
    };
    wait_for_pending_card(&mut events).await;

    let err = session
        .open(location_at(40, 50, 6))
        .await
        .expect_err("busy");
    assert!(matches!(
        err,
        ClientError::OperationPending(Mutation::NewIteration)
    ));
    assert_eq!(api.calls_to("render_one").len(), 1);

    gate.send(Ok(envelope(&[(0, "Foo"), (1, "Foo v1")], None)))
        .expect("release gate");
    let card = worker.await.expect("join").expect("confirmed");
    assert_eq!(card.snapshot.name, "Foo v1");
    assert_eq!(card.query.location.to_xyzi(), "3,12,2,1");
}

#[tokio::test]
async fn open_answer_is_discarded_when_mutation_began_meanwhile() {
    let (api, session) = opened(&[(0, "Foo")], 0).await;
    let render_gate = api.gate_render();
    let mutation_gate = api.gate_new_iteration();
    let mut events = session.subscribe();

    let opener = {
        let session = session.clone();
        tokio::spawn(async move { session.open(location_at(40, 50, 6)).await })
    };
    while api.calls_to("render_one").len() < 2 {
        tokio::task::yield_now().await;
    }

    let worker = {
        let session = session.clone();
        tokio::spawn(async move { session.request_new_iteration().await })
    };
    wait_for_pending_card(&mut events).await;

    render_gate
        .send(Ok(envelope(&[(0, "Other")], Some(0))))
        .expect("release render");
    let err = opener.await.expect("join").expect_err("discarded");
    assert!(matches!(err, ClientError::OperationPending(_)));

    mutation_gate
        .send(Ok(envelope(&[(0, "Foo"), (1, "Foo v1")], None)))
        .expect("release gate");
    let card = worker.await.expect("join").expect("confirmed");
    assert_eq!(card.snapshot.name, "Foo v1");
    assert_eq!(card.query.location.to_xyzi(), "3,12,2,1");
}

#[tokio::test]
async fn mint_while_new_iteration_pending_is_busy() {
    let (api, session) = opened(&[(0, "Foo")], 0).await;
    let gate = api.gate_new_iteration();
    let mut events = session.subscribe();

    let worker = {
        let session = session.clone();
        tokio::spawn(async move { session.request_new_iteration().await })
    };
    wait_for_pending_card(&mut events).await;

    let err = session.request_mint().await.expect_err("busy");
    assert!(matches!(
        err,
        ClientError::OperationPending(Mutation::NewIteration)
    ));
    assert!(api.calls_to("mint").is_empty());

    drop(gate);
    assert!(worker.await.expect("join").is_err());
    assert_eq!(session.current_iter().await, Some(0));
}

#[tokio::test]
async fn mint_success_replaces_history_and_notifies() {
    let (api, session) = opened(&[(0, "Foo"), (1, "Bar")], 0).await;
    let mut minted = envelope(&[(0, "Foo"), (1, "Bar")], None);
    if let Some(genesis) = minted.entity.as_mut().and_then(|map| map.get_mut(&0)) {
        genesis.minted = true;
    }
    api.push_mint(Ok(minted));
    let mut events = session.subscribe();

    let card = session.request_mint().await.expect("minted");

    assert_eq!(card.iter, 0);
    assert!(card.snapshot.minted);
    assert!(!card.mintable);
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Rendered(_)
    ));
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Notice(MINT_SUCCESS_NOTICE.into())
    );
    assert_eq!(
        api.calls_to("mint"),
        vec![json!({"x_pos": 3, "y_pos": 12, "zone": 2, "iter": 0})]
    );
}

#[tokio::test]
async fn mint_failure_leaves_state_untouched() {
    let (api, session) = opened(&[(0, "Foo")], 0).await;
    let before = session.versions().await;
    api.push_mint(Err(ClientError::Application {
        message: "not owner".into(),
    }));

    let err = session.request_mint().await.expect_err("rejected");
    assert_eq!(err.to_string(), "not owner");
    assert_eq!(session.versions().await, before);
    assert_eq!(session.current_iter().await, Some(0));
    assert_eq!(session.in_flight().await, None);
}

#[tokio::test]
async fn mint_without_loaded_entity_makes_no_request() {
    let api = Arc::new(ScriptedApi::default());
    let session = EntitySession::new(api.clone());

    let err = session.request_mint().await.expect_err("nothing loaded");
    assert!(matches!(err, ClientError::NoEntityLoaded));
    assert!(api.calls_to("mint").is_empty());
}

#[tokio::test]
async fn login_requires_a_key_before_calling_the_api() {
    let api = ScriptedApi::default();
    assert!(matches!(
        login(&api, "   ").await,
        Err(ClientError::MissingApiKey)
    ));
    assert!(api.calls_to("check_api_key").is_empty());

    assert!(login(&api, "good-key").await.expect("check"));
    assert!(!login(&api, "stale-key").await.expect("check"));
}

#[tokio::test]
async fn profile_with_undecryptable_key_is_unauthorized() {
    let api = ScriptedApi::default();
    *api.profile.lock().expect("profile") = Some(UserContext::default());

    let err = load_profile(&api, "forged").await.expect_err("rejected");
    assert!(err.requires_reauth());

    *api.profile.lock().expect("profile") = Some(owner());
    let user = load_profile(&api, "good-key").await.expect("profile");
    assert_eq!(user.short_id(), "c0ffee00");
}

#[tokio::test]
async fn renew_without_new_key_is_an_application_error() {
    let api = ScriptedApi::default();
    let err = renew_key(&api, "good-key").await.expect_err("no key");
    assert_eq!(err.to_string(), "Unexpected Error.");
}

#[test]
fn account_summary_tracks_key_age() {
    let fresh = AccountSummary::from(&owner());
    assert_eq!(fresh.short_id, "c0ffee00");
    assert_eq!(fresh.age_percent, 0);
    assert!(!fresh.needs_renewal());

    let aging = AccountSummary::from(&UserContext {
        days_old: 292,
        ..owner()
    });
    assert_eq!(aging.age_percent, 80);
    assert!(aging.needs_renewal());

    let expired = AccountSummary::from(&UserContext {
        days_old: 500,
        ..owner()
    });
    assert_eq!(expired.age_percent, 100);
}

#[tokio::test]
async fn owned_entities_follows_cursor_until_exhausted() {
    let api = ScriptedApi::default();
    {
        let mut pages = api.ownership_pages.lock().expect("pages");
        pages.push_back(OwnershipPage {
            rows: vec![snapshot(0, "first"), snapshot(0, "second")],
            has_more: true,
            next_cursor: Some(EntityIndex(2)),
            total: Some(3),
        });
        pages.push_back(OwnershipPage {
            rows: vec![snapshot(0, "third")],
            has_more: false,
            next_cursor: None,
            total: Some(3),
        });
    }

    let rows = owned_entities(&api, OWNER_ID, 1).await.expect("rows");
    let names: Vec<_> = rows.iter().map(|row| row.name.as_str()).collect();
    assert_eq!(names, ["first", "second", "third"]);

    let queries = api.calls_to("ownership_page");
    assert_eq!(queries[0], json!({"ownership": OWNER_ID, "zone": 1}));
    assert_eq!(
        queries[1],
        json!({"ownership": OWNER_ID, "zone": 1, "after_index": 2})
    );
}

#[tokio::test]
async fn owned_entities_rejects_stalled_cursor() {
    let api = ScriptedApi::default();
    api.ownership_pages
        .lock()
        .expect("pages")
        .push_back(OwnershipPage {
            rows: Vec::new(),
            has_more: true,
            next_cursor: None,
            total: None,
        });

    assert!(matches!(
        owned_entities(&api, OWNER_ID, 0).await,
        Err(ClientError::MalformedResponse {
            field: "next_cursor"
        })
    ));
}

#[tokio::test]
async fn http_session_opens_entity_through_fallback_endpoint() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let dead = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let dead_url = format!("http://{}", dead.local_addr().expect("addr"));
    drop(dead);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let live_url = format!("http://{}", listener.local_addr().expect("addr"));
    let app = Router::new().route(
        RENDER_ONE_PATH,
        post(|Json(body): Json<Value>| async move {
            let iter = body["iter"].as_u64().unwrap_or_default();
            Json(json!({
                "message": "OK",
                "entity": {
                    "0": serde_json::to_value(snapshot(0, "Void")).expect("json"),
                    "1": serde_json::to_value(snapshot(1, "Lantern")).expect("json")
                },
                "intended_iter": iter,
                "iter_is_latest": true,
                "user_context": {"decryption_success": false, "data": [], "days_old": 0,
                                 "ID": "00000000-0000-0000-0000-000000000001"},
                "banner": ["#7489c9"]
            }))
        }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let api = HttpOctoApi::new(
        EndpointSet::new(vec![
            Endpoint::new("production", &dead_url).expect("endpoint"),
            Endpoint::new("local", &live_url).expect("endpoint"),
        ]),
        Timeouts::default(),
        None,
    );
    let session = EntitySession::new(Arc::new(api));

    let card = session
        .open(PageQuery::parse("xyzi=3,12,2,1&redirect=%2Farea.html"))
        .await
        .expect("open");
    assert_eq!(card.snapshot.name, "Lantern");
    assert!(!card.owned_by_viewer);
    assert!(!card.mintable);
    assert_eq!(
        card.query.to_query_string(),
        "xyzi=3%2C12%2C2%2C1&redirect=%2Farea.html"
    );
}

#[tokio::test]
async fn http_session_accepts_null_entity_columns_from_first_endpoint() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let hits = Arc::new(AtomicUsize::new(0));
    let mut urls = Vec::new();
    for _ in 0..2 {
        let hits = hits.clone();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        urls.push(format!("http://{}", listener.local_addr().expect("addr")));
        let app = Router::new().route(
            RENDER_ONE_PATH,
            post(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(json!({
                        "message": "OK",
                        "entity": {"0": {
                            "index": 11, "iter": 0, "uuid": null, "state": null,
                            "name": "Quiet", "description": null,
                            "positionX": 3, "positionY": 12, "aesthetics": {},
                            "ownership": null, "minted": false, "exists": true,
                            "timestamp": null
                        }},
                        "intended_iter": 0
                    }))
                }
            }),
        );
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
    }

    let api = HttpOctoApi::new(
        EndpointSet::new(vec![
            Endpoint::new("production", &urls[0]).expect("endpoint"),
            Endpoint::new("local", &urls[1]).expect("endpoint"),
        ]),
        Timeouts::default(),
        None,
    );
    let session = EntitySession::new(Arc::new(api));

    let card = session.open(location(0)).await.expect("open");
    assert_eq!(card.snapshot.name, "Quiet");
    assert_eq!(card.snapshot.description, "");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

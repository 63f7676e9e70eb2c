use std::sync::Arc;

use chrono::Duration;
use fieldhand_api::app::{build_app, AppState};
use fieldhand_auth::{Identity, InMemoryDirectory, RoleHint};
use reqwest::StatusCode;
use serde_json::{json, Value};

const COOKIE: &str = "fieldhand_session";

struct TestServer {
    base_url: String,
    dir: InMemoryDirectory,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over an in-memory directory the test can seed.
        let dir = InMemoryDirectory::new();
        let app = build_app(AppState::new(Arc::new(dir.clone()), COOKIE));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            dir,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// A fresh identity plus a session cookie value for it.
    fn login(&self, email: &str, hint: RoleHint) -> (Identity, String) {
        let identity = self.dir.signup(email, hint);
        let token = self.dir.open_session(identity.id, Duration::hours(1));
        (identity, token.as_str().to_string())
    }

    fn get(&self, path: &str, session: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .header(reqwest::header::COOKIE, format!("{COOKIE}={session}"))
    }

    fn post(&self, path: &str, session: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .header(reqwest::header::COOKIE, format!("{COOKIE}={session}"))
    }

    fn put(&self, path: &str, session: &str) -> reqwest::RequestBuilder {
        self.client
            .put(self.url(path))
            .header(reqwest::header::COOKIE, format!("{COOKIE}={session}"))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn body(res: reqwest::Response) -> Value {
    res.json().await.unwrap()
}

/// An owner with the default roles seeded: (owner, session, Manager role id, Worker role id).
async fn owner_with_roles(srv: &TestServer) -> (Identity, String, String, String) {
    let (owner, session) = srv.login("olga@mowers.test", RoleHint::OwnerCapable);
    let res = srv.post("/roles/defaults", &session).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let created = body(res).await;
    let id_of = |name: &str| {
        created["created"]
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["name"] == name)
            .unwrap()["id"]
            .as_str()
            .unwrap()
            .to_string()
    };
    let (manager, worker) = (id_of("Manager"), id_of("Worker"));
    (owner, session, manager, worker)
}

/// Invite `email` with `role_id` and accept; returns the member, their session and membership id.
async fn join(srv: &TestServer, owner_session: &str, email: &str, role_id: &str) -> (Identity, String, String) {
    let (member, session) = srv.login(email, RoleHint::Member);
    let res = srv
        .post("/team/invites", owner_session)
        .json(&json!({ "member_id": member.id, "role_id": role_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let membership_id = body(res).await["id"].as_str().unwrap().to_string();

    let res = srv
        .post(&format!("/team/invites/{membership_id}/accept"), &session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    (member, session, membership_id)
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/me")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body(res).await, json!({ "error": "unauthenticated" }));
}

#[tokio::test]
async fn rejected_cookie_is_cleared() {
    let srv = TestServer::spawn().await;

    let res = srv.get("/me", "no-such-session").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let set_cookie = res
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .expect("cookie should be cleared")
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with(&format!("{COOKIE}=;")));
    assert!(set_cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn bearer_works_when_no_cookie_is_sent() {
    let srv = TestServer::spawn().await;
    let (owner, session) = srv.login("olga@mowers.test", RoleHint::OwnerCapable);

    let res = srv
        .client
        .get(srv.url("/me"))
        .bearer_auth(&session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let me = body(res).await;
    assert_eq!(me["identity"]["id"], json!(owner.id));
    assert_eq!(me["context"]["is_owner"], json!(true));
    assert_eq!(me["context"]["effective_tenant_id"], json!(owner.id));
    assert_eq!(me["context"]["hierarchy_rank"], json!("owner"));
}

#[tokio::test]
async fn pending_member_sees_membership_inactive_until_accepting() {
    let srv = TestServer::spawn().await;
    let (owner, owner_session, manager_role, _) = owner_with_roles(&srv).await;
    let (member, session) = srv.login("mo@mowers.test", RoleHint::Member);

    let res = srv
        .post("/team/invites", &owner_session)
        .json(&json!({ "member_id": member.id, "role_id": manager_role }))
        .send()
        .await
        .unwrap();
    let membership_id = body(res).await["id"].as_str().unwrap().to_string();

    let res = srv.get("/me", &session).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let err = body(res).await;
    assert_eq!(err["error"], "membership_inactive");
    assert_eq!(err["reason"], "pending");
    assert!(err["message"].as_str().unwrap().contains("pending"));

    let res = srv
        .post(&format!("/team/invites/{membership_id}/accept"), &session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let me = body(srv.get("/me", &session).send().await.unwrap()).await;
    assert_eq!(me["context"]["effective_tenant_id"], json!(owner.id));
    assert_eq!(me["context"]["is_owner"], json!(false));
    assert_eq!(me["context"]["hierarchy_rank"], json!("manager"));
}

#[tokio::test]
async fn manager_assignment_rules_are_explained() {
    let srv = TestServer::spawn().await;
    let (owner, owner_session, manager_role, worker_role) = owner_with_roles(&srv).await;
    let (_, manager_session, _) = join(&srv, &owner_session, "mo@mowers.test", &manager_role).await;
    let (worker, _, _) = join(&srv, &owner_session, "wu@mowers.test", &worker_role).await;

    let res = srv
        .post("/assignments/check", &manager_session)
        .json(&json!({ "target_member_id": worker.id }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body(res).await, json!({ "allowed": true }));

    let res = srv
        .post("/assignments/check", &manager_session)
        .json(&json!({ "target_member_id": owner.id }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        body(res).await,
        json!({ "allowed": false, "reason": "Managers cannot assign to the business owner" })
    );
}

#[tokio::test]
async fn workers_get_an_opaque_forbidden() {
    let srv = TestServer::spawn().await;
    let (_, owner_session, _, worker_role) = owner_with_roles(&srv).await;
    let (_, worker_session, _) = join(&srv, &owner_session, "wu@mowers.test", &worker_role).await;

    let res = srv.get("/roles", &worker_session).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body(res).await,
        json!({ "error": "forbidden", "message": "missing capability" })
    );
}

#[tokio::test]
async fn deactivation_applies_to_the_next_request() {
    let srv = TestServer::spawn().await;
    let (_, owner_session, _, worker_role) = owner_with_roles(&srv).await;
    let (_, worker_session, membership_id) = join(&srv, &owner_session, "wu@mowers.test", &worker_role).await;

    assert_eq!(srv.get("/me", &worker_session).send().await.unwrap().status(), StatusCode::OK);

    let res = srv
        .post(&format!("/team/members/{membership_id}/deactivate"), &owner_session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv.get("/me", &worker_session).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(body(res).await["reason"], "deactivated");
}

#[tokio::test]
async fn other_tenants_cannot_touch_a_membership() {
    let srv = TestServer::spawn().await;
    let (_, owner_session, _, worker_role) = owner_with_roles(&srv).await;
    let (_, _, membership_id) = join(&srv, &owner_session, "wu@mowers.test", &worker_role).await;
    let (_, stranger_session) = srv.login("sly@rival.test", RoleHint::OwnerCapable);

    let res = srv
        .post(&format!("/team/members/{membership_id}/revoke"), &stranger_session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn custom_permissions_replace_the_role_set() {
    let srv = TestServer::spawn().await;
    let (_, owner_session, _, worker_role) = owner_with_roles(&srv).await;
    let (_, worker_session, membership_id) = join(&srv, &owner_session, "wu@mowers.test", &worker_role).await;

    let res = srv
        .put(&format!("/team/members/{membership_id}/permissions"), &owner_session)
        .json(&json!({ "permissions": ["read_clients"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let me = body(srv.get("/me", &worker_session).send().await.unwrap()).await;
    assert_eq!(me["context"]["permissions"], json!(["read_clients"]));
}

#[tokio::test]
async fn the_owner_role_cannot_be_created_or_handed_out() {
    let srv = TestServer::spawn().await;
    let (_, owner_session, _, _) = owner_with_roles(&srv).await;

    let res = srv
        .post("/roles", &owner_session)
        .json(&json!({ "name": "owner", "permissions": [], "rank": "manager" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let roles = body(srv.get("/roles", &owner_session).send().await.unwrap()).await;
    let owner_role = roles["roles"][0].clone();
    assert_eq!(owner_role["name"], "Owner");

    let (member, _) = srv.login("mo@mowers.test", RoleHint::Member);
    let res = srv
        .post("/team/invites", &owner_session)
        .json(&json!({ "member_id": member.id, "role_id": owner_role["id"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

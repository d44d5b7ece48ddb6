use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio_stream::StreamExt;

use classroom_auth::IdentityClaims;
use classroom_auth::claims::{AppMetadata, UserMetadata};
use classroom_core::{AuthUserId, OrganizationId};
use classroom_infra::{AppConfig, InMemoryStore, Store};

const JWT_SECRET: &str = "test-secret";

type LiveSocket = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory store, ephemeral port.
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let app = classroom_api::app::build_app(AppConfig::in_memory(JWT_SECRET), store);
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
            client: reqwest::Client::new(),
            handle,
        }
    }

    async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut req = self.client.get(format!("{}{}", self.base_url, path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut req = self.client.post(format!("{}{}", self.base_url, path)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn open_live_socket(&self) -> LiveSocket {
        let url = format!("{}/ws/live", self.base_url.replacen("http://", "ws://", 1));
        let (socket, _) = tokio_tungstenite::connect_async(url)
            .await
            .expect("failed to open live socket");
        socket
    }
}

/// Next text frame as JSON; fails after a few seconds of silence.
async fn next_broadcast(socket: &mut LiveSocket) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("no broadcast within 5s")
            .expect("live socket closed")
            .expect("live socket error");
        if frame.is_text() {
            return serde_json::from_str(frame.to_text().unwrap()).unwrap();
        }
    }
}

async fn assert_quiet(socket: &mut LiveSocket) {
    let next = tokio::time::timeout(Duration::from_millis(200), socket.next()).await;
    assert!(next.is_err(), "unexpected frame: {next:?}");
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A person as the identity provider sees them.
struct Identity {
    email: String,
    org: Option<OrganizationId>,
    role: &'static str,
}

impl Identity {
    fn new(email: &str, org: Option<OrganizationId>, role: &'static str) -> Self {
        Self {
            email: email.to_string(),
            org,
            role,
        }
    }

    fn token(&self) -> String {
        mint_token(JWT_SECRET, self, 600)
    }
}

fn mint_token(secret: &str, who: &Identity, ttl_secs: i64) -> String {
    let now = Utc::now().timestamp();
    let claims = IdentityClaims {
        sub: AuthUserId::new(),
        email: Some(who.email.clone()),
        exp: now + ttl_secs,
        iat: Some(now - 5),
        app_metadata: AppMetadata {
            organization_id: who.org.map(|o| o.to_string()),
            role: Some(who.role.to_string()),
        },
        user_metadata: UserMetadata::default(),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn str_at<'a>(v: &'a Value, pointer: &str) -> &'a str {
    v.pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string at {pointer} in {v}"))
}

/// Sign in once so the user row exists; returns the app user id.
async fn provision(srv: &TestServer, token: &str) -> String {
    let (status, body) = srv.get("/api/auth/me", Some(token)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    str_at(&body, "/data/appUserId").to_string()
}

/// Lesson with `blocks` blocks, published by an ethics admin. Returns (version id, block ids).
async fn published_lesson(srv: &TestServer, blocks: usize) -> (String, Vec<String>) {
    let author = Identity::new("ethics@platform.test", None, "ethics_admin").token();

    let (status, lesson) = srv
        .post(
            "/api/curriculum/lessons",
            Some(&author),
            json!({ "title": "Fair Play", "gradeBand": "6-8" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{lesson}");

    let (status, version) = srv
        .post(
            "/api/curriculum/publish",
            Some(&author),
            json!({ "lessonId": str_at(&lesson, "/data/id"), "versionLabel": "v1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{version}");
    let version_id = str_at(&version, "/data/id").to_string();

    let mut block_ids = Vec::new();
    for i in 0..blocks {
        let (status, block) = srv
            .post(
                &format!("/api/curriculum/versions/{version_id}/blocks"),
                Some(&author),
                json!({
                    "blockType": "question",
                    "title": format!("Block {}", i + 1),
                    "masteryRules": { "minimumScore": 70 },
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{block}");
        assert_eq!(block["data"]["sequence_no"], json!(i + 1));
        block_ids.push(str_at(&block, "/data/id").to_string());
    }
    (version_id, block_ids)
}

struct Classroom {
    teacher: String,
    student: String,
    class_id: String,
    version_id: String,
    block_ids: Vec<String>,
}

/// Teacher with one class, one enrolled student, and a two-block lesson.
async fn classroom(srv: &TestServer, org: OrganizationId) -> Classroom {
    let teacher = Identity::new("teacher@school.test", Some(org), "teacher").token();
    let student = Identity::new("student@school.test", Some(org), "student").token();
    let student_id = provision(srv, &student).await;

    let (status, class) = srv
        .post(
            "/api/classes",
            Some(&teacher),
            json!({ "name": "Period 3", "gradeBand": "7" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{class}");
    let class_id = str_at(&class, "/data/id").to_string();

    let (status, enrollment) = srv
        .post(
            &format!("/api/classes/{class_id}/enrollments"),
            Some(&teacher),
            json!({ "userId": student_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{enrollment}");

    let (version_id, block_ids) = published_lesson(srv, 2).await;
    Classroom {
        teacher,
        student,
        class_id,
        version_id,
        block_ids,
    }
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv.get("/api/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["ok"], json!(false));
    assert_eq!(body["error"], json!("unauthorized"));

    let forged = mint_token("other-secret", &Identity::new("x@y.test", None, "teacher"), 600);
    let (status, _) = srv.get("/api/auth/me", Some(&forged)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let expired = mint_token(JWT_SECRET, &Identity::new("x@y.test", None, "teacher"), -60);
    let (status, _) = srv.get("/api/auth/me", Some(&expired)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn first_request_provisions_user_context() {
    let srv = TestServer::spawn().await;
    let org = OrganizationId::new();
    let token = Identity::new("Head@School.test", Some(org), "school_admin").token();

    let (status, body) = srv.get("/api/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["data"]["primaryRole"], json!("school_admin"));
    assert_eq!(body["data"]["roles"], json!(["school_admin"]));
    assert_eq!(body["data"]["organizationId"], json!(org.to_string()));
    assert_eq!(body["data"]["email"], json!("Head@School.test"));

    // Same user again resolves to the same record.
    let first = str_at(&body, "/data/appUserId").to_string();
    assert_eq!(provision(&srv, &token).await, first);
}

#[tokio::test]
async fn sign_in_is_delegated_to_identity_provider() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv.post("/api/auth/email/sign-in", None, json!({})).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["ok"], json!(false));

    let (status, body) = srv.post("/api/auth/oauth/google/callback", None, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(false));
}

#[tokio::test]
async fn role_guard_and_organization_requirement() {
    let srv = TestServer::spawn().await;
    let org = OrganizationId::new();

    let student = Identity::new("kid@school.test", Some(org), "student").token();
    let (status, body) = srv
        .post("/api/classes", Some(&student), json!({ "name": "X", "gradeBand": "1" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], json!("forbidden"));

    let homeless = Identity::new("nomad@school.test", None, "teacher").token();
    let (status, body) = srv.get("/api/classes", Some(&homeless)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], json!("User is not assigned to an organization."));
}

#[tokio::test]
async fn invalid_bodies_and_ids_are_rejected() {
    let srv = TestServer::spawn().await;
    let teacher = Identity::new("t@school.test", Some(OrganizationId::new()), "teacher").token();

    let (status, body) = srv.get("/api/classes/not-a-uuid/roster", Some(&teacher)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("invalid_id"));

    let (status, body) = srv
        .post("/api/classes", Some(&teacher), json!({ "name": "   ", "gradeBand": "7" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("validation_error"));

    let (status, body) = srv.post("/api/classes", Some(&teacher), json!({ "name": "A" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], json!(false));
}

#[tokio::test]
async fn independent_study_flow() {
    let srv = TestServer::spawn().await;
    let org = OrganizationId::new();
    let room = classroom(&srv, org).await;

    let (status, roster) = srv
        .get(&format!("/api/classes/{}/roster", room.class_id), Some(&room.teacher))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(roster["data"][0]["email"], json!("student@school.test"));
    assert_eq!(roster["data"][0]["status"], json!("active"));

    let (status, assignment) = srv
        .post(
            "/api/assignments",
            Some(&room.teacher),
            json!({ "classId": room.class_id, "lessonVersionId": room.version_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{assignment}");
    let assignment_id = str_at(&assignment, "/data/id").to_string();

    let (status, mine) = srv.get("/api/assignments/my", Some(&room.student)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine["data"][0]["id"], json!(assignment_id));

    let start_path = format!("/api/assignments/{assignment_id}/start");
    let (status, attempt) = srv.post(&start_path, Some(&room.student), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{attempt}");
    assert_eq!(attempt["data"]["progress_percent"], json!(0));
    let attempt_id = str_at(&attempt, "/data/id").to_string();

    // Starting again returns the same attempt.
    let (_, again) = srv.post(&start_path, Some(&room.student), json!({})).await;
    assert_eq!(again["data"]["id"], json!(attempt_id));
    assert_eq!(again["data"]["started_at"], attempt["data"]["started_at"]);

    let (status, progress) = srv
        .post(
            "/api/independent/progress",
            Some(&room.student),
            json!({
                "attemptId": attempt_id,
                "lessonBlockId": room.block_ids[0],
                "status": "completed",
                "score": 90,
                "confidence": 4,
                "responsePayload": { "answer": "b" },
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{progress}");
    assert_eq!(progress["data"]["progressPercent"], json!(50));

    let next_path = format!("/api/independent/attempts/{attempt_id}/next-step");
    let (status, next) = srv.get(&next_path, Some(&room.student)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(next["data"]["reason"], json!("next_unlocked_candidate"));
    assert_eq!(next["data"]["nextStep"]["lesson_block_id"], json!(room.block_ids[1]));

    // The class teacher can look at the attempt too.
    let (status, steps) = srv
        .get(&format!("/api/independent/attempts/{attempt_id}"), Some(&room.teacher))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(steps["data"].as_array().unwrap().len(), 1);

    let (status, runtime) = srv
        .get(&format!("/api/independent/attempts/{attempt_id}/runtime"), Some(&room.student))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(runtime["data"].as_array().unwrap().len(), 2);
    assert_eq!(runtime["data"][0]["status"], json!("completed"));
    assert!(runtime["data"][1]["status"].is_null());

    // A different student of the same organization is kept out.
    let other = Identity::new("other@school.test", Some(org), "student").token();
    let (status, _) = srv.get(&next_path, Some(&other)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = srv
        .post(
            "/api/independent/progress",
            Some(&other),
            json!({
                "attemptId": attempt_id,
                "lessonBlockId": room.block_ids[1],
                "status": "completed",
                "responsePayload": {},
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = srv.post(&start_path, Some(&other), json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn live_session_pacing_and_guest_join() {
    let srv = TestServer::spawn().await;
    let org = OrganizationId::new();
    let room = classroom(&srv, org).await;

    let (status, started) = srv
        .post(
            "/api/live/sessions/start",
            Some(&room.teacher),
            json!({ "classId": room.class_id, "lessonVersionId": room.version_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{started}");
    let session_id = str_at(&started, "/data/id").to_string();
    let code = str_at(&started, "/data/session_code").to_string();
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

    // Codes are typed by hand; case and padding do not matter.
    let (status, joined) = srv
        .post(
            "/api/auth/guest/join-session",
            None,
            json!({ "sessionCode": format!(" {} ", code.to_lowercase()), "displayName": "Visitor" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{joined}");
    assert_eq!(joined["data"]["liveSessionId"], json!(session_id));

    let state_path = format!("/api/live/sessions/{session_id}/state");
    let (status, state) = srv.get(&state_path, Some(&room.student)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["data"]["activeBlock"]["id"], json!(room.block_ids[0]));
    assert_eq!(state["data"]["recentEvents"], json!([]));

    for (event_type, payload) in [
        ("next_block", json!({})),
        ("lock", json!({})),
        ("pin_answer", json!({ "answer": "42" })),
    ] {
        let (status, event) = srv
            .post(
                "/api/live/sessions/event",
                Some(&room.teacher),
                json!({ "liveSessionId": session_id, "eventType": event_type, "eventPayload": payload }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{event}");
    }

    let (_, state) = srv.get(&state_path, Some(&room.student)).await;
    assert_eq!(state["data"]["activeBlock"]["id"], json!(room.block_ids[1]));
    assert_eq!(state["data"]["pacing"]["locked"], json!(true));
    assert_eq!(state["data"]["pacing"]["pinnedAnswer"], json!("42"));
    let recent = state["data"]["recentEvents"].as_array().unwrap();
    assert_eq!(recent.len(), 3);
    assert_eq!(recent[0]["event_type"], json!("pin_answer"));
    assert_eq!(recent[0]["sequence_no"], json!(3));

    // Students answer; only hosts pace.
    let (status, _) = srv
        .post(
            "/api/live/responses",
            Some(&room.student),
            json!({
                "liveSessionId": session_id,
                "lessonBlockId": room.block_ids[1],
                "responsePayload": { "choice": "a" },
                "confidence": 3,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = srv
        .post(
            "/api/live/sessions/event",
            Some(&room.student),
            json!({ "liveSessionId": session_id, "eventType": "next_block" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let end_path = format!("/api/live/sessions/{session_id}/end");
    let (status, ended) = srv.post(&end_path, Some(&room.teacher), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let ended_at = ended["data"]["ended_at"].clone();
    assert!(!ended_at.is_null());
    let (_, again) = srv.post(&end_path, Some(&room.teacher), json!({})).await;
    assert_eq!(again["data"]["ended_at"], ended_at);

    let (status, _) = srv
        .post(
            "/api/live/sessions/event",
            Some(&room.teacher),
            json!({ "liveSessionId": session_id, "eventType": "next_block" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = srv
        .post(
            "/api/auth/guest/join-session",
            None,
            json!({ "sessionCode": code, "displayName": "Late" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn guest_join_respects_policy() {
    let srv = TestServer::spawn().await;
    let org = OrganizationId::new();
    let room = classroom(&srv, org).await;

    let admin = Identity::new("admin@school.test", Some(org), "school_admin").token();
    let (status, saved) = srv
        .post(
            "/api/policy/settings",
            Some(&admin),
            json!({ "dataRetentionDays": 365, "allowGuestLiveJoin": false, "piiFilterLevel": "strict" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{saved}");

    let (_, started) = srv
        .post(
            "/api/live/sessions/start",
            Some(&room.teacher),
            json!({ "classId": room.class_id, "lessonVersionId": room.version_id }),
        )
        .await;
    let code = str_at(&started, "/data/session_code").to_string();

    let (status, body) = srv
        .post(
            "/api/auth/guest/join-session",
            None,
            json!({ "sessionCode": code, "displayName": "Visitor" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

    let (status, _) = srv
        .post(
            "/api/auth/guest/join-session",
            None,
            json!({ "sessionCode": "ABC", "displayName": "Visitor" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn policy_settings_are_scoped() {
    let srv = TestServer::spawn().await;
    let org_a = OrganizationId::new();
    let org_b = OrganizationId::new();
    let admin_a = Identity::new("a@school.test", Some(org_a), "school_admin").token();

    let (status, body) = srv
        .post(
            "/api/policy/settings",
            Some(&admin_a),
            json!({ "dataRetentionDays": 10, "allowGuestLiveJoin": true, "piiFilterLevel": "standard" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = srv.get(&format!("/api/policy/settings/{org_a}"), Some(&admin_a)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].is_null());

    let (status, _) = srv.get(&format!("/api/policy/settings/{org_b}"), Some(&admin_a)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let ethics = Identity::new("ethics@platform.test", None, "ethics_admin").token();
    let (status, body) = srv.get(&format!("/api/policy/settings/{org_b}"), Some(&ethics)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn moderation_and_audit_visibility() {
    let srv = TestServer::spawn().await;
    let org_a = OrganizationId::new();
    let org_b = OrganizationId::new();
    let teacher_a = Identity::new("t@a.test", Some(org_a), "teacher").token();
    let admin_b = Identity::new("admin@b.test", Some(org_b), "school_admin").token();
    let ethics = Identity::new("ethics@platform.test", None, "ethics_admin").token();

    let (status, flag) = srv
        .post(
            "/api/moderation/flags",
            Some(&teacher_a),
            json!({ "sourceType": "live_response", "sourceId": uuid::Uuid::now_v7(), "flagReason": "pii" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{flag}");
    let flag_id = str_at(&flag, "/data/id").to_string();
    assert_eq!(flag["data"]["resolution_status"], json!("open"));

    let (_, open_b) = srv.get("/api/moderation/flags/open", Some(&admin_b)).await;
    assert_eq!(open_b["data"], json!([]));
    let (status, _) = srv
        .post(
            &format!("/api/moderation/flags/{flag_id}/resolve"),
            Some(&admin_b),
            json!({ "resolution": "dismissed" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, open_all) = srv.get("/api/moderation/flags/open", Some(&ethics)).await;
    assert_eq!(open_all["data"][0]["id"], json!(flag_id));
    let (status, resolved) = srv
        .post(
            &format!("/api/moderation/flags/{flag_id}/resolve"),
            Some(&ethics),
            json!({ "resolution": "resolved" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["data"]["resolution_status"], json!("resolved"));
    let (_, open_all) = srv.get("/api/moderation/flags/open", Some(&ethics)).await;
    assert_eq!(open_all["data"], json!([]));

    let (status, _) = srv
        .post(
            "/api/audit/log",
            Some(&teacher_a),
            json!({ "actionKey": "export.csv", "metadata": { "rows": 3 } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, logs_b) = srv.get("/api/audit/logs", Some(&admin_b)).await;
    assert_eq!(logs_b["data"], json!([]));
    let (_, logs_all) = srv.get("/api/audit/logs", Some(&ethics)).await;
    assert_eq!(logs_all["data"][0]["action_key"], json!("export.csv"));
}

#[tokio::test]
async fn teacher_reports_and_csv_export() {
    let srv = TestServer::spawn().await;
    let org = OrganizationId::new();
    let room = classroom(&srv, org).await;

    let (status, overview) = srv.get("/api/reports/teacher/overview", Some(&room.teacher)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview["data"][0]["class_id"], json!(room.class_id));
    assert_eq!(overview["data"][0]["roster_count"], json!(1));

    let (_, assignment) = srv
        .post(
            "/api/assignments",
            Some(&room.teacher),
            json!({ "classId": room.class_id, "lessonVersionId": room.version_id }),
        )
        .await;
    let (_, attempt) = srv
        .post(
            &format!("/api/assignments/{}/start", str_at(&assignment, "/data/id")),
            Some(&room.student),
            json!({}),
        )
        .await;
    srv.post(
        "/api/independent/progress",
        Some(&room.student),
        json!({
            "attemptId": str_at(&attempt, "/data/id"),
            "lessonBlockId": room.block_ids[0],
            "status": "completed",
            "score": 80,
            "responsePayload": {},
        }),
    )
    .await;

    let res = srv
        .client
        .get(format!("{}/api/reports/teacher/export.csv", srv.base_url))
        .bearer_auth(&room.teacher)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let content_type = res.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/csv"));
    let disposition = res.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.contains("teacher-report.csv"));

    let csv = res.text().await.unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "class_name,student_email,score,submitted_at");
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("\"Period 3\",\"student@school.test\",\"80\","));

    // School and platform reports are role-gated.
    let (status, _) = srv.get("/api/reports/school/usage", Some(&room.teacher)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let ethics = Identity::new("ethics@platform.test", None, "ethics_admin").token();
    let (status, funnel) = srv.get("/api/reports/global/funnel", Some(&ethics)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(funnel["data"], json!([]));
}

#[tokio::test]
async fn tenants_are_isolated() {
    let srv = TestServer::spawn().await;
    let org_a = OrganizationId::new();
    let room = classroom(&srv, org_a).await;

    let outsider = Identity::new("t@other.test", Some(OrganizationId::new()), "teacher").token();
    let (status, _) = srv
        .get(&format!("/api/classes/{}/roster", room.class_id), Some(&outsider))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, classes) = srv.get("/api/classes", Some(&outsider)).await;
    assert_eq!(classes["data"], json!([]));

    // A teacher of the same organization who does not own the class.
    let colleague = Identity::new("colleague@school.test", Some(org_a), "teacher").token();
    let (status, _) = srv
        .get(&format!("/api/classes/{}/roster", room.class_id), Some(&colleague))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = srv
        .post(
            "/api/live/sessions/start",
            Some(&colleague),
            json!({ "classId": room.class_id, "lessonVersionId": room.version_id }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // School admins see every class of their organization.
    let admin = Identity::new("admin@school.test", Some(org_a), "school_admin").token();
    let (_, classes) = srv.get("/api/classes", Some(&admin)).await;
    assert_eq!(classes["data"][0]["id"], json!(room.class_id));
}

#[tokio::test]
async fn live_sockets_receive_every_broadcast() {
    let srv = TestServer::spawn().await;
    let room = classroom(&srv, OrganizationId::new()).await;

    let (_, started) = srv
        .post(
            "/api/live/sessions/start",
            Some(&room.teacher),
            json!({ "classId": room.class_id, "lessonVersionId": room.version_id }),
        )
        .await;
    let session_id = str_at(&started, "/data/id").to_string();

    let mut projector = srv.open_live_socket().await;
    let mut tablet = srv.open_live_socket().await;

    for event_type in ["next_block", "reveal_results"] {
        let (status, _) = srv
            .post(
                "/api/live/sessions/event",
                Some(&room.teacher),
                json!({ "liveSessionId": session_id, "eventType": event_type }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    let end_path = format!("/api/live/sessions/{session_id}/end");
    let (status, _) = srv.post(&end_path, Some(&room.teacher), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    // A repeated end is answered but not announced again.
    let (status, _) = srv.post(&end_path, Some(&room.teacher), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    for socket in [&mut projector, &mut tablet] {
        let first = next_broadcast(socket).await;
        assert_eq!(first["type"], json!("live_event"));
        assert_eq!(first["liveSessionId"], json!(session_id));
        assert_eq!(first["sequenceNo"], json!(1));
        assert_eq!(first["eventType"], json!("next_block"));
        assert_eq!(first["eventPayload"], json!({}));

        let second = next_broadcast(socket).await;
        assert_eq!(second["sequenceNo"], json!(2));
        assert_eq!(second["eventType"], json!("reveal_results"));

        let ended = next_broadcast(socket).await;
        assert_eq!(ended, json!({ "type": "session_ended", "liveSessionId": session_id }));

        assert_quiet(socket).await;
    }

    // One viewer leaving does not cut off the other.
    projector.close(None).await.unwrap();
    let (_, restarted) = srv
        .post(
            "/api/live/sessions/start",
            Some(&room.teacher),
            json!({ "classId": room.class_id, "lessonVersionId": room.version_id }),
        )
        .await;
    let next_session = str_at(&restarted, "/data/id").to_string();
    srv.post(
        &format!("/api/live/sessions/{next_session}/end"),
        Some(&room.teacher),
        json!({}),
    )
    .await;
    let ended = next_broadcast(&mut tablet).await;
    assert_eq!(ended["liveSessionId"], json!(next_session));
}

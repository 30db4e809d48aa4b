// Integration tests for the Management API client against a local stub directory
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use actix_web::{http::Method, test, web, App, HttpRequest, HttpResponse, HttpServer};
use revokrs::directory::{AccountMutator, DirectoryError, ManagementApiClient, UserIdentifier};
use revokrs::dispatch::EventDispatcher;
use revokrs::handlers::configure_routes;
use revokrs::settings::DirectorySettings;
use revokrs::testing::fixtures::{NotificationTokenBuilder, TEST_BUNDLE_ID, TEST_SUB};
use revokrs::testing::CountingJwksSource;
use revokrs::{KeyProvider, NotificationService, TokenVerifier};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
struct RecordedRequest {
    method: Method,
    path: String,
    authorization: Option<String>,
    body: Value,
}

struct StubDirectory {
    requests: Mutex<Vec<RecordedRequest>>,
    token_requests: AtomicUsize,
    token_expires_in: i64,
    user_status: u16,
}

impl StubDirectory {
    fn user_requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn stub_handler(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<StubDirectory>,
) -> HttpResponse {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    if req.path() == "/oauth/token" {
        state.token_requests.fetch_add(1, Ordering::SeqCst);
        assert_eq!(body["grant_type"], "client_credentials");
        assert_eq!(body["client_id"], "stub-client");
        return HttpResponse::Ok().json(json!({
            "access_token": "stub-access-token",
            "token_type": "Bearer",
            "expires_in": state.token_expires_in,
        }));
    }

    state.requests.lock().unwrap().push(RecordedRequest {
        method: req.method().clone(),
        path: req.uri().path().to_string(),
        authorization: req
            .headers()
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body,
    });

    HttpResponse::build(actix_web::http::StatusCode::from_u16(state.user_status).unwrap())
        .json(json!({ "statusCode": state.user_status }))
}

async fn start_stub(user_status: u16) -> (SocketAddr, web::Data<StubDirectory>) {
    start_stub_with_token_lifetime(user_status, 86_400).await
}

async fn start_stub_with_token_lifetime(
    user_status: u16,
    token_expires_in: i64,
) -> (SocketAddr, web::Data<StubDirectory>) {
    let state = web::Data::new(StubDirectory {
        requests: Mutex::new(Vec::new()),
        token_requests: AtomicUsize::new(0),
        token_expires_in,
        user_status,
    });

    let app_state = state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .default_service(web::to(stub_handler))
    })
    .workers(1)
    .disable_signals()
    .bind(("127.0.0.1", 0))
    .unwrap();

    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());
    (addr, state)
}

fn client_for(addr: SocketAddr) -> ManagementApiClient {
    let settings = DirectorySettings {
        domain: format!("http://{addr}"),
        client_id: "stub-client".to_string(),
        client_secret: "stub-secret".to_string(),
        ..DirectorySettings::default()
    };
    ManagementApiClient::from_settings(reqwest::Client::new(), &settings).unwrap()
}

#[actix_web::test]
async fn test_access_token_is_reused_across_calls() {
    let (addr, stub) = start_stub(204).await;
    let client = client_for(addr);
    let user = UserIdentifier::new("apple", "000123.abc");

    client.delete_user(&user).await.unwrap();
    client.block_user(&user).await.unwrap();
    client.patch_user(&user, "new@example.com").await.unwrap();

    assert_eq!(stub.token_requests.load(Ordering::SeqCst), 1);

    let requests = stub.user_requests();
    assert_eq!(requests.len(), 3);
    assert!(requests
        .iter()
        .all(|r| r.authorization.as_deref() == Some("Bearer stub-access-token")));

    assert_eq!(requests[0].method, Method::DELETE);
    assert_eq!(requests[0].path, "/api/v2/users/apple%7C000123.abc");

    assert_eq!(requests[1].method, Method::PATCH);
    assert_eq!(requests[1].body, json!({ "blocked": true }));

    assert_eq!(requests[2].method, Method::PATCH);
    assert_eq!(requests[2].body, json!({ "email": "new@example.com" }));
}

#[actix_web::test]
async fn test_delete_of_missing_user_succeeds() {
    let (addr, stub) = start_stub(404).await;
    let client = client_for(addr);

    client
        .delete_user(&UserIdentifier::new("apple", "gone"))
        .await
        .unwrap();
    assert_eq!(stub.user_requests().len(), 1);
}

#[actix_web::test]
async fn test_missing_user_on_block_is_an_error() {
    let (addr, _stub) = start_stub(404).await;
    let client = client_for(addr);

    let err = client
        .block_user(&UserIdentifier::new("apple", "gone"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DirectoryError::Status {
            operation: "block",
            status: 404,
            ..
        }
    ));
}

#[actix_web::test]
async fn test_server_error_surfaces_status() {
    let (addr, _stub) = start_stub(500).await;
    let client = client_for(addr);

    let err = client
        .delete_user(&UserIdentifier::new("apple", "u1"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DirectoryError::Status {
            operation: "delete",
            status: 500,
            ..
        }
    ));
}

#[actix_web::test]
async fn test_out_of_range_token_lifetime_is_a_token_error() {
    let (addr, stub) = start_stub_with_token_lifetime(204, i64::MAX).await;
    let client = client_for(addr);
    let user = UserIdentifier::new("apple", "u1");

    let err = client.delete_user(&user).await.unwrap_err();
    assert!(matches!(err, DirectoryError::Token(_)));

    // Nothing is cached, so the next call asks for a token again
    let err = client.block_user(&user).await.unwrap_err();
    assert!(matches!(err, DirectoryError::Token(_)));
    assert_eq!(stub.token_requests.load(Ordering::SeqCst), 2);
    assert!(stub.user_requests().is_empty());
}

#[actix_web::test]
async fn test_unreachable_directory_is_a_request_error() {
    // Bind then drop a listener to get a port with nothing behind it
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let client = client_for(addr);

    let err = client
        .block_user(&UserIdentifier::new("apple", "u1"))
        .await
        .unwrap_err();
    assert!(matches!(err, DirectoryError::Token(_)));
}

#[actix_web::test]
async fn test_notification_reaches_directory_end_to_end() {
    let (addr, stub) = start_stub(200).await;

    let jwks = Arc::new(CountingJwksSource::new(
        revokrs::testing::fixtures::test_jwks(),
    ));
    let service = NotificationService::new(
        TokenVerifier::new(KeyProvider::new(jwks)),
        EventDispatcher::new(Arc::new(client_for(addr))),
        TEST_BUNDLE_ID,
        "apple",
    );
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(service))
            .configure(|cfg| configure_routes(cfg, "/apple/notifications")),
    )
    .await;

    let token = NotificationTokenBuilder::new()
        .event("consent-revoked", TEST_SUB, None)
        .build();
    let req = test::TestRequest::post()
        .uri("/apple/notifications")
        .set_json(json!({ "payload": token }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body, json!({"status": "success", "type": "consent-revoked"}));

    let requests = stub.user_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::PATCH);
    assert_eq!(
        requests[0].path,
        format!("/api/v2/users/apple%7C{TEST_SUB}")
    );
    assert_eq!(requests[0].body, json!({ "blocked": true }));
}

//! Session renewal against a mock API

use pumpline_http::{
    ClientError, GraphQlRequest, HttpRenewer, RenewalError, SessionClient, SessionListener,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FRESH_COOKIE: &str = "session=fresh";

fn counting_listener() -> (Arc<AtomicUsize>, Arc<dyn SessionListener>) {
    let count = Arc::new(AtomicUsize::new(0));
    let listener: Arc<dyn SessionListener> = {
        let count = count.clone();
        Arc::new(move |_: &RenewalError| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    };
    (count, listener)
}

/// Serve `route` with 200 only to callers holding the fresh session cookie
async fn mount_protected(server: &MockServer, route: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .and(header("cookie", FRESH_COOKIE))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(401).set_body_string("session expired"))
        .mount(server)
        .await;
}

async fn mount_refresh(server: &MockServer, delay: Duration, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(204)
                .insert_header("set-cookie", "session=fresh; Path=/")
                .set_delay(delay),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_expired_session_is_renewed_and_replayed() {
    let server = MockServer::start().await;
    mount_protected(&server, "/api/loyalty", json!({ "points": 420 })).await;
    mount_refresh(&server, Duration::ZERO, 1).await;

    let client = SessionClient::new(server.uri()).unwrap();
    let loyalty: Value = client.get_json("/api/loyalty").await.unwrap();

    assert_eq!(loyalty["points"], 420);
    assert_eq!(client.coordinator().renewal_count(), 1);
}

#[tokio::test]
async fn test_concurrent_failures_trigger_one_renewal() {
    let server = MockServer::start().await;
    mount_protected(&server, "/api/prices", json!({ "diesel": 1.71 })).await;
    mount_refresh(&server, Duration::from_millis(300), 1).await;

    let client = SessionClient::new(server.uri()).unwrap();
    let results = futures::future::join_all(
        (0..5).map(|_| client.get_json::<Value>("/api/prices")),
    )
    .await;

    for result in results {
        assert_eq!(result.unwrap()["diesel"], 1.71);
    }
    assert_eq!(client.coordinator().renewal_count(), 1);

    let prices_hits = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/api/prices")
        .count();
    assert_eq!(prices_hits, 10);
}

#[tokio::test]
async fn test_rejected_renewal_fails_every_request() {
    let server = MockServer::start().await;
    mount_protected(&server, "/api/coupons", json!([])).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_string("refresh token revoked")
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (expired, listener) = counting_listener();
    let client = SessionClient::builder()
        .base_url(server.uri())
        .session_listener(listener)
        .build()
        .unwrap();

    let results = futures::future::join_all(
        (0..3).map(|_| client.get_json::<Value>("/api/coupons")),
    )
    .await;

    for result in results {
        match result {
            Err(ClientError::RenewalFailed(RenewalError::Rejected { status, message })) => {
                assert_eq!(status, 401);
                assert_eq!(message, "refresh token revoked");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
    assert_eq!(expired.load(Ordering::SeqCst), 1);
    assert!(!client.coordinator().is_refreshing());
}

#[tokio::test]
async fn test_unreachable_refresh_endpoint() {
    let server = MockServer::start().await;
    mount_protected(&server, "/api/orders", json!([])).await;

    // Port 9 (discard) is closed on test machines, so the connection is refused
    let renewer = HttpRenewer::new(reqwest_client(), "http://127.0.0.1:9/auth/refresh", None);
    let (expired, listener) = counting_listener();
    let client = SessionClient::builder()
        .base_url(server.uri())
        .renewer(Arc::new(renewer))
        .session_listener(listener)
        .build()
        .unwrap();

    let result = client.get_json::<Value>("/api/orders").await;
    assert!(matches!(
        result,
        Err(ClientError::RenewalFailed(RenewalError::Transport(_)))
    ));
    assert_eq!(expired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_slow_renewal_times_out() {
    let server = MockServer::start().await;
    mount_protected(&server, "/api/orders", json!([])).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let (expired, listener) = counting_listener();
    let client = SessionClient::builder()
        .base_url(server.uri())
        .renewal_timeout(Duration::from_millis(100))
        .session_listener(listener)
        .build()
        .unwrap();

    let result = client.get_json::<Value>("/api/orders").await;
    assert!(matches!(
        result,
        Err(ClientError::RenewalFailed(RenewalError::Timeout(_)))
    ));
    assert_eq!(expired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_replay_is_attempted_only_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/admin/stations"))
        .respond_with(ResponseTemplate::new(401).set_body_string("still expired"))
        .expect(2)
        .mount(&server)
        .await;
    mount_refresh(&server, Duration::ZERO, 1).await;

    let client = SessionClient::new(server.uri()).unwrap();
    let result = client.get_json::<Value>("/api/admin/stations").await;

    assert!(matches!(result, Err(ClientError::AuthenticationFailed(ref m)) if m == "still expired"));
}

#[tokio::test]
async fn test_non_auth_errors_do_not_renew() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/media"))
        .respond_with(ResponseTemplate::new(500).set_body_string("storage offline"))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, Duration::ZERO, 0).await;

    let client = SessionClient::new(server.uri()).unwrap();
    let result = client.get_json::<Value>("/api/media").await;

    assert!(matches!(
        result,
        Err(ClientError::ServerError { status: 500, .. })
    ));
    assert_eq!(client.coordinator().renewal_count(), 0);
}

#[tokio::test]
async fn test_graphql_unauthenticated_triggers_renewal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("cookie", FRESH_COOKIE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "fuelPrices": [{ "grade": "E10", "price": 1.799 }] }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{ "message": "Not authenticated", "extensions": { "code": "UNAUTHENTICATED" } }]
        })))
        .mount(&server)
        .await;
    mount_refresh(&server, Duration::ZERO, 1).await;

    let client = SessionClient::new(server.uri()).unwrap();
    let data: Value = client
        .graphql(&GraphQlRequest::<Value>::new("{ fuelPrices { grade price } }"))
        .await
        .unwrap();

    assert_eq!(data["fuelPrices"][0]["grade"], "E10");
}

#[tokio::test]
async fn test_renewal_through_graphql_mutation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("refreshToken"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "session=fresh; Path=/")
                .set_body_json(json!({ "data": { "refreshToken": true } })),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_protected(&server, "/api/profile", json!({ "name": "Ada" })).await;

    let client = SessionClient::builder()
        .base_url(server.uri())
        .renewal_path("/graphql")
        .renewal_mutation("mutation { refreshToken }")
        .build()
        .unwrap();

    let profile: Value = client.get_json("/api/profile").await.unwrap();
    assert_eq!(profile["name"], "Ada");
}

#[tokio::test]
async fn test_graphql_mutation_errors_reject_renewal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{ "message": "Refresh token expired" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = SessionClient::builder()
        .base_url(server.uri())
        .renewal_path("/graphql")
        .renewal_mutation("mutation { refreshToken }")
        .build()
        .unwrap();

    let result = client.renew_session().await;
    assert_eq!(
        result,
        Err(RenewalError::Rejected {
            status: 200,
            message: "Refresh token expired".into(),
        })
    );
}

#[tokio::test]
async fn test_clients_sharing_a_coordinator_share_the_wave() {
    let server = MockServer::start().await;
    mount_refresh(&server, Duration::from_millis(300), 1).await;

    let first = SessionClient::new(server.uri()).unwrap();
    let second = SessionClient::builder()
        .base_url(server.uri())
        .coordinator(first.coordinator().clone())
        .build()
        .unwrap();

    // The second client has its own cookie jar, so only the renewal is shared
    let (a, b) = tokio::join!(first.renew_session(), second.renew_session());
    assert_eq!(a, Ok(()));
    assert_eq!(b, Ok(()));
    assert_eq!(first.coordinator().renewal_count(), 1);
}

fn reqwest_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

use super::*;
use crate::predicate::QueryTerm;
use crate::response::ResponseBody;
use crate::rewrite::RewriteReplacement;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn interceptor() -> Interceptor {
    Interceptor::new()
}

fn json_stub(interceptor: &Interceptor, body: serde_json::Value) -> StubResponse {
    StubResponse::from_body(
        ResponseBody::Json(body),
        None,
        None,
        None,
        None,
        &interceptor.defaults(),
    )
    .unwrap()
}

fn upstream_ok() -> HttpResponse {
    HttpResponse::new(200)
        .with_header("Content-Type", "text/html")
        .with_body(b"<real>".to_vec())
}

/// Forwarder that counts invocations and returns a canned upstream response.
fn counting_forwarder(
    count: Arc<AtomicUsize>,
) -> impl Fn(HttpRequest) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<HttpResponse, TransportError>> + Send>>
{
    move |_req| {
        count.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(upstream_ok()) })
    }
}

#[tokio::test]
async fn test_stub_short_circuits_network() {
    let shim = interceptor();
    shim.stub_requests(
        RequestMatch::url(r".*/login$"),
        json_stub(&shim, serde_json::json!({"ok": true})),
    )
    .unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let response = shim
        .process(
            HttpRequest::new("POST", "https://x/login"),
            counting_forwarder(Arc::clone(&hits)),
        )
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, br#"{"ok":true}"#);
    assert_eq!(response.header("content-type"), Some("application/json"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unmatched_request_passes_through() {
    let shim = interceptor();
    shim.stub_requests(
        RequestMatch::url(r".*/login$"),
        json_stub(&shim, serde_json::json!({"ok": true})),
    )
    .unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let response = shim
        .process(
            HttpRequest::new("GET", "https://x/profile"),
            counting_forwarder(Arc::clone(&hits)),
        )
        .await
        .unwrap();

    assert_eq!(response.body, b"<real>");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    // Nothing monitored: no monitor rule registered.
    assert!(shim.monitored_peek_all().is_empty());
}

#[tokio::test]
async fn test_stub_iteration_exhaustion() {
    let shim = interceptor();
    let stub = json_stub(&shim, serde_json::json!({"stubbed": true})).with_active_iterations(2);
    let id = shim.stub_requests(RequestMatch::url("/api"), stub).unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    for expected_stubbed in [true, true, false] {
        let response = shim
            .process(
                HttpRequest::new("GET", "https://x/api"),
                counting_forwarder(Arc::clone(&hits)),
            )
            .await
            .unwrap();
        let stubbed = response.body == br#"{"stubbed":true}"#;
        assert_eq!(stubbed, expected_stubbed);
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // The rule auto-removed itself after the second match.
    assert!(!shim.stub_remove(&id));
}

#[tokio::test]
async fn test_first_registered_stub_wins() {
    let shim = interceptor();
    shim.stub_requests(
        RequestMatch::url("/api"),
        json_stub(&shim, serde_json::json!({"which": "first"})),
    )
    .unwrap();
    shim.stub_requests(
        RequestMatch::url("/api"),
        json_stub(&shim, serde_json::json!({"which": "second"})),
    )
    .unwrap();

    let (disposition, _) = shim.intercept(HttpRequest::new("GET", "https://x/api")).await;
    match disposition {
        Disposition::Respond(response) => {
            assert_eq!(response.body, br#"{"which":"first"}"#)
        }
        other => panic!("expected Respond, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stub_and_monitor_both_apply() {
    let shim = interceptor();
    shim.stub_requests(
        RequestMatch::url("/api"),
        json_stub(&shim, serde_json::json!({"ok": true})),
    )
    .unwrap();
    shim.monitor_requests(RequestMatch::any()).unwrap();

    let response = shim
        .process(HttpRequest::new("GET", "https://x/api"), |_req| async {
            panic!("stubbed request must not be forwarded")
        })
        .await
        .unwrap();
    assert_eq!(response.status, 200);

    let monitored = shim.monitored_peek_all();
    assert_eq!(monitored.len(), 1);
    assert!(monitored[0].is_stubbed);
    assert!(!monitored[0].is_rewritten);
    assert_eq!(
        monitored[0].response.as_ref().unwrap().body,
        br#"{"ok":true}"#
    );
}

#[tokio::test]
async fn test_failure_stub_yields_transport_error() {
    let shim = interceptor();
    shim.stub_requests(RequestMatch::url("/flaky"), StubResponse::failure(-1001))
        .unwrap();
    shim.monitor_requests(RequestMatch::any()).unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let err = shim
        .process(
            HttpRequest::new("GET", "https://x/flaky"),
            counting_forwarder(Arc::clone(&hits)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Simulated(-1001)));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    // Recorded with no response attached.
    let monitored = shim.monitored_flush_all();
    assert_eq!(monitored.len(), 1);
    assert!(monitored[0].response.is_none());
}

#[tokio::test]
async fn test_rewrite_applies_to_request_and_response() {
    let shim = interceptor();
    shim.rewrite_requests(
        RequestMatch::url("staging"),
        Rewrite {
            url_replacements: vec![RewriteReplacement::new("staging", "production")],
            response_body_replacements: vec![RewriteReplacement::new("real", "rewritten")],
            response_status_code: Some(418),
            ..Rewrite::default()
        },
    )
    .unwrap();
    shim.monitor_requests(RequestMatch::any()).unwrap();

    let response = shim
        .process(
            HttpRequest::new("GET", "https://staging.example.com/a"),
            |req| async move {
                assert_eq!(req.url, "https://production.example.com/a");
                Ok(upstream_ok())
            },
        )
        .await
        .unwrap();

    assert_eq!(response.status, 418);
    assert_eq!(response.body, b"<rewritten>");

    let monitored = shim.monitored_peek_all();
    assert_eq!(monitored.len(), 1);
    assert!(monitored[0].is_rewritten);
    assert_eq!(
        monitored[0].original_request.url,
        "https://staging.example.com/a"
    );
    assert_eq!(monitored[0].request.url, "https://production.example.com/a");
}

#[tokio::test]
async fn test_stub_takes_precedence_over_rewrite() {
    let shim = interceptor();
    shim.stub_requests(
        RequestMatch::url("/api"),
        json_stub(&shim, serde_json::json!({"stubbed": true})),
    )
    .unwrap();
    shim.rewrite_requests(
        RequestMatch::url("/api"),
        Rewrite {
            response_body_replacements: vec![RewriteReplacement::new("stubbed", "rewritten")],
            active_iterations: Some(1),
            ..Rewrite::default()
        },
    )
    .unwrap();

    let response = shim
        .process(HttpRequest::new("GET", "https://x/api"), |_req| async {
            panic!("must not forward")
        })
        .await
        .unwrap();

    // Stub short-circuits; the rewrite neither applies nor consumes.
    assert_eq!(response.body, br#"{"stubbed":true}"#);
    shim.stub_remove_all();
    let response = shim
        .process(HttpRequest::new("GET", "https://x/api"), |_req| async {
            Ok(HttpResponse::new(200).with_body(b"stubbed".to_vec()))
        })
        .await
        .unwrap();
    assert_eq!(response.body, b"rewritten");
}

#[tokio::test]
async fn test_cookie_block_strips_both_directions() {
    let shim = interceptor();
    shim.block_cookies(RequestMatch::url("/api"), None).unwrap();

    let request = HttpRequest::new("GET", "https://x/api")
        .with_header("Cookie", "session=1")
        .with_header("Accept", "*/*");

    let response = shim
        .process(request, |req| async move {
            assert_eq!(req.header("cookie"), None);
            assert_eq!(req.header("accept"), Some("*/*"));
            Ok(upstream_ok().with_header("Set-Cookie", "session=2"))
        })
        .await
        .unwrap();

    assert_eq!(response.header("set-cookie"), None);
}

#[tokio::test]
async fn test_cookie_block_iterations() {
    let shim = interceptor();
    shim.block_cookies(RequestMatch::url("/api"), Some(1)).unwrap();

    let request = HttpRequest::new("GET", "https://x/api").with_header("Cookie", "c=1");

    shim.process(request.clone(), |req| async move {
        assert_eq!(req.header("cookie"), None);
        Ok(upstream_ok())
    })
    .await
    .unwrap();

    // Budget exhausted: cookies pass through again.
    shim.process(request, |req| async move {
        assert_eq!(req.header("cookie"), Some("c=1"));
        Ok(upstream_ok())
    })
    .await
    .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_throttle_delays_forwarded_response() {
    let shim = interceptor();
    shim.throttle_requests(RequestMatch::url("/slow"), 0.5).unwrap();

    let start = tokio::time::Instant::now();
    shim.process(HttpRequest::new("GET", "https://x/slow"), |_req| async {
        Ok(upstream_ok())
    })
    .await
    .unwrap();
    assert!(start.elapsed() >= Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn test_throttle_applies_to_stubbed_response() {
    let shim = interceptor();
    shim.stub_requests(
        RequestMatch::url("/slow"),
        json_stub(&shim, serde_json::json!({"ok": true})),
    )
    .unwrap();
    shim.throttle_requests(RequestMatch::url("/slow"), 0.25).unwrap();

    let start = tokio::time::Instant::now();
    let (disposition, _) = shim
        .intercept(HttpRequest::new("GET", "https://x/slow"))
        .await;
    assert!(matches!(disposition, Disposition::Respond(_)));
    assert!(start.elapsed() >= Duration::from_millis(250));
}

#[tokio::test]
async fn test_monitor_with_response_header_condition() {
    let shim = interceptor();
    let mut conditions = std::collections::BTreeMap::new();
    conditions.insert("Content-Type".to_string(), "text/html".to_string());
    shim.monitor_requests(RequestMatch::any().with_response_headers(conditions))
        .unwrap();

    // Upstream answers text/html: recorded.
    shim.process(HttpRequest::new("GET", "https://x/a"), |_req| async {
        Ok(upstream_ok())
    })
    .await
    .unwrap();

    // Upstream answers without the header: not recorded.
    shim.process(HttpRequest::new("GET", "https://x/b"), |_req| async {
        Ok(HttpResponse::new(204))
    })
    .await
    .unwrap();

    let monitored = shim.monitored_peek_all();
    assert_eq!(monitored.len(), 1);
    assert_eq!(monitored[0].original_request.url, "https://x/a");
}

#[tokio::test]
async fn test_query_match_routes_to_stub() {
    let shim = interceptor();
    shim.stub_requests(
        RequestMatch::any().with_query(vec![
            QueryTerm::new("&mode=test"),
            QueryTerm::negated("admin=1"),
        ]),
        json_stub(&shim, serde_json::json!({"env": "test"})),
    )
    .unwrap();

    let (disposition, _) = shim
        .intercept(HttpRequest::new("GET", "https://x/a?mode=test"))
        .await;
    assert!(matches!(disposition, Disposition::Respond(_)));

    let (disposition, _) = shim
        .intercept(HttpRequest::new("GET", "https://x/a?mode=test&admin=1"))
        .await;
    assert!(matches!(disposition, Disposition::Forward));
}

#[tokio::test]
async fn test_reset_clears_everything() {
    let shim = interceptor();
    shim.stub_requests(RequestMatch::any(), StubResponse::default())
        .unwrap();
    shim.monitor_requests(RequestMatch::any()).unwrap();
    shim.process(HttpRequest::new("GET", "https://x/a"), |_req| async {
        Ok(upstream_ok())
    })
    .await
    .unwrap();
    assert!(!shim.monitored_peek_all().is_empty());

    shim.reset();
    assert!(shim.active_stubs().is_empty());
    assert!(shim.monitored_peek_all().is_empty());

    let hits = Arc::new(AtomicUsize::new(0));
    shim.process(
        HttpRequest::new("GET", "https://x/a"),
        counting_forwarder(Arc::clone(&hits)),
    )
    .await
    .unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(shim.monitored_peek_all().is_empty());
}

#[tokio::test]
async fn test_active_stub_introspection() {
    let shim = interceptor();
    let id = shim
        .stub_requests(
            RequestMatch::url("/api").with_method("GET"),
            json_stub(&shim, serde_json::json!({"ok": true})),
        )
        .unwrap();

    let stubs = shim.active_stubs();
    assert_eq!(stubs.len(), 1);
    assert_eq!(stubs[0].id, id);
    assert_eq!(stubs[0].match_spec, RequestMatch::url("/api").with_method("GET"));
}

#[tokio::test]
async fn test_concurrent_requests_against_mutating_rules() {
    let shim = Arc::new(interceptor());
    shim.stub_requests(
        RequestMatch::url("/api"),
        json_stub(&shim, serde_json::json!({"ok": true})),
    )
    .unwrap();

    let requests = (0..32).map(|_| {
        let shim = Arc::clone(&shim);
        async move {
            shim.process(HttpRequest::new("GET", "https://x/api"), |_req| async {
                Ok(upstream_ok())
            })
            .await
            .unwrap()
        }
    });
    let churn = {
        let shim = Arc::clone(&shim);
        async move {
            for _ in 0..16 {
                shim.monitor_requests(RequestMatch::any()).unwrap();
                shim.monitor_remove_all();
                tokio::task::yield_now().await;
            }
        }
    };

    let (responses, _) = futures::join!(futures::future::join_all(requests), churn);
    // Every request resolved to either the stub or the upstream, never an error.
    for response in responses {
        assert_eq!(response.status, 200);
    }
}

#[tokio::test]
async fn test_remove_by_match() {
    let shim = interceptor();
    shim.stub_requests(RequestMatch::url("/a"), StubResponse::default())
        .unwrap();
    shim.stub_requests(RequestMatch::url("/b"), StubResponse::default())
        .unwrap();

    assert!(shim.stub_remove_matching(&RequestMatch::url("/a")));
    assert_eq!(shim.active_stubs().len(), 1);
    assert!(!shim.stub_remove_matching(&RequestMatch::url("/a")));
}

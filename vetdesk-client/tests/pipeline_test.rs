//! Request pipeline behaviour against a scripted backend

mod helpers;

use helpers::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use vetdesk_client::{ApiRequest, ApiResponse, HealthMonitor, TransportError};
use vetdesk_core::{EventBus, FailureKind, VetdeskError};

fn refresh_ok() -> Result<ApiResponse, TransportError> {
    Ok(json_response(
        200,
        json!({"accessToken": "access-2", "refreshToken": "refresh-2"}),
    ))
}

fn unauthorized() -> Result<ApiResponse, TransportError> {
    Ok(json_response(401, json!({"detail": "Token expired"})))
}

fn ok() -> Result<ApiResponse, TransportError> {
    Ok(json_response(200, json!({"ok": true})))
}

fn assert_gap(earlier: Instant, later: Instant, expected_ms: u64) {
    let gap = later.duration_since(earlier);
    let expected = Duration::from_millis(expected_ms);
    assert!(
        gap >= expected && gap < expected + Duration::from_millis(10),
        "expected a gap of {:?}, got {:?}",
        expected,
        gap
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_unauthorized_requests_share_one_refresh() {
    let transport = ScriptedTransport::new(|request| {
        if request.path == REFRESH {
            return refresh_ok();
        }
        match request.bearer_token.as_deref() {
            Some("access-2") => ok(),
            _ => unauthorized(),
        }
    })
    .with_delay(REFRESH, Duration::from_millis(500));
    let h = harness(transport, Some(signed_in_session("access-1")));

    let tasks: Vec<_> = (0..5)
        .map(|i| {
            let pipeline = h.pipeline.clone();
            tokio::spawn(async move { pipeline.execute(ApiRequest::get(format!("/animals/{i}"))).await })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().status, 200);
    }

    let refreshes = h.transport.calls_to(REFRESH);
    assert_eq!(refreshes.len(), 1);
    assert_eq!(refreshes[0].bearer, None);
    assert_eq!(refreshes[0].body.as_ref().unwrap()["refreshToken"], "refresh-1");

    for i in 0..5 {
        let calls = h.transport.calls_to(&format!("/animals/{i}"));
        assert_eq!(calls.len(), 2, "request {} should be retried exactly once", i);
        assert_eq!(calls[0].bearer.as_deref(), Some("access-1"));
        assert_eq!(calls[1].bearer.as_deref(), Some("access-2"));
    }

    let session = h.store.get().unwrap();
    assert_eq!(session.access_token, "access-2");
    assert_eq!(session.refresh_token.as_deref(), Some("refresh-2"));
    assert_eq!(h.storage.session_removals(), 0);
    assert!(h.notifier.titles().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_failure_rejects_all_and_clears_once() {
    let transport = ScriptedTransport::new(|request| {
        if request.path == REFRESH {
            return Ok(json_response(401, json!({"detail": "Refresh token revoked"})));
        }
        unauthorized()
    })
    .with_delay(REFRESH, Duration::from_millis(500));
    let h = harness(transport, Some(signed_in_session("access-1")));

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let pipeline = h.pipeline.clone();
            tokio::spawn(async move { pipeline.execute(ApiRequest::get(format!("/stock/{i}"))).await })
        })
        .collect();

    for task in tasks {
        let error = task.await.unwrap().unwrap_err();
        assert_eq!(error.kind(), Some(FailureKind::RefreshFailure));
    }

    assert_eq!(h.transport.calls_to(REFRESH).len(), 1);
    assert_eq!(h.storage.session_removals(), 1);
    assert!(h.store.get().is_none());
    assert_eq!(h.notifier.titles(), vec!["Session expired".to_string()]);

    // Redirect only after the fixed delay
    let failed_at = Instant::now();
    assert!(h.navigator.redirects().is_empty());

    h.pipeline.wait_for_logout().await;

    let redirects = h.navigator.redirects();
    assert_eq!(redirects.len(), 1);
    assert_eq!(redirects[0].0, "/login");
    assert_gap(failed_at, redirects[0].1, 2_000);
}

#[tokio::test(start_paused = true)]
async fn test_unsaved_refresh_fails_leader_and_waiters_alike() {
    let transport = ScriptedTransport::new(|request| {
        if request.path == REFRESH {
            return refresh_ok();
        }
        unauthorized()
    })
    .with_delay(REFRESH, Duration::from_millis(500));
    let h = harness(transport, Some(signed_in_session("access-1")));
    h.storage.reject_writes();

    let tasks: Vec<_> = (0..3)
        .map(|i| {
            let pipeline = h.pipeline.clone();
            tokio::spawn(async move { pipeline.execute(ApiRequest::get(format!("/invoices/{i}"))).await })
        })
        .collect();

    for task in tasks {
        let error = task.await.unwrap().unwrap_err();
        assert_eq!(error.kind(), Some(FailureKind::RefreshFailure));
    }

    assert_eq!(h.transport.calls_to(REFRESH).len(), 1);
    assert!(h.store.get().is_none());
    assert_eq!(h.notifier.titles(), vec!["Session expired".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_missing_refresh_token_fails_without_network_call() {
    let transport = ScriptedTransport::new(|request| {
        if request.path == REFRESH {
            return refresh_ok();
        }
        unauthorized()
    });
    let mut session = signed_in_session("access-1");
    session.refresh_token = None;
    let h = harness(transport, Some(session));

    let error = h
        .pipeline
        .execute(ApiRequest::get("/appointments"))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), Some(FailureKind::RefreshFailure));
    assert!(h.transport.calls_to(REFRESH).is_empty());
    assert!(h.store.get().is_none());

    h.pipeline.wait_for_logout().await;
    assert_eq!(h.navigator.redirects().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_second_unauthorized_surfaces_to_caller() {
    let transport = ScriptedTransport::new(|request| {
        if request.path == REFRESH {
            return refresh_ok();
        }
        unauthorized()
    });
    let h = harness(transport, Some(signed_in_session("access-1")));

    let error = h
        .pipeline
        .execute(ApiRequest::get("/messages"))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), Some(FailureKind::Unauthorized));
    assert_eq!(h.transport.calls_to(REFRESH).len(), 1);
    assert_eq!(h.transport.calls_to("/messages").len(), 2);
    // The refreshed session stays in place
    assert_eq!(h.store.get().unwrap().access_token, "access-2");
    assert!(h.navigator.redirects().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stale_token_retries_without_new_refresh() {
    let transport = ScriptedTransport::new(|request| {
        if request.path == REFRESH {
            return refresh_ok();
        }
        match request.bearer_token.as_deref() {
            Some("access-2") => ok(),
            _ => unauthorized(),
        }
    })
    .with_delay(REFRESH, Duration::from_millis(500))
    .with_delay("/reports", Duration::from_millis(1_000));
    let h = harness(transport, Some(signed_in_session("access-1")));

    let fast = {
        let pipeline = h.pipeline.clone();
        tokio::spawn(async move { pipeline.execute(ApiRequest::get("/animals")).await })
    };
    let slow = {
        let pipeline = h.pipeline.clone();
        tokio::spawn(async move { pipeline.execute(ApiRequest::get("/reports")).await })
    };

    assert!(fast.await.unwrap().is_ok());
    assert!(slow.await.unwrap().is_ok());

    // The slow 401 arrived after the refresh finished
    assert_eq!(h.transport.calls_to(REFRESH).len(), 1);
    let slow_calls = h.transport.calls_to("/reports");
    assert_eq!(slow_calls.len(), 2);
    assert_eq!(slow_calls[1].bearer.as_deref(), Some("access-2"));
}

#[tokio::test(start_paused = true)]
async fn test_server_errors_back_off_then_succeed() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let transport = ScriptedTransport::new(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) < 3 {
            Ok(json_response(500, json!({"detail": "database unavailable"})))
        } else {
            ok()
        }
    });
    let h = harness_with(transport, Some(signed_in_session("access-1")), settings(100));

    let response = h.pipeline.execute(ApiRequest::get("/stock")).await.unwrap();
    assert_eq!(response.status, 200);

    let calls = h.transport.calls_to("/stock");
    assert_eq!(calls.len(), 4);
    assert_gap(calls[0].at, calls[1].at, 100);
    assert_gap(calls[1].at, calls[2].at, 200);
    assert_gap(calls[2].at, calls[3].at, 400);
    assert_eq!(h.pipeline.consecutive_failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transient_retries_are_bounded() {
    let transport = ScriptedTransport::new(|_| Err(TransportError::network("connection refused")));
    let mut settings = settings(50);
    settings.retry.max_retries = 10;
    let h = harness_with(transport, Some(signed_in_session("access-1")), settings);

    let error = h
        .pipeline
        .execute(ApiRequest::get("/animals"))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), Some(FailureKind::NetworkTransient));
    let calls = h.transport.calls();
    assert_eq!(calls.len(), 4);

    let gaps: Vec<Duration> = calls
        .windows(2)
        .map(|pair| pair[1].at.duration_since(pair[0].at))
        .collect();
    assert!(gaps.windows(2).all(|pair| pair[1] > pair[0]));
    assert_eq!(h.pipeline.consecutive_failures(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_no_retry_requests_fail_fast() {
    let transport = ScriptedTransport::new(|_| Ok(json_response(503, json!({}))));
    let h = harness(transport, Some(signed_in_session("access-1")));

    let error = h
        .pipeline
        .execute(ApiRequest::get("/animals").no_retry())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), Some(FailureKind::ServerTransient));
    assert_eq!(error.status(), Some(503));
    assert_eq!(h.transport.calls().len(), 1);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let transport = ScriptedTransport::new(|request| match request.path.as_str() {
        "/forbidden" => Ok(json_response(403, json!({"detail": "Admins only"}))),
        "/busy" => Ok(json_response(429, json!({})).with_header("Retry-After", "3")),
        _ => Ok(json_response(422, json!({"detail": "Species is required"}))),
    });
    let h = harness(transport, Some(signed_in_session("access-1")));

    let invalid = h
        .pipeline
        .execute(ApiRequest::post("/animals", json!({})))
        .await
        .unwrap_err();
    assert_eq!(invalid.kind(), Some(FailureKind::ClientError));
    assert!(h.notifier.titles().is_empty());

    let forbidden = h
        .pipeline
        .execute(ApiRequest::get("/forbidden"))
        .await
        .unwrap_err();
    assert!(forbidden.is_permission_denied());

    let busy = h.pipeline.execute(ApiRequest::get("/busy")).await.unwrap_err();
    assert_eq!(busy.kind(), Some(FailureKind::RateLimited));
    assert_eq!(busy.retry_after_ms(), Some(3_000));

    assert_eq!(h.transport.calls().len(), 3);
    assert_eq!(
        h.notifier.titles(),
        vec!["Access denied".to_string(), "Slow down".to_string()]
    );
}

#[tokio::test]
async fn test_credentials_attached_from_store() {
    let transport = ScriptedTransport::new(|_| ok());
    let h = harness(transport, Some(signed_in_session("access-1")));

    h.pipeline.execute(ApiRequest::get("/profile")).await.unwrap();
    h.pipeline
        .execute(ApiRequest::get("/status").without_auth())
        .await
        .unwrap();
    h.store.clear().unwrap();
    h.pipeline.execute(ApiRequest::get("/profile")).await.unwrap();

    let bearers: Vec<Option<String>> = h
        .transport
        .calls()
        .into_iter()
        .map(|call| call.bearer)
        .collect();
    assert_eq!(bearers, vec![Some("access-1".to_string()), None, None]);
}

#[tokio::test]
async fn test_unauthorized_without_session_skips_refresh() {
    let transport = ScriptedTransport::new(|request| {
        if request.path == REFRESH {
            return refresh_ok();
        }
        unauthorized()
    });
    let h = harness(transport, None);

    let error = h
        .pipeline
        .execute(ApiRequest::get("/animals"))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), Some(FailureKind::Unauthorized));
    assert!(h.transport.calls_to(REFRESH).is_empty());
    assert_eq!(h.storage.session_removals(), 0);
    assert!(h.notifier.titles().is_empty());
}

#[tokio::test]
async fn test_typed_helpers_decode_bodies() {
    #[derive(Debug, serde::Deserialize, serde::Serialize, PartialEq)]
    struct Animal {
        id: u32,
        name: String,
    }

    let transport = ScriptedTransport::new(|request| match request.path.as_str() {
        "/animals/1" => Ok(json_response(200, json!({"id": 1, "name": "Rex"}))),
        "/animals/2" => Ok(ApiResponse::new(200, "<html>not json</html>")),
        "/animals" => {
            let mut body = request.body.clone().unwrap();
            body["id"] = json!(3);
            Ok(json_response(201, body))
        }
        _ => Ok(ApiResponse::new(204, "")),
    });
    let h = harness(transport, Some(signed_in_session("access-1")));

    let rex: Animal = h.pipeline.get_json("/animals/1").await.unwrap();
    assert_eq!(rex, Animal { id: 1, name: "Rex".to_string() });

    let broken = h.pipeline.get_json::<Animal>("/animals/2").await.unwrap_err();
    assert!(matches!(broken, VetdeskError::Serialization(_)));

    let created: Animal = h
        .pipeline
        .post_json("/animals", &json!({"name": "Milo"}))
        .await
        .unwrap();
    assert_eq!(created.id, 3);

    h.pipeline.delete("/animals/3").await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_health_monitor_sees_every_dispatch() {
    let transport = ScriptedTransport::new(|_| Err(TransportError::Timeout(Duration::from_secs(30))));
    let events = EventBus::default();
    let monitor = Arc::new(HealthMonitor::new(events.clone(), 3));

    let h = harness(transport, Some(signed_in_session("access-1")));
    let pipeline = vetdesk_client::RequestPipeline::new(
        h.transport.clone(),
        h.store.clone(),
        settings(10),
    )
    .with_health_observer(monitor.clone());

    let error = pipeline.execute(ApiRequest::get("/animals")).await.unwrap_err();
    assert_eq!(error.kind(), Some(FailureKind::Timeout));
    assert!(!monitor.is_online());
    assert_eq!(monitor.consecutive_failures(), 4);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios: real clients against the mock API.

use std::time::Duration;

use casegate::{Credential, ErrorKind, OutgoingRequest, PipelineError};
use casegate_specs::{client, session_with, wait_until, MockApi, RefreshMode};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn issue(token: &str, delay_ms: u64) -> RefreshMode {
    RefreshMode::Issue { token: token.to_owned(), delay: Duration::from_millis(delay_ms) }
}

fn reject() -> RefreshMode {
    RefreshMode::Reject { status: 401 }
}

fn kind<T>(result: &Result<T, PipelineError>) -> Option<ErrorKind> {
    result.as_ref().err().map(PipelineError::kind)
}

#[tokio::test]
async fn valid_credential_is_attached() -> anyhow::Result<()> {
    let api = MockApi::start("T1", reject()).await?;
    let session = session_with("T1");
    let client = client(api.config(), &session)?;

    let resp = client.get("/api/cases").await?;
    assert_eq!(resp.status.as_u16(), 200);
    assert_eq!(api.bearers_for("/api/cases"), vec![Some("T1".to_owned())]);
    assert_eq!(api.refresh_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn no_credential_sends_no_header() -> anyhow::Result<()> {
    let api = MockApi::start("T1", reject()).await?;
    let session = casegate::Session::in_memory();
    let client = client(api.config(), &session)?;

    // Parks in the queue; abandon so the call settles.
    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.get("/api/cases").await }
    });
    wait_until(WAIT, || session.queued() == 1).await?;
    session.abandon("test");

    assert_eq!(kind(&pending.await?), Some(ErrorKind::AuthExpired));
    assert_eq!(api.bearers_for("/api/cases"), vec![None]);
    Ok(())
}

#[tokio::test]
async fn concurrent_auth_failures_share_one_refresh() -> anyhow::Result<()> {
    let api = MockApi::start("T2", issue("T2", 100)).await?;
    let session = session_with("T1");
    let client = client(api.config(), &session)?;

    let mut handles = Vec::new();
    for path in ["/api/cases/1", "/api/cases/2", "/api/cases/3"] {
        let client = client.clone();
        handles.push(tokio::spawn(async move { client.get(path).await }));
    }
    for handle in handles {
        let resp = handle.await??;
        assert_eq!(resp.status.as_u16(), 200);
    }

    assert_eq!(api.refresh_calls(), 1);
    for path in ["/api/cases/1", "/api/cases/2", "/api/cases/3"] {
        assert_eq!(api.bearers_for(path), vec![Some("T1".to_owned()), Some("T2".to_owned())]);
    }
    assert_eq!(session.store.get().map(|c| c.as_str().to_owned()), Some("T2".to_owned()));
    assert!(!session.bridge.is_pending());
    Ok(())
}

#[tokio::test]
async fn failed_refresh_queues_until_reauthenticated() -> anyhow::Result<()> {
    let api = MockApi::start("T9", reject()).await?;
    let session = session_with("T1");
    let client = client(api.config(), &session)?;
    let mut events = session.bridge.subscribe();

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.get("/api/cases/7").await }
    });

    tokio::time::timeout(WAIT, events.recv()).await??;
    assert_eq!(session.queued(), 1);
    assert_eq!(session.bridge.published(), 1);
    assert!(!pending.is_finished());

    // The user logs in again out of band.
    if let Some(credential) = Credential::new("T9") {
        session.store.set(&credential);
    }
    assert_eq!(session.flush().await, 1);

    let resp = pending.await??;
    assert_eq!(resp.status.as_u16(), 200);
    assert_eq!(api.bearers_for("/api/cases/7").last().cloned().flatten(), Some("T9".to_owned()));
    assert_eq!(session.queued(), 0);
    Ok(())
}

#[tokio::test]
async fn declined_reauth_expires_the_request() -> anyhow::Result<()> {
    let api = MockApi::start("T9", reject()).await?;
    let session = session_with("T1");
    let client = client(api.config(), &session)?;

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.get("/api/cases/7").await }
    });
    wait_until(WAIT, || session.queued() == 1).await?;

    assert_eq!(session.abandon("user dismissed login"), 1);
    assert_eq!(kind(&pending.await?), Some(ErrorKind::AuthExpired));
    assert_eq!(api.bearers_for("/api/cases/7").len(), 1);
    Ok(())
}

#[tokio::test]
async fn auth_failure_after_retry_is_final() -> anyhow::Result<()> {
    let api = MockApi::start("T1", issue("T2", 0)).await?;
    let session = session_with("T1");
    let client = client(api.config(), &session)?;

    let result = client.get("/api/forbidden").await;

    assert_eq!(kind(&result), Some(ErrorKind::AuthFailure));
    assert_eq!(result.err().and_then(|e| e.status()).map(|s| s.as_u16()), Some(403));
    assert_eq!(api.refresh_calls(), 1);
    assert_eq!(api.bearers_for("/api/forbidden").len(), 2);
    assert_eq!(session.queued(), 0);
    Ok(())
}

#[tokio::test]
async fn forbidden_without_refresh_when_disabled() -> anyhow::Result<()> {
    let api = MockApi::start("T1", issue("T2", 0)).await?;
    let session = session_with("T1");
    let mut config = api.config();
    config.refresh_on_forbidden = false;
    let client = client(config, &session)?;

    let result = client.get("/api/forbidden").await;

    assert_eq!(kind(&result), Some(ErrorKind::AuthFailure));
    assert_eq!(api.refresh_calls(), 0);
    assert_eq!(api.bearers_for("/api/forbidden").len(), 1);
    Ok(())
}

#[tokio::test]
async fn server_errors_pass_through() -> anyhow::Result<()> {
    let api = MockApi::start("T1", issue("T2", 0)).await?;
    let session = session_with("T1");
    let client = client(api.config(), &session)?;

    let result = client.get("/api/boom").await;

    assert_eq!(kind(&result), Some(ErrorKind::Server));
    let text = result.err().and_then(|e| e.response().map(|r| r.text()));
    assert_eq!(text.as_deref(), Some("boom"));
    assert_eq!(api.refresh_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn queued_requests_replay_in_order() -> anyhow::Result<()> {
    let api = MockApi::start("T9", reject()).await?;
    let session = session_with("T1");
    let client = client(api.config(), &session)?;
    let _events = session.bridge.subscribe();

    let first = tokio::spawn({
        let client = client.clone();
        async move { client.get("/api/cases/a").await }
    });
    wait_until(WAIT, || session.queued() == 1).await?;
    let second = tokio::spawn({
        let client = client.clone();
        async move { client.get("/api/cases/b").await }
    });
    wait_until(WAIT, || session.queued() == 2).await?;

    // Both failures raised one prompt.
    assert_eq!(session.bridge.published(), 1);

    if let Some(credential) = Credential::new("T9") {
        session.store.set(&credential);
    }
    assert_eq!(session.flush().await, 2);
    first.await??;
    second.await??;

    let replayed: Vec<String> = api
        .hits()
        .into_iter()
        .filter(|h| h.bearer.as_deref() == Some("T9"))
        .map(|h| h.path)
        .collect();
    assert_eq!(replayed, vec!["/api/cases/a".to_owned(), "/api/cases/b".to_owned()]);
    Ok(())
}

#[tokio::test]
async fn queued_request_expires_after_ttl() -> anyhow::Result<()> {
    let api = MockApi::start("T9", reject()).await?;
    let session = session_with("T1");
    let mut config = api.config();
    config.queue_ttl_ms = 100;
    let client = client(config, &session)?;

    let result = tokio::time::timeout(WAIT, client.get("/api/cases/7")).await?;

    assert_eq!(kind(&result), Some(ErrorKind::AuthExpired));
    assert_eq!(session.queued(), 0);
    Ok(())
}

#[tokio::test]
async fn cancelled_request_leaves_the_queue() -> anyhow::Result<()> {
    let api = MockApi::start("T9", reject()).await?;
    let session = session_with("T1");
    let client = client(api.config(), &session)?;
    let cancel = CancellationToken::new();

    let pending = tokio::spawn({
        let client = client.clone();
        let cancel = cancel.clone();
        async move { client.request_with_cancel(OutgoingRequest::get("/api/cases/7"), &cancel).await }
    });
    wait_until(WAIT, || session.queued() == 1).await?;
    cancel.cancel();
    assert_eq!(kind(&pending.await?), Some(ErrorKind::Cancelled));

    if let Some(credential) = Credential::new("T9") {
        session.store.set(&credential);
    }
    assert_eq!(session.flush().await, 0);
    assert_eq!(api.bearers_for("/api/cases/7").len(), 1);
    Ok(())
}

#[tokio::test]
async fn rotated_credential_is_persisted() -> anyhow::Result<()> {
    let api = MockApi::start("T1", reject()).await?;
    let session = session_with("T1");
    let client = client(api.config(), &session)?;

    client.post_json("/api/rotate", &serde_json::json!({})).await?;
    assert_eq!(session.store.get().map(|c| c.as_str().to_owned()), Some("ROTATED".to_owned()));

    client.get("/api/cases").await?;
    assert_eq!(api.bearers_for("/api/cases"), vec![Some("ROTATED".to_owned())]);
    Ok(())
}

#[tokio::test]
async fn clients_share_one_session() -> anyhow::Result<()> {
    let api = MockApi::start("T2", issue("T2", 0)).await?;
    let session = session_with("T1");
    let cases = client(api.config(), &session)?;
    let documents = client(api.config(), &session)?;

    cases.get("/api/cases").await?;
    documents.get("/api/documents").await?;

    assert_eq!(session.refresh_calls(), 1);
    assert_eq!(api.bearers_for("/api/documents"), vec![Some("T2".to_owned())]);
    Ok(())
}

#[tokio::test]
async fn concurrent_failures_on_two_clients_share_one_refresh() -> anyhow::Result<()> {
    let api = MockApi::start("T2", issue("T2", 100)).await?;
    let session = session_with("T1");
    let cases = client(api.config(), &session)?;
    let documents = client(api.config(), &session)?;

    let (a, b) = tokio::join!(cases.get("/api/cases"), documents.get("/api/documents"));

    assert_eq!(a?.status.as_u16(), 200);
    assert_eq!(b?.status.as_u16(), 200);
    assert_eq!(api.refresh_calls(), 1);
    assert_eq!(session.refresh_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn one_login_resumes_every_client() -> anyhow::Result<()> {
    let api = MockApi::start("T9", reject()).await?;
    let session = session_with("T1");
    let cases = client(api.config(), &session)?;
    let documents = client(api.config(), &session)?;
    let mut events = session.bridge.subscribe();

    let first = tokio::spawn({
        let cases = cases.clone();
        async move { cases.get("/api/cases/a").await }
    });
    wait_until(WAIT, || session.queued() == 1).await?;
    let second = tokio::spawn({
        let documents = documents.clone();
        async move { documents.get("/api/documents/b").await }
    });
    wait_until(WAIT, || session.queued() == 2).await?;

    tokio::time::timeout(WAIT, events.recv()).await??;
    assert_eq!(session.bridge.published(), 1);

    if let Some(credential) = Credential::new("T9") {
        session.store.set(&credential);
    }
    assert_eq!(session.flush().await, 2);

    assert_eq!(first.await??.status.as_u16(), 200);
    assert_eq!(second.await??.status.as_u16(), 200);
    assert_eq!(session.queued(), 0);
    assert!(!session.bridge.is_pending());

    let replayed: Vec<String> = api
        .hits()
        .into_iter()
        .filter(|h| h.bearer.as_deref() == Some("T9"))
        .map(|h| h.path)
        .collect();
    assert_eq!(replayed, vec!["/api/cases/a".to_owned(), "/api/documents/b".to_owned()]);
    Ok(())
}

#[tokio::test]
async fn expired_prompt_lets_the_next_failure_prompt_again() -> anyhow::Result<()> {
    let api = MockApi::start("T9", reject()).await?;
    let session = session_with("T1");
    let mut config = api.config();
    config.queue_ttl_ms = 100;
    let client = client(config, &session)?;
    let mut events = session.bridge.subscribe();

    let first = tokio::time::timeout(WAIT, client.get("/api/cases/1")).await?;
    assert_eq!(kind(&first), Some(ErrorKind::AuthExpired));
    tokio::time::timeout(WAIT, events.recv()).await??;
    assert!(!session.bridge.is_pending());

    let second = tokio::time::timeout(WAIT, client.get("/api/cases/2")).await?;
    assert_eq!(kind(&second), Some(ErrorKind::AuthExpired));
    tokio::time::timeout(WAIT, events.recv()).await??;
    assert_eq!(session.bridge.published(), 2);
    Ok(())
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let session = session_with("T1");
    let client = client(casegate::ClientConfig::for_base_url(format!("http://{addr}")), &session)?;

    let result = client.get("/api/cases").await;
    assert_eq!(kind(&result), Some(ErrorKind::Network));
    assert_eq!(session.refresh_calls(), 0);
    Ok(())
}

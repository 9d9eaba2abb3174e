//! Artifact-upload sink client.
//!
//! When the bootstrap environment configures an upload endpoint, the
//! event stream uploads artifact content to the backend and rewrites
//! the artifact event's `uri` to the returned backend URI. Upload
//! failures are swallowed: the event is always forwarded, with its
//! original URI when the sink is unavailable.

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use relay_proto::envelope::AdapterEvent;
use relay_proto::event::AgentEvent;

/// Env var carrying the adapter's bootstrap JSON.
pub const BOOTSTRAP_ENV: &str = "AGENT_BOOTSTRAP";

const UPLOAD_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Parse the `AGENT_BOOTSTRAP` env var, if present and well-formed.
pub fn bootstrap_config() -> Option<Value> {
    let raw = std::env::var(BOOTSTRAP_ENV).ok()?;
    serde_json::from_str(&raw).ok()
}

/// The artifact upload endpoint from the bootstrap config, if any.
pub fn artifact_upload_endpoint() -> Option<String> {
    bootstrap_config()?
        .get("artifactUploadEndpoint")
        .and_then(Value::as_str)
        .map(String::from)
}

/// An HTTP client suitable for upload calls.
pub fn upload_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(UPLOAD_TIMEOUT)
        .build()
        .context("failed to build artifact upload client")
}

/// Upload artifact content to the backend.
///
/// Returns the backend URI on a 201 response carrying one; `None` for
/// any other response shape.
pub async fn upload_artifact_content(
    client: &reqwest::Client,
    endpoint: &str,
    agent_id: &str,
    artifact_id: &str,
    content: &str,
    mime_type: Option<&str>,
) -> Result<Option<String>> {
    let mut payload = serde_json::json!({
        "agentId": agent_id,
        "artifactId": artifact_id,
        "content": content,
    });
    if let (Some(mime), Some(map)) = (mime_type, payload.as_object_mut()) {
        map.insert("mimeType".to_string(), Value::String(mime.to_string()));
    }

    let response = client
        .post(endpoint)
        .json(&payload)
        .send()
        .await
        .with_context(|| format!("artifact upload POST to {endpoint} failed"))?;

    if response.status() != reqwest::StatusCode::CREATED {
        return Ok(None);
    }

    let body: Value = response
        .json()
        .await
        .context("artifact upload response was not JSON")?;
    Ok(body
        .get("backendUri")
        .and_then(Value::as_str)
        .map(String::from))
}

/// If the envelope carries an artifact event, upload its content and
/// rewrite the URI. Non-artifact events and failed uploads pass the
/// envelope through unchanged.
pub async fn rewrite_artifact_uri(
    client: &reqwest::Client,
    endpoint: &str,
    event: AdapterEvent,
) -> AdapterEvent {
    let AgentEvent::Artifact(ref artifact) = event.event else {
        return event;
    };

    match upload_artifact_content(
        client,
        endpoint,
        &artifact.agent_id,
        &artifact.artifact_id,
        "",
        artifact.mime_type.as_deref(),
    )
    .await
    {
        Ok(Some(backend_uri)) => {
            let mut rewritten = event.clone();
            if let AgentEvent::Artifact(ref mut inner) = rewritten.event {
                inner.uri = Some(backend_uri);
            }
            rewritten
        }
        Ok(None) => event,
        Err(e) => {
            debug!(error = %e, "artifact upload failed, forwarding original URI");
            event
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_proto::envelope::EventFactory;
    use relay_proto::event::StatusEvent;

    // Env-var manipulation requires unsafe in edition 2024; tests run
    // serially enough within this module that a shared lock suffices.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn bootstrap_config_absent_when_env_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe { std::env::remove_var(BOOTSTRAP_ENV) };
        assert!(bootstrap_config().is_none());
        assert!(artifact_upload_endpoint().is_none());
    }

    #[test]
    fn bootstrap_config_parses_endpoint() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var(
                BOOTSTRAP_ENV,
                r#"{"artifactUploadEndpoint": "http://backend/upload"}"#,
            )
        };
        assert_eq!(
            artifact_upload_endpoint().as_deref(),
            Some("http://backend/upload")
        );
        unsafe { std::env::remove_var(BOOTSTRAP_ENV) };
    }

    #[test]
    fn malformed_bootstrap_json_is_ignored() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe { std::env::set_var(BOOTSTRAP_ENV, "not json {{") };
        assert!(bootstrap_config().is_none());
        unsafe { std::env::remove_var(BOOTSTRAP_ENV) };
    }

    #[tokio::test]
    async fn non_artifact_events_pass_through_without_upload() {
        let mut factory = EventFactory::new("run-1");
        let envelope = factory.wrap(relay_proto::event::AgentEvent::Status(StatusEvent {
            agent_id: "agent-1".to_string(),
            message: "hello".to_string(),
            tick: None,
        }));

        let client = upload_client().unwrap();
        // The endpoint is unreachable; a non-artifact event must never
        // touch it.
        let out = rewrite_artifact_uri(&client, "http://127.0.0.1:9/upload", envelope.clone()).await;
        assert_eq!(out, envelope);
    }

    #[tokio::test]
    async fn unreachable_sink_forwards_original_event() {
        let mut factory = EventFactory::new("run-1");
        let envelope = factory.wrap(relay_proto::event::AgentEvent::Artifact(
            relay_proto::event::ArtifactEvent {
                agent_id: "agent-1".to_string(),
                artifact_id: "art-1".to_string(),
                name: "report.md".to_string(),
                kind: relay_proto::event::ArtifactKind::Document,
                workstream: "research".to_string(),
                status: relay_proto::event::ArtifactStatus::Draft,
                quality_score: 0.9,
                provenance: relay_proto::event::Provenance::created(
                    "agent-1",
                    "2025-01-01T00:00:00Z",
                ),
                uri: Some("/workspace/output/report.md".to_string()),
                mime_type: Some("text/markdown".to_string()),
                size_bytes: Some(1024),
                content_hash: None,
            },
        ));

        // Port 9 (discard) refuses connections; the upload error must
        // be swallowed and the original envelope forwarded.
        let client = upload_client().unwrap();
        let out = rewrite_artifact_uri(&client, "http://127.0.0.1:9/upload", envelope.clone()).await;
        assert_eq!(out, envelope);
    }
}

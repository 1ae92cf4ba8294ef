//! Realtime transport: a websocket endpoint speaking the `{type, ...}`
//! envelope. Session and history queries are served from the stores; any
//! other message is a chat turn dispatched through the core loop.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::agent::{converse, AgentHandle};
use crate::error::{HiveError, Result};
use crate::session::SessionStore;
use crate::store::AgentStore;

#[derive(Clone)]
pub struct ServerState {
    pub agent: AgentHandle,
    pub store: AgentStore,
    pub sessions: SessionStore,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

pub async fn serve(state: ServerState, addr: SocketAddr) -> Result<()> {
    info!(%addr, "realtime transport listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .await
        .map_err(|err| HiveError::Protocol(format!("server error: {err}")))
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ServerState) {
    let (mut sender, mut receiver) = socket.split();
    // The agent this connection talks to; history/session queries may
    // switch it to another persisted agent.
    let mut serving = state.agent.clone();

    while let Some(message) = receiver.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                warn!(error = %err, "websocket disconnected");
                break;
            }
        };

        if let Some(reply) = handle_message(&mut serving, &state, &text).await {
            if sender.send(Message::Text(reply.to_string())).await.is_err() {
                warn!("websocket send failed");
                break;
            }
        }
    }
}

/// One incoming envelope to at most one reply. Split from the socket loop
/// so the message kinds are testable without a transport.
pub async fn handle_message(
    serving: &mut AgentHandle,
    state: &ServerState,
    raw: &str,
) -> Option<Value> {
    let query: Value = match serde_json::from_str(raw) {
        Ok(query) => query,
        Err(err) => {
            warn!(error = %err, "ignoring unparseable message");
            return None;
        }
    };

    match query["type"].as_str() {
        Some("chat_history") => {
            let session_id = query["session_id"].as_str().unwrap_or_default();
            let session = state.sessions.get(session_id).await;
            if let Some(session) = &session {
                if let Some(agent) = state.store.get(&session.agent_id).await {
                    *serving = agent.into_handle();
                }
            }
            let agent_name = serving.lock().await.name.clone();
            let content = session.map(|session| json!(session.chat)).unwrap_or(json!([]));
            Some(json!({
                "type": "chat_history",
                "content": content,
                "agent_name": agent_name,
            }))
        }
        Some("sessions") => match query["action"].as_str() {
            Some("list") => {
                let sessions = state.sessions.list().await;
                Some(json!({
                    "type": "sessions",
                    "action": "list",
                    "content": sessions,
                }))
            }
            Some("get") => {
                let agent_id = query["agent_id"].as_str().unwrap_or_default();
                if let Some(agent) = state.store.get(agent_id).await {
                    *serving = agent.into_handle();
                }
                let agent_name = serving.lock().await.name.clone();
                let session = state.sessions.for_agent(agent_id).await;
                Some(json!({
                    "type": "sessions",
                    "action": "get",
                    "agent_name": agent_name,
                    "session": session,
                }))
            }
            other => {
                warn!(action = ?other, "unknown sessions action");
                None
            }
        },
        _ => {
            let content = query["content"].as_str().unwrap_or_default().to_string();
            match converse(serving, content).await {
                Ok(reply) => Some(json!({"type": "chat_reply", "content": reply})),
                Err(err) => {
                    warn!(error = %err, "chat dispatch failed");
                    Some(json!({"type": "error", "content": err.to_string()}))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    use crate::agent::Agent;
    use crate::llm::StubModel;
    use crate::message::Envelope;
    use crate::session::Session;

    fn state_in(dir: &tempfile::TempDir, agent: Agent) -> ServerState {
        ServerState {
            agent: agent.into_handle(),
            store: AgentStore::new(dir.path().join("agents.json")),
            sessions: SessionStore::new(dir.path().join("sessions.json")),
        }
    }

    #[tokio::test]
    async fn chat_message_round_trips_through_the_loop() {
        let dir = tempdir().unwrap();
        let agent = Agent::new(
            "Avatar",
            StubModel::scripted(&[r#"{"type": "final_answer", "result": "hello there"}"#]),
        );
        let state = state_in(&dir, agent);
        let mut serving = state.agent.clone();

        let reply = handle_message(&mut serving, &state, r#"{"content": "hi"}"#)
            .await
            .unwrap();
        assert_eq!(reply["type"], "chat_reply");
        assert_eq!(reply["content"], "hello there");
    }

    #[tokio::test]
    async fn session_listing_mirrors_the_store() {
        let dir = tempdir().unwrap();
        let state = state_in(&dir, Agent::new("Avatar", StubModel::scripted(&[])));
        state
            .sessions
            .save(Session {
                id: "s1".into(),
                agent_id: "a1".into(),
                chat: vec![Envelope::text("User", "hi")],
                datetime: Utc::now(),
            })
            .await;
        let mut serving = state.agent.clone();

        let reply = handle_message(
            &mut serving,
            &state,
            r#"{"type": "sessions", "action": "list"}"#,
        )
        .await
        .unwrap();
        assert_eq!(reply["type"], "sessions");
        assert_eq!(reply["content"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn chat_history_replies_with_session_chat() {
        let dir = tempdir().unwrap();
        let state = state_in(&dir, Agent::new("Avatar", StubModel::scripted(&[])));
        state
            .sessions
            .save(Session {
                id: "s1".into(),
                agent_id: "unknown-agent".into(),
                chat: vec![Envelope::text("User", "earlier message")],
                datetime: Utc::now(),
            })
            .await;
        let mut serving = state.agent.clone();

        let reply = handle_message(
            &mut serving,
            &state,
            r#"{"type": "chat_history", "session_id": "s1"}"#,
        )
        .await
        .unwrap();
        assert_eq!(reply["type"], "chat_history");
        assert_eq!(reply["agent_name"], "Avatar");
        assert_eq!(reply["content"][0]["message"], "earlier message");
    }

    #[tokio::test]
    async fn unparseable_messages_are_dropped() {
        let dir = tempdir().unwrap();
        let state = state_in(&dir, Agent::new("Avatar", StubModel::scripted(&[])));
        let mut serving = state.agent.clone();

        assert!(handle_message(&mut serving, &state, "not json").await.is_none());
    }
}

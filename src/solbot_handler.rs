use crate::chat_stream::relay;
use crate::errors::AppError;
use crate::handlers::AppState;
use crate::models::{ChatMessage, ChatRequest, ChatRole, ChatTurn};
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use std::sync::Arc;

/// Conversation turns accepted from clients. The system turn belongs to the server.
pub fn validate_messages(turns: &[ChatTurn]) -> Result<Vec<ChatMessage>, AppError> {
    if turns.is_empty() {
        return Err(AppError::BadRequest(
            "messages must contain at least one turn".to_string(),
        ));
    }
    turns
        .iter()
        .map(|turn| match turn.role.parse::<ChatRole>() {
            Ok(role @ (ChatRole::User | ChatRole::Assistant)) => Ok(ChatMessage {
                role,
                content: turn.content.clone(),
            }),
            _ => Err(AppError::BadRequest(format!(
                "unsupported message role '{}'",
                turn.role
            ))),
        })
        .collect()
}

/// POST /api/v1/solbot
///
/// Streams the assistant reply as server-sent events.
#[utoipa::path(
    post,
    path = "/api/v1/solbot",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "text/event-stream of completion chunks ending with [DONE]"),
        (status = 400, description = "Malformed body, empty conversation or a role other than user/assistant"),
        (status = 402, description = "Gateway credits exhausted"),
        (status = 429, description = "Gateway rate limit"),
        (status = 500, description = "Gateway failure")
    ),
    tag = "solbot"
)]
pub async fn solbot_chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(payload) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let messages = validate_messages(&payload.messages)?;
    tracing::info!("POST /solbot - {} turns", messages.len());

    let system_prompt = state.roster.system_prompt();
    let upstream = state
        .gateway_client
        .stream_chat(&system_prompt, &messages)
        .await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(relay(upstream.bytes_stream())))
        .map_err(|e| AppError::InternalError(format!("Failed to build stream response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: &str, content: &str) -> ChatTurn {
        ChatTurn {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_validate_messages() {
        assert!(validate_messages(&[]).is_err());
        let messages = validate_messages(&[
            turn("user", "Oi"),
            turn("assistant", "Olá!"),
            turn("user", "Moro em Santarém"),
        ])
        .unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, ChatRole::Assistant);
        assert_eq!(messages[2].content, "Moro em Santarém");
    }

    #[test]
    fn test_validate_messages_rejects_foreign_roles() {
        for role in ["system", "tool", "function", "USER", ""] {
            match validate_messages(&[turn("user", "Oi"), turn(role, "x")]) {
                Err(AppError::BadRequest(msg)) => {
                    assert!(msg.contains("unsupported message role"), "{}", msg)
                }
                other => panic!("role {:?} accepted: {:?}", role, other.map(|m| m.len())),
            }
        }
    }
}

//! HTTP API client, the fallback delivery path.
//!
//! Thin reqwest wrapper over the server's REST surface. Transient
//! failures are retried a bounded number of times with an increasing
//! delay before the error is surfaced to the caller.

use std::time::Duration;

use uuid::Uuid;

use crate::client::ClientError;
use crate::shared::conversation::Conversation;
use crate::shared::message::{SendMessageRequest, SendMessageResponse};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    /// Deliver a message over HTTP. The server runs the same routing
    /// pipeline as the socket path, so the response carries the persisted
    /// user message and the assistant reply together.
    pub async fn send_message(
        &self,
        content: &str,
        conversation_id: Option<Uuid>,
    ) -> Result<SendMessageResponse, ClientError> {
        let request = SendMessageRequest {
            content: content.to_string(),
            conversation_id,
        };
        let url = format!("{}/api/messages", self.base_url);
        self.with_retries(|| async {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.token)
                .json(&request)
                .send()
                .await
                .map_err(classify_request_error)?;
            read_json(response).await
        })
        .await
    }

    /// Fetch one conversation with its full message history
    pub async fn get_conversation(&self, id: Uuid) -> Result<Conversation, ClientError> {
        let url = format!("{}/api/conversations/{}", self.base_url, id);
        self.with_retries(|| async {
            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(classify_request_error)?;
            read_json(response).await
        })
        .await
    }

    /// List the caller's conversations, message bodies omitted
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        let url = format!("{}/api/conversations", self.base_url);
        self.with_retries(|| async {
            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(classify_request_error)?;
            read_json(response).await
        })
        .await
    }

    async fn with_retries<T, F, Fut>(&self, call: F) -> Result<T, ClientError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ClientError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(
                        "[Api] Request failed (attempt {}/{}): {}",
                        attempt,
                        MAX_ATTEMPTS,
                        e
                    );
                    tokio::time::sleep(RETRY_DELAY * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn classify_request_error(error: reqwest::Error) -> ClientError {
    if error.is_timeout() {
        ClientError::Timeout("HTTP request timed out".to_string())
    } else {
        ClientError::Network(error.to_string())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ClientError::Authentication(format!(
            "Server rejected credential ({})",
            status
        )));
    }
    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "no response body".to_string());
        return Err(ClientError::Server {
            status: status.as_u16(),
            message,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ClientError::Network(format!("Malformed response body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::shared::conversation::Conversation;
    use crate::shared::message::Message;

    fn sample_response() -> SendMessageResponse {
        let conversation = Conversation::new(Uuid::new_v4(), "Hello");
        let user_message = Message::new_user(conversation.id, "Hello");
        let bot_message =
            Message::new_assistant(conversation.id, "Hi there", Default::default());
        SendMessageResponse {
            conversation,
            user_message,
            bot_message,
        }
    }

    #[tokio::test]
    async fn test_send_message_success() {
        let server = MockServer::start().await;
        let body = sample_response();
        Mock::given(method("POST"))
            .and(path("/api/messages"))
            .and(bearer_token("secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "secret-token");
        let response = client.send_message("Hello", None).await.unwrap();
        assert_eq!(response.user_message.content, "Hello");
        assert_eq!(response.bot_message.content, "Hi there");
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/messages"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "bad-token");
        let result = client.send_message("Hello", None).await;
        assert!(matches!(result, Err(ClientError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_server_error_retried_then_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/messages"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "secret-token");
        let result = client.send_message("Hello", None).await;
        assert!(matches!(result, Err(ClientError::Server { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_client_error_surfaced_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/conversations"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string("Content cannot be empty"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "secret-token");
        let result = client.list_conversations().await;
        match result {
            Err(ClientError::Server { status, message }) => {
                assert_eq!(status, 400);
                assert!(message.contains("empty"));
            }
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }
}

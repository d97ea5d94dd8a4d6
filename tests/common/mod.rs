//! Shared helpers for the integration tests: app construction with
//! scripted collaborators, token minting, and a connection-style double
//! for the completion provider.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use uuid::Uuid;

use helpline::backend::auth::sessions::create_token;
use helpline::backend::completion::{
    Completion, CompletionError, CompletionProvider, UnconfiguredProvider,
};
use helpline::backend::server::config::ServerConfig;
use helpline::backend::server::init::create_app_with;
use helpline::backend::store::{ConversationStore, MemoryStore};

/// Completion provider that replies with a canned text
pub struct CannedProvider {
    pub reply: String,
}

#[async_trait]
impl CompletionProvider for CannedProvider {
    async fn generate(
        &self,
        _content: &str,
        _history: &[helpline::shared::message::Message],
    ) -> Result<Completion, CompletionError> {
        Ok(Completion {
            text: self.reply.clone(),
            confidence: Some(0.9),
            model_id: Some("canned".to_string()),
            token_count: Some(12),
        })
    }
}

/// Build the app with an in-memory store and a provider that always
/// answers with `reply`
pub fn app_with_reply(reply: &str) -> (Router<()>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(CannedProvider {
        reply: reply.to_string(),
    });
    let app = create_app_with(
        ServerConfig::default(),
        store.clone() as Arc<dyn ConversationStore>,
        provider,
    );
    (app, store)
}

/// Build the app with a provider that always fails, forcing the fixed
/// fallback reply
pub fn app_with_failing_provider() -> (Router<()>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let app = create_app_with(
        ServerConfig::default(),
        store.clone() as Arc<dyn ConversationStore>,
        Arc::new(UnconfiguredProvider),
    );
    (app, store)
}

/// Mint a valid bearer token for a fresh identity
pub fn test_identity() -> (Uuid, String) {
    let identity = Uuid::new_v4();
    let token = create_token(identity).expect("token minting failed");
    (identity, token)
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

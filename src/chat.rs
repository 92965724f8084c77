//! Retrieval-augmented chat session.
//!
//! Each turn retrieves context for the question, renders the `[system, user]`
//! prompt, appends the remembered turns, and asks the backend. The question
//! and the reply are recorded in memory only after the backend answered.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ChatError;
use crate::memory::{ChatMemory, ChatMessage, Role};
use crate::prompt::build_prompt;
use crate::provider::{ChatOptions, ChatProvider, EMPTY_REPLY_FALLBACK};
use crate::retrieve::{semantic_search, DEFAULT_N_RESULTS};
use crate::store::Collection;

pub struct ChatSession {
    collection: Arc<dyn Collection>,
    provider: Box<dyn ChatProvider>,
    memory: ChatMemory,
    n_results: usize,
    options: ChatOptions,
}

impl ChatSession {
    pub fn new(collection: Arc<dyn Collection>, provider: Box<dyn ChatProvider>) -> Self {
        Self {
            collection,
            provider,
            memory: ChatMemory::default(),
            n_results: DEFAULT_N_RESULTS,
            options: ChatOptions::default(),
        }
    }

    /// Session sized by `[retrieval]` and `[chat]`.
    pub fn from_config(
        collection: Arc<dyn Collection>,
        provider: Box<dyn ChatProvider>,
        config: &Config,
    ) -> Self {
        Self {
            collection,
            provider,
            memory: ChatMemory::new(config.chat.memory_size),
            n_results: config.retrieval.n_results,
            options: ChatOptions::from_config(&config.chat),
        }
    }

    pub fn with_memory(mut self, memory: ChatMemory) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_n_results(mut self, n_results: usize) -> Self {
        self.n_results = n_results;
        self
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn memory(&self) -> &ChatMemory {
        &self.memory
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Messages for `query`: the prompt followed by remembered turns.
    ///
    /// A failed search degrades to an empty context rather than failing the
    /// turn.
    async fn messages_for(&self, query: &str) -> Vec<ChatMessage> {
        let chunks: Vec<String> =
            match semantic_search(self.collection.as_ref(), query, self.n_results).await {
                Ok(results) => results.hits.into_iter().map(|hit| hit.document).collect(),
                Err(e) => {
                    warn!(error = %e, "retrieval failed, answering without context");
                    Vec::new()
                }
            };
        debug!(chunks = chunks.len(), "retrieved context");

        let mut messages = build_prompt(&chunks, query);
        messages.extend(self.memory.messages());
        messages
    }

    fn remember(&mut self, query: &str, reply: &str) {
        self.memory.add(Role::User, query);
        self.memory.add(Role::Assistant, reply);
    }

    /// Answer one question.
    pub async fn ask(&mut self, query: &str) -> Result<String, ChatError> {
        let messages = self.messages_for(query).await;
        let reply = self.provider.chat(&messages, &self.options).await?;
        self.remember(query, &reply);
        Ok(reply)
    }

    /// Answer one question, handing each fragment to `on_fragment` as it
    /// arrives. Returns the full reply.
    ///
    /// Nothing is remembered when the stream fails part-way.
    pub async fn ask_streaming<F>(&mut self, query: &str, mut on_fragment: F) -> Result<String, ChatError>
    where
        F: FnMut(&str) + Send,
    {
        let messages = self.messages_for(query).await;
        let mut stream = self.provider.chat_stream(&messages, &self.options).await?;

        let mut reply = String::new();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            on_fragment(&fragment);
            reply.push_str(&fragment);
        }
        if reply.trim().is_empty() {
            on_fragment(EMPTY_REPLY_FALLBACK);
            reply = EMPTY_REPLY_FALLBACK.to_string();
        }

        self.remember(query, &reply);
        Ok(reply)
    }
}

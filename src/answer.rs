//! Answer synthesizer.
//!
//! Turns a [`RetrievalResult`] plus the conversation so far into either a
//! complete answer or a stream of fragments. When retrieval found nothing
//! the model is not called at all and [`prompt::NO_CONTEXT_ANSWER`] is
//! returned instead. Model failures surface as [`Error::SynthesisFailed`].

use std::sync::Arc;

use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use rainbow_intel_core::models::{ChatTurn, RetrievalResult};
use rainbow_intel_core::prompt;
use rainbow_intel_core::{Error, Result};

use crate::llm::{ChatModel, ChatRequest};

/// Ordered answer fragments; their concatenation is the full answer.
pub type AnswerStream = BoxStream<'static, Result<String>>;

#[derive(Clone)]
pub struct Synthesizer {
    model: Arc<dyn ChatModel>,
}

impl Synthesizer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Build the model request: grounding prompt, prior turns, then the question.
    pub fn build_request(
        question: &str,
        history: &[ChatTurn],
        retrieval: &RetrievalResult,
    ) -> ChatRequest {
        let mut messages = history.to_vec();
        messages.push(ChatTurn::user(question));
        ChatRequest {
            system: prompt::system_prompt(&retrieval.hits),
            messages,
            context_size: retrieval.len(),
        }
    }

    pub async fn answer(
        &self,
        question: &str,
        history: &[ChatTurn],
        retrieval: &RetrievalResult,
    ) -> Result<String> {
        if retrieval.is_empty() {
            info!("no context retrieved; skipping model call");
            return Ok(prompt::NO_CONTEXT_ANSWER.to_string());
        }

        let request = Self::build_request(question, history, retrieval);
        info!(
            model = self.model.model_name(),
            context = request.context_size,
            "synthesizing answer"
        );
        self.model.complete(&request).await.map_err(Error::synthesis)
    }

    pub async fn answer_stream(
        &self,
        question: &str,
        history: &[ChatTurn],
        retrieval: &RetrievalResult,
    ) -> Result<AnswerStream> {
        if retrieval.is_empty() {
            info!("no context retrieved; skipping model call");
            return Ok(stream::once(async { Ok(prompt::NO_CONTEXT_ANSWER.to_string()) }).boxed());
        }

        let request = Self::build_request(question, history, retrieval);
        info!(
            model = self.model.model_name(),
            context = request.context_size,
            "streaming answer"
        );
        let rx = self.model.stream(&request).await.map_err(Error::synthesis)?;
        Ok(ReceiverStream::new(rx)
            .map(|item| item.map_err(Error::synthesis))
            .boxed())
    }
}

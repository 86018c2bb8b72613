//! Grounding-context retrieval.
//!
//! The implementation behind the trait is opaque to the orchestrator —
//! vector store, keyword index, whatever. The only contract that matters
//! here: answers arrive within the budget or the turn proceeds without
//! them, and a retrieval failure never aborts a turn.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use parlance_foundation::RetrievalError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedContext {
    pub text: String,
    pub score: f32,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedContext>, RetrievalError>;
}

/// Always answers with nothing; the default when an agent has no knowledge
/// base attached.
pub struct NoopRetriever;

#[async_trait]
impl Retriever for NoopRetriever {
    async fn retrieve(
        &self,
        _query: &str,
        _top_k: usize,
    ) -> Result<Vec<RetrievedContext>, RetrievalError> {
        Ok(Vec::new())
    }
}

/// Serves a fixed context set regardless of query. Used in tests and demos.
pub struct FixedRetriever {
    contexts: Vec<RetrievedContext>,
    delay: Duration,
}

impl FixedRetriever {
    pub fn new(contexts: Vec<RetrievedContext>) -> Self {
        Self {
            contexts,
            delay: Duration::ZERO,
        }
    }

    /// Respond only after `delay`; lets tests exercise the budget path.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Retriever for FixedRetriever {
    async fn retrieve(
        &self,
        _query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedContext>, RetrievalError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.contexts.iter().take(top_k).cloned().collect())
    }
}

/// Apply the retrieval time budget. Timeouts and errors both degrade to an
/// empty context set; the boolean records the degradation for the turn
/// record.
pub async fn retrieve_bounded(
    retriever: &Arc<dyn Retriever>,
    query: &str,
    top_k: usize,
    budget: Duration,
) -> (Vec<RetrievedContext>, bool) {
    match tokio::time::timeout(budget, retriever.retrieve(query, top_k)).await {
        Ok(Ok(contexts)) => (contexts, false),
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "retrieval failed, proceeding without contexts");
            (Vec::new(), true)
        }
        Err(_) => {
            tracing::warn!(budget_ms = budget.as_millis() as u64, "retrieval timed out");
            (Vec::new(), true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(text: &str, score: f32) -> RetrievedContext {
        RetrievedContext {
            text: text.into(),
            score,
        }
    }

    #[tokio::test]
    async fn fixed_retriever_caps_at_top_k() {
        let r = FixedRetriever::new(vec![ctx("a", 0.9), ctx("b", 0.8), ctx("c", 0.7)]);
        let got = r.retrieve("q", 2).await.unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].text, "a");
    }

    #[tokio::test]
    async fn slow_retriever_degrades_to_empty() {
        let r: Arc<dyn Retriever> = Arc::new(
            FixedRetriever::new(vec![ctx("late", 1.0)]).with_delay(Duration::from_millis(400)),
        );
        let (contexts, failed) =
            retrieve_bounded(&r, "q", 4, Duration::from_millis(50)).await;
        assert!(contexts.is_empty());
        assert!(failed);
    }

    #[tokio::test]
    async fn fast_retriever_answers_in_budget() {
        let r: Arc<dyn Retriever> = Arc::new(FixedRetriever::new(vec![ctx("hit", 1.0)]));
        let (contexts, failed) =
            retrieve_bounded(&r, "q", 4, Duration::from_millis(300)).await;
        assert_eq!(contexts.len(), 1);
        assert!(!failed);
    }
}

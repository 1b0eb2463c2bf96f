//! Generation stream pipeline
//!
//! Turns a [`GenerationTask`] into a lazy, finite stream of [`StreamEvent`]s.
//! Nothing is sent upstream until the stream is first polled, and dropping
//! the stream drops the upstream connection with it.
//!
//! ```text
//!   upstream payload ──decode──> delta text ──escape──> Fragment
//!         │ malformed: logged, skipped
//!         └ finish_reason / end of upstream ───────────> Complete (exactly once)
//! ```

use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use crate::generation::prompts;
use crate::generation::provider::{CompletionProvider, CompletionRequest};
use crate::graph::GraphBuilder;
use crate::session::SessionState;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Replacement for line breaks inside fragments
pub const LINE_BREAK: &str = "<br>";

/// Data of the terminal event
pub const COMPLETION_SENTINEL: &str = "__complete__";

/// Wire form of a fragment equal to [`COMPLETION_SENTINEL`]; renders identically as HTML
pub const ESCAPED_SENTINEL: &str = "&#95;_complete__";

/// What a task generates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    TreeOfAbstraction,
    Answer,
    Recommendation,
}

impl std::fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TreeOfAbstraction => write!(f, "tree_of_abstraction"),
            Self::Answer => write!(f, "answer"),
            Self::Recommendation => write!(f, "recommendation"),
        }
    }
}

/// A prepared, not yet started generation
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationTask {
    pub kind: GenerationKind,
    pub request: CompletionRequest,
}

/// One unit delivered to the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Generated text, escaped by [`escape_fragment`]
    Fragment(String),
    /// Upstream failure, sent before the sentinel
    Error(String),
    /// Terminal event
    Complete,
}

impl StreamEvent {
    /// SSE event name
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Fragment(_) | Self::Complete => "message",
            Self::Error(_) => "error",
        }
    }

    /// SSE event data
    pub fn data(&self) -> &str {
        match self {
            Self::Fragment(text) | Self::Error(text) => text,
            Self::Complete => COMPLETION_SENTINEL,
        }
    }
}

/// Replace every line break with [`LINE_BREAK`]
pub fn escape_line_breaks(text: &str) -> String {
    text.replace("\r\n", LINE_BREAK).replace(['\n', '\r'], LINE_BREAK)
}

/// Escape generated text for the wire.
///
/// Line breaks become [`LINE_BREAK`], and text that would read as the
/// terminal event becomes [`ESCAPED_SENTINEL`].
pub fn escape_fragment(text: &str) -> String {
    let escaped = escape_line_breaks(text);
    if escaped == COMPLETION_SENTINEL {
        return ESCAPED_SENTINEL.to_string();
    }
    escaped
}

// =============================================================================
// Upstream payload decoding
// =============================================================================

#[derive(Deserialize)]
struct ChunkPayload {
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Text and finish signal carried by one upstream unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedChunk {
    pub text: Option<String>,
    pub finish_reason: Option<String>,
}

/// Decode one upstream payload
pub fn decode_chunk(payload: &str) -> Result<DecodedChunk> {
    let parsed: ChunkPayload = serde_json::from_str(payload)
        .map_err(|e| Error::MalformedFragment(format!("{}: {}", e, payload)))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::MalformedFragment(format!("no choices: {}", payload)))?;

    Ok(DecodedChunk {
        text: choice.delta.and_then(|d| d.content),
        finish_reason: choice.finish_reason,
    })
}

// =============================================================================
// Pipeline
// =============================================================================

/// Logs the terminal lifecycle state when the consumer's stream goes away
struct StreamGuard {
    session: String,
    state: SessionState,
}

impl StreamGuard {
    fn attached(session: String) -> Self {
        Self {
            session,
            state: SessionState::Attached,
        }
    }

    fn complete(&mut self) {
        self.state = SessionState::Completed;
        tracing::info!(session = %self.session, state = %self.state, "Generation completed");
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if self.state == SessionState::Attached {
            tracing::info!(
                session = %self.session,
                state = %SessionState::Abandoned,
                "Consumer left before completion"
            );
        }
    }
}

/// Builds generation tasks and drives them against a provider
pub struct StreamPipeline {
    provider: Arc<dyn CompletionProvider>,
    graph: GraphBuilder,
    config: GenerationConfig,
}

impl StreamPipeline {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        graph: GraphBuilder,
        config: GenerationConfig,
    ) -> Self {
        Self {
            provider,
            graph,
            config,
        }
    }

    pub fn tree_of_abstraction(&self, selection: &str) -> GenerationTask {
        GenerationTask {
            kind: GenerationKind::TreeOfAbstraction,
            request: prompts::tree_of_abstraction(selection),
        }
    }

    pub fn answer_question(&self, question: &str, system_prompt: Option<&str>) -> GenerationTask {
        GenerationTask {
            kind: GenerationKind::Answer,
            request: prompts::answer_question(question, system_prompt, &self.config),
        }
    }

    /// Prepare a recommendation task; the link neighbourhood is resolved now
    pub async fn recommend(&self, node_id: &str, node_content: &str) -> Result<GenerationTask> {
        let related = self.graph.related(node_content).await?;
        tracing::debug!(
            node = %node_id,
            first_degree = related.first_degree.len(),
            second_degree = related.second_degree.len(),
            "Resolved recommendation context"
        );
        Ok(GenerationTask {
            kind: GenerationKind::Recommendation,
            request: prompts::recommend(node_id, node_content, &related),
        })
    }

    /// Run `task` and stream its events.
    ///
    /// The stream always ends with exactly one [`StreamEvent::Complete`] and
    /// yields nothing after it.
    pub fn drive(
        &self,
        task: GenerationTask,
        session_id: String,
    ) -> impl Stream<Item = StreamEvent> + Send + 'static {
        let provider = self.provider.clone();

        async_stream::stream! {
            let mut guard = StreamGuard::attached(session_id);
            tracing::debug!(
                session = %guard.session,
                kind = %task.kind,
                provider = provider.name(),
                "Opening upstream generation"
            );

            match provider.open(&task.request).await {
                Ok(mut upstream) => {
                    while let Some(item) = upstream.next().await {
                        let payload = match item {
                            Ok(payload) => payload,
                            Err(e) => {
                                tracing::warn!(session = %guard.session, "Upstream stream failed: {}", e);
                                yield StreamEvent::Error(escape_line_breaks(&e.to_string()));
                                break;
                            }
                        };

                        let chunk = match decode_chunk(&payload) {
                            Ok(chunk) => chunk,
                            Err(e) => {
                                tracing::debug!(session = %guard.session, "Skipping incomplete chunk: {}", e);
                                continue;
                            }
                        };

                        if let Some(text) = chunk.text.filter(|t| !t.is_empty()) {
                            yield StreamEvent::Fragment(escape_fragment(&text));
                        }

                        if let Some(reason) = chunk.finish_reason {
                            tracing::debug!(session = %guard.session, reason = %reason, "Upstream finished");
                            break;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(session = %guard.session, "Failed to open upstream generation: {}", e);
                    yield StreamEvent::Error(escape_line_breaks(&e.to_string()));
                }
            }

            guard.complete();
            yield StreamEvent::Complete;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EdgeValidation;
    use crate::generation::provider::testing::{delta, stop, ScriptedProvider};
    use crate::node::NodeStore;
    use tempfile::TempDir;

    async fn make_pipeline(provider: Arc<ScriptedProvider>) -> (StreamPipeline, NodeStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = NodeStore::new(dir.path().to_path_buf()).await.unwrap();
        let graph = GraphBuilder::new(store.clone(), EdgeValidation::Full);
        let pipeline = StreamPipeline::new(provider, graph, GenerationConfig::default());
        (pipeline, store, dir)
    }

    async fn run(pipeline: &StreamPipeline, task: GenerationTask) -> Vec<StreamEvent> {
        pipeline.drive(task, "test-session".to_string()).collect().await
    }

    fn fragment(text: &str) -> StreamEvent {
        StreamEvent::Fragment(text.to_string())
    }

    #[test]
    fn test_escape_line_breaks() {
        assert_eq!(escape_line_breaks("a\nb\r\nc\rd"), "a<br>b<br>c<br>d");
        assert_eq!(escape_line_breaks("plain"), "plain");
    }

    #[test]
    fn test_escape_fragment() {
        assert_eq!(escape_fragment("__complete__"), ESCAPED_SENTINEL);
        assert_eq!(escape_fragment("a\n__complete__"), "a<br>__complete__");
        assert_eq!(escape_fragment("__complete__ "), "__complete__ ");
    }

    #[test]
    fn test_decode_chunk() {
        let chunk = decode_chunk(&delta("hi")).unwrap();
        assert_eq!(chunk.text.as_deref(), Some("hi"));
        assert!(chunk.finish_reason.is_none());

        let chunk = decode_chunk(&stop()).unwrap();
        assert!(chunk.text.is_none());
        assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_decode_chunk_malformed() {
        assert!(matches!(decode_chunk("not json"), Err(Error::MalformedFragment(_))));
        assert!(matches!(
            decode_chunk(r#"{"choices": []}"#),
            Err(Error::MalformedFragment(_))
        ));
        assert!(matches!(decode_chunk(r#"{"id": 1}"#), Err(Error::MalformedFragment(_))));
    }

    #[test]
    fn test_event_framing() {
        assert_eq!(fragment("x").event_name(), "message");
        assert_eq!(StreamEvent::Complete.data(), "__complete__");
        assert_eq!(StreamEvent::Complete.event_name(), "message");
        assert_eq!(StreamEvent::Error("boom".to_string()).event_name(), "error");
    }

    #[tokio::test]
    async fn test_stream_completes_once() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            delta("Hello\nworld"),
            delta(", again"),
            stop(),
        ]));
        let (pipeline, _store, _dir) = make_pipeline(provider.clone()).await;

        let events = run(&pipeline, pipeline.tree_of_abstraction("coffee")).await;
        assert_eq!(
            events,
            vec![fragment("Hello<br>world"), fragment(", again"), StreamEvent::Complete]
        );
        assert_eq!(provider.opened(), 1);
    }

    #[tokio::test]
    async fn test_sentinel_text_from_upstream_is_escaped() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            delta("__complete__"),
            delta("rest"),
            stop(),
        ]));
        let (pipeline, _store, _dir) = make_pipeline(provider).await;

        let events = run(&pipeline, pipeline.tree_of_abstraction("x")).await;
        assert_eq!(
            events,
            vec![fragment(ESCAPED_SENTINEL), fragment("rest"), StreamEvent::Complete]
        );

        let terminal: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.event_name() == "message" && e.data() == COMPLETION_SENTINEL)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(terminal, vec![events.len() - 1]);
    }

    #[tokio::test]
    async fn test_malformed_chunks_skipped() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            delta("a"),
            "{broken".to_string(),
            r#"{"choices": []}"#.to_string(),
            delta("b"),
            stop(),
        ]));
        let (pipeline, _store, _dir) = make_pipeline(provider).await;

        let events = run(&pipeline, pipeline.tree_of_abstraction("x")).await;
        assert_eq!(events, vec![fragment("a"), fragment("b"), StreamEvent::Complete]);
    }

    #[tokio::test]
    async fn test_nothing_after_finish_reason() {
        let final_with_text = serde_json::json!({
            "choices": [{"delta": {"content": "end"}, "finish_reason": "length"}]
        })
        .to_string();
        let provider = Arc::new(ScriptedProvider::new(vec![
            delta("a"),
            final_with_text,
            delta("late"),
        ]));
        let (pipeline, _store, _dir) = make_pipeline(provider).await;

        let events = run(&pipeline, pipeline.tree_of_abstraction("x")).await;
        assert_eq!(events, vec![fragment("a"), fragment("end"), StreamEvent::Complete]);
    }

    #[tokio::test]
    async fn test_sentinel_without_finish_reason() {
        let provider = Arc::new(ScriptedProvider::new(vec![delta("only")]));
        let (pipeline, _store, _dir) = make_pipeline(provider).await;

        let events = run(&pipeline, pipeline.tree_of_abstraction("x")).await;
        assert_eq!(events, vec![fragment("only"), StreamEvent::Complete]);
    }

    #[tokio::test]
    async fn test_empty_deltas_not_emitted() {
        let role_only = r#"{"choices":[{"delta":{"role":"assistant"},"finish_reason":null}]}"#;
        let provider = Arc::new(ScriptedProvider::new(vec![
            role_only.to_string(),
            delta(""),
            delta("x"),
            stop(),
        ]));
        let (pipeline, _store, _dir) = make_pipeline(provider).await;

        let events = run(&pipeline, pipeline.tree_of_abstraction("x")).await;
        assert_eq!(events, vec![fragment("x"), StreamEvent::Complete]);
    }

    #[tokio::test]
    async fn test_open_failure_reports_error_then_completes() {
        let provider = Arc::new(ScriptedProvider {
            fail_open: true,
            ..Default::default()
        });
        let (pipeline, _store, _dir) = make_pipeline(provider).await;

        let events = run(&pipeline, pipeline.tree_of_abstraction("x")).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], StreamEvent::Error(msg) if msg.contains("scripted open failure")));
        assert_eq!(events[1], StreamEvent::Complete);
    }

    #[tokio::test]
    async fn test_midstream_failure() {
        let provider = Arc::new(ScriptedProvider {
            payloads: vec![delta("a"), delta("b"), stop()],
            break_after: Some(1),
            ..Default::default()
        });
        let (pipeline, _store, _dir) = make_pipeline(provider).await;

        let events = run(&pipeline, pipeline.tree_of_abstraction("x")).await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], fragment("a"));
        assert!(matches!(&events[1], StreamEvent::Error(_)));
        assert_eq!(events[2], StreamEvent::Complete);
    }

    #[tokio::test]
    async fn test_drive_is_lazy() {
        let provider = Arc::new(ScriptedProvider::new(vec![stop()]));
        let (pipeline, _store, _dir) = make_pipeline(provider.clone()).await;

        let stream = pipeline.drive(pipeline.tree_of_abstraction("x"), "s".to_string());
        assert_eq!(provider.opened(), 0);
        drop(stream);
        assert_eq!(provider.opened(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_stream_stops_pulling() {
        let provider = Arc::new(ScriptedProvider::new(vec![delta("a"), delta("b"), stop()]));
        let (pipeline, _store, _dir) = make_pipeline(provider.clone()).await;

        let stream = pipeline.drive(pipeline.tree_of_abstraction("x"), "s".to_string());
        futures::pin_mut!(stream);
        assert_eq!(stream.next().await, Some(fragment("a")));
        drop(stream);
        assert_eq!(provider.opened(), 1);
    }

    #[tokio::test]
    async fn test_answer_task_request() {
        let provider = Arc::new(ScriptedProvider::new(vec![stop()]));
        let (pipeline, _store, _dir) = make_pipeline(provider.clone()).await;

        let task = pipeline.answer_question("Why?", Some("Be brief."));
        assert_eq!(task.kind, GenerationKind::Answer);
        run(&pipeline, task).await;

        let request = provider.last_request().unwrap();
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.max_tokens, Some(4096));
        assert_eq!(request.temperature, Some(0.0));
    }

    #[tokio::test]
    async fn test_recommend_uses_graph_neighbourhood() {
        let provider = Arc::new(ScriptedProvider::new(vec![stop()]));
        let (pipeline, store, _dir) = make_pipeline(provider).await;
        store.write("B", &[], "[c](<node:C>)").await.unwrap();

        let task = pipeline.recommend("A", "[b](<node:B>)").await.unwrap();
        assert_eq!(task.kind, GenerationKind::Recommendation);
        let prompt = &task.request.messages[0].content;
        assert!(prompt.contains("such as ['B']"));
        assert!(prompt.contains("including ['C']"));
    }
}

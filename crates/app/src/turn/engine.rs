//! The turn-taking event loop.
//!
//! One engine task per session owns every piece of session state and every
//! adapter handle. Provider I/O runs as sibling tasks that communicate with
//! the engine exclusively through the inbound queue; the engine suspends
//! only on that queue, on bounded cancellation waits, and on the bounded
//! retrieval call.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use parlance_audio::{
    AudioFrame, FrameAssembler, PreSpeechBuffer, RawAudio, ResamplerQuality, FRAME_DURATION,
};
use parlance_foundation::{
    LlmError, OrchestratorError, RecoveryStrategy, SessionState, StateTracker, SttError,
    TimeoutConfig,
};
use parlance_llm::{ChatMessage, FinishReason, LlmEvent, LlmRequest, LlmTurn};
use parlance_retrieval::{retrieve_bounded, Retriever};
use parlance_stt::{SttSession, TranscriptEvent};
use parlance_telemetry::PipelineMetrics;
use parlance_tts::{SpeakLock, SpeakPermit, TtsEvent, TtsSession};
use parlance_vad::{EnergyVad, VadConfig, VadDetector, VadEvent};

use crate::agent::AgentSnapshot;
use crate::session::events::{spawn_forwarder, EventPublisher, PublishedEvent, SessionEvent};
use crate::turn::history::{ConversationHistory, Turn};
use crate::turn::sentence::{AccumulatorConfig, SentenceAccumulator};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub timeouts: TimeoutConfig,
    pub vad: VadConfig,
    pub accumulator: AccumulatorConfig,
    pub history_token_budget: usize,
    pub prespeech_window: Duration,
    pub fallback_text: String,
    pub resampler_quality: ResamplerQuality,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            vad: VadConfig::default(),
            accumulator: AccumulatorConfig::default(),
            history_token_budget: 2_048,
            prespeech_window: parlance_audio::DEFAULT_PRESPEECH,
            fallback_text: "Désolé, je n'ai pas entendu. Pouvez-vous répéter ?".to_string(),
            resampler_quality: ResamplerQuality::Balanced,
        }
    }
}

/// Everything the engine is wired with at session creation.
pub struct EngineDeps {
    pub session_id: Uuid,
    pub agent: Arc<AgentSnapshot>,
    pub events_rx: mpsc::Receiver<SessionEvent>,
    pub events_tx: mpsc::Sender<SessionEvent>,
    pub outbound: mpsc::Sender<AudioFrame>,
    pub publisher: EventPublisher,
    pub retriever: Arc<dyn Retriever>,
    pub metrics: Arc<PipelineMetrics>,
    pub config: EngineConfig,
}

struct ActiveStt {
    session: SttSession,
    forwarder: JoinHandle<()>,
    /// end-of-audio already signalled; stop pushing frames
    finished: bool,
    retried: bool,
}

struct ActiveLlm {
    handle: LlmTurn,
    cancel: CancellationToken,
    forwarder: JoinHandle<()>,
    retried: bool,
    opened_at: Instant,
}

struct ActiveTts {
    session: TtsSession,
    cancel: CancellationToken,
    forwarder: JoinHandle<()>,
    _permit: SpeakPermit,
    /// adapter-rate PCM to canonical frames
    assembler: FrameAssembler,
    /// odd trailing byte from the previous chunk
    carry: Option<u8>,
    first_audio_seen: bool,
    opened_at: Instant,
}

struct TurnInProgress {
    user_text: Option<String>,
    llm_text: String,
    /// text already handed to synthesis; what the user actually heard
    flushed_text: String,
    started_at: DateTime<Utc>,
    retrieval_failed: bool,
    pending_tool_calls: Vec<(String, String)>,
    working_messages: Vec<ChatMessage>,
}

impl TurnInProgress {
    fn new() -> Self {
        Self {
            user_text: None,
            llm_text: String::new(),
            flushed_text: String::new(),
            started_at: Utc::now(),
            retrieval_failed: false,
            pending_tool_calls: Vec::new(),
            working_messages: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeadlineKind {
    SttFinal,
    LlmFirstToken,
    TtsFirstAudio,
    Idle,
}

enum Wake {
    Event(SessionEvent),
    Deadline(DeadlineKind),
    QueueClosed,
}

pub struct TurnEngine {
    id: Uuid,
    agent: Arc<AgentSnapshot>,
    cfg: EngineConfig,
    state: StateTracker,
    rx: mpsc::Receiver<SessionEvent>,
    tx: mpsc::Sender<SessionEvent>,
    /// events set aside during a bounded cancellation wait, replayed in order
    replay: VecDeque<SessionEvent>,
    outbound: mpsc::Sender<AudioFrame>,
    publisher: EventPublisher,
    retriever: Arc<dyn Retriever>,
    metrics: Arc<PipelineMetrics>,

    assembler: FrameAssembler,
    prespeech: PreSpeechBuffer,
    vad: VadDetector,
    speak_lock: SpeakLock,

    history: ConversationHistory,
    accumulator: SentenceAccumulator,

    /// Turn generation: provider events from an older generation are stale.
    generation: u64,
    stt: Option<ActiveStt>,
    llm: Option<ActiveLlm>,
    tts: Option<ActiveTts>,
    turn: Option<TurnInProgress>,
    /// The current synthesis is the spoken apology, not an agent turn.
    fallback_active: bool,
    last_out_frame: Option<AudioFrame>,

    stt_final_deadline: Option<Instant>,
    llm_first_deadline: Option<Instant>,
    tts_first_deadline: Option<Instant>,
    idle_deadline: Option<Instant>,
}

impl TurnEngine {
    pub fn new(deps: EngineDeps) -> Self {
        let vad = VadDetector::new(Box::new(EnergyVad::default()), &deps.config.vad);
        Self {
            id: deps.session_id,
            agent: deps.agent,
            state: StateTracker::new(),
            rx: deps.events_rx,
            tx: deps.events_tx,
            replay: VecDeque::new(),
            outbound: deps.outbound,
            publisher: deps.publisher,
            retriever: deps.retriever,
            metrics: deps.metrics,
            assembler: FrameAssembler::new(deps.config.resampler_quality),
            prespeech: PreSpeechBuffer::new(deps.config.prespeech_window),
            vad,
            speak_lock: SpeakLock::new(),
            history: ConversationHistory::new(),
            accumulator: SentenceAccumulator::new(deps.config.accumulator.clone()),
            generation: 0,
            stt: None,
            llm: None,
            tts: None,
            turn: None,
            fallback_active: false,
            last_out_frame: None,
            stt_final_deadline: None,
            llm_first_deadline: None,
            tts_first_deadline: None,
            idle_deadline: None,
            cfg: deps.config,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(session = %self.id, agent = %self.agent.id, "session engine started");
        self.arm_idle();

        loop {
            let outcome = match self.next_wake().await {
                Wake::Event(event) => self.handle_event(event).await,
                Wake::Deadline(kind) => self.handle_deadline(kind).await,
                Wake::QueueClosed => {
                    self.close().await;
                    Ok(())
                }
            };
            if let Err(err) = outcome {
                self.fail(err).await;
            }
            if self.state.current() == SessionState::Closed {
                break;
            }
        }

        tracing::info!(
            session = %self.id,
            metrics = %self.metrics.summary(),
            "session engine stopped"
        );
    }

    // ── event intake ─────────────────────────────────────────────────────

    async fn next_wake(&mut self) -> Wake {
        if let Some(event) = self.replay.pop_front() {
            return Wake::Event(event);
        }
        match self.nearest_deadline() {
            Some((at, kind)) => tokio::select! {
                event = self.rx.recv() => match event {
                    Some(e) => Wake::Event(e),
                    None => Wake::QueueClosed,
                },
                _ = tokio::time::sleep_until(at) => Wake::Deadline(kind),
            },
            None => match self.rx.recv().await {
                Some(e) => Wake::Event(e),
                None => Wake::QueueClosed,
            },
        }
    }

    fn nearest_deadline(&self) -> Option<(Instant, DeadlineKind)> {
        [
            (self.stt_final_deadline, DeadlineKind::SttFinal),
            (self.llm_first_deadline, DeadlineKind::LlmFirstToken),
            (self.tts_first_deadline, DeadlineKind::TtsFirstAudio),
            (self.idle_deadline, DeadlineKind::Idle),
        ]
        .into_iter()
        .filter_map(|(at, kind)| at.map(|a| (a, kind)))
        .min_by_key(|(at, _)| *at)
    }

    async fn handle_event(&mut self, event: SessionEvent) -> Result<(), OrchestratorError> {
        match event {
            SessionEvent::Frame(raw) => self.on_raw_audio(raw).await,
            SessionEvent::Discontinuity { gap } => {
                tracing::warn!(session = %self.id, gap_ms = gap.as_millis() as u64, "audio discontinuity");
                PipelineMetrics::add(
                    &self.metrics.silence_frames_inserted,
                    (gap.as_millis() / FRAME_DURATION.as_millis()) as u64,
                );
                let frames = self.assembler.insert_silence(gap);
                for frame in frames {
                    self.on_canonical_frame(frame).await?;
                }
                Ok(())
            }
            SessionEvent::TransportClosed | SessionEvent::Cancel => {
                self.close().await;
                Ok(())
            }
            SessionEvent::UserText(text) => self.on_user_text(text).await,
            SessionEvent::Stt { turn, event } => {
                if turn != self.generation {
                    self.drop_stale("stt");
                    return Ok(());
                }
                self.on_stt_event(event).await
            }
            SessionEvent::Llm { turn, event } => {
                if turn != self.generation {
                    self.drop_stale("llm");
                    return Ok(());
                }
                self.on_llm_event(event).await
            }
            SessionEvent::Tts { turn, event } => {
                if turn != self.generation {
                    self.drop_stale("tts");
                    return Ok(());
                }
                self.on_tts_event(event).await
            }
        }
    }

    fn drop_stale(&self, source: &str) {
        PipelineMetrics::incr(&self.metrics.stale_events_dropped);
        tracing::warn!(session = %self.id, source, "dropping stale provider event");
    }

    // ── audio path ───────────────────────────────────────────────────────

    async fn on_raw_audio(&mut self, raw: RawAudio) -> Result<(), OrchestratorError> {
        let frames = match self.assembler.ingest(&raw) {
            Ok(frames) => frames,
            Err(err) => {
                tracing::warn!(session = %self.id, error = %err, "dropping malformed audio chunk");
                return Ok(());
            }
        };
        for frame in frames {
            self.on_canonical_frame(frame).await?;
        }
        Ok(())
    }

    async fn on_canonical_frame(&mut self, frame: AudioFrame) -> Result<(), OrchestratorError> {
        PipelineMetrics::incr(&self.metrics.frames_in);

        // the buffer only fills while no STT session is open, which keeps
        // everything in it strictly older than the next speech-start
        if self.stt.is_none() {
            self.prespeech.push(frame.clone());
        }

        let vad_event = self.vad.process(&frame);

        if let Some(stt) = &self.stt {
            if !stt.finished {
                stt.session.push(frame);
            }
        }

        match vad_event {
            Some(VadEvent::SpeechStart { .. }) => self.on_speech_start().await,
            Some(VadEvent::SpeechContinue { duration_ms, .. }) => {
                self.publisher
                    .emit(PublishedEvent::SpeechHeartbeat { duration_ms });
                Ok(())
            }
            Some(VadEvent::SpeechEnd { duration_ms, .. }) => {
                PipelineMetrics::incr(&self.metrics.speech_ends);
                self.publisher.emit(PublishedEvent::SpeechEnded { duration_ms });
                if self.state.current() == SessionState::Listening {
                    if let Some(stt) = self.stt.as_mut() {
                        stt.session.finish();
                        stt.finished = true;
                    }
                    self.stt_final_deadline =
                        Some(Instant::now() + self.cfg.timeouts.stt_final());
                }
                Ok(())
            }
            Some(VadEvent::Saturated { consecutive_errors }) => {
                Err(parlance_foundation::VadError::Saturated { consecutive_errors }.into())
            }
            None => Ok(()),
        }
    }

    async fn on_speech_start(&mut self) -> Result<(), OrchestratorError> {
        PipelineMetrics::incr(&self.metrics.speech_starts);
        self.metrics.mark_speech();
        self.publisher.emit(PublishedEvent::SpeechStarted);

        match self.state.current() {
            SessionState::Idle => self.start_listening().await,
            SessionState::Speaking | SessionState::Thinking => {
                self.interrupt_agent_turn().await;
                self.start_listening().await
            }
            // already listening or tearing down: nothing to do
            _ => Ok(()),
        }
    }

    // ── listening ────────────────────────────────────────────────────────

    async fn start_listening(&mut self) -> Result<(), OrchestratorError> {
        self.generation += 1;
        self.idle_deadline = None;
        self.turn = Some(TurnInProgress::new());
        self.set_state(SessionState::Listening)?;
        self.open_stt(false).await
    }

    async fn open_stt(&mut self, is_retry: bool) -> Result<(), OrchestratorError> {
        let (events_tx, events_rx) = mpsc::channel(64);
        let generation = self.generation;
        let opened = self
            .agent
            .stt
            .open(&self.agent.stt_config, events_tx)
            .await;

        let session = match opened {
            Ok(session) => session,
            Err(err) => {
                let err = OrchestratorError::from(err);
                if err.recovery_strategy() == RecoveryStrategy::RetryOnce && !is_retry {
                    PipelineMetrics::incr(&self.metrics.stt_retries);
                    tracing::warn!(session = %self.id, error = %err, "stt open failed, retrying once");
                    return Box::pin(self.open_stt(true)).await;
                }
                PipelineMetrics::incr(&self.metrics.stt_errors);
                self.publish_error("stt.fatal", &err.to_string());
                self.turn = None;
                return self.speak_fallback().await;
            }
        };

        let forwarder = spawn_forwarder(events_rx, self.tx.clone(), move |event| {
            SessionEvent::Stt {
                turn: generation,
                event,
            }
        });

        // leading phonemes from before the detector fired go first
        for frame in self.prespeech.drain() {
            session.push(frame);
        }

        self.stt = Some(ActiveStt {
            session,
            forwarder,
            finished: false,
            retried: is_retry,
        });
        Ok(())
    }

    async fn on_stt_event(&mut self, event: TranscriptEvent) -> Result<(), OrchestratorError> {
        match event {
            TranscriptEvent::Interim { text, .. } => {
                self.publisher.emit(PublishedEvent::InterimTranscript { text });
                Ok(())
            }
            TranscriptEvent::Final { text, .. } => {
                if let Some(deadline_set_at) = self.stt_final_deadline.take() {
                    let waited = self.cfg.timeouts.stt_final()
                        - deadline_set_at.saturating_duration_since(Instant::now());
                    PipelineMetrics::gauge(
                        &self.metrics.stt_final_wait_ms,
                        waited.as_millis() as u64,
                    );
                }
                self.teardown_stt();

                if text.trim().is_empty() {
                    PipelineMetrics::incr(&self.metrics.turns_discarded);
                    self.publisher.emit(PublishedEvent::TurnDiscarded);
                    self.turn = None;
                    return self.enter_idle();
                }
                self.begin_thinking(text).await
            }
            TranscriptEvent::Failed { transient, message } => {
                PipelineMetrics::incr(&self.metrics.stt_errors);
                let already_retried = self.stt.as_ref().map(|s| s.retried).unwrap_or(false);
                self.teardown_stt();
                let err: OrchestratorError = if transient {
                    SttError::Transient(message).into()
                } else {
                    SttError::Fatal(message).into()
                };
                if err.recovery_strategy() == RecoveryStrategy::RetryOnce && !already_retried {
                    PipelineMetrics::incr(&self.metrics.stt_retries);
                    tracing::warn!(session = %self.id, error = %err, "stt stream failed, retrying once");
                    return self.open_stt(true).await;
                }
                self.publish_error("stt.fatal", &err.to_string());
                self.turn = None;
                self.speak_fallback().await
            }
        }
    }

    // ── thinking ─────────────────────────────────────────────────────────

    async fn begin_thinking(&mut self, user_text: String) -> Result<(), OrchestratorError> {
        self.set_state(SessionState::Thinking)?;
        self.publisher.emit(PublishedEvent::FinalTranscript {
            text: user_text.clone(),
        });

        // bounded retrieval; degradation is recorded, never fatal
        let (contexts, retrieval_failed) = match self.agent.retrieval_top_k {
            Some(top_k) => {
                retrieve_bounded(
                    &self.retriever,
                    &user_text,
                    top_k,
                    self.cfg.timeouts.retrieval(),
                )
                .await
            }
            None => (Vec::new(), false),
        };

        let context_texts: Vec<String> = contexts.into_iter().map(|c| c.text).collect();
        let messages = parlance_llm::build_prompt(
            &self.agent.system_prompt,
            &context_texts,
            &self.history.as_prompt_turns(),
            &user_text,
            self.cfg.history_token_budget,
        );

        let turn = self
            .turn
            .get_or_insert_with(TurnInProgress::new);
        turn.user_text = Some(user_text);
        turn.retrieval_failed = retrieval_failed;
        turn.working_messages = messages;

        self.open_llm(false).await
    }

    async fn open_llm(&mut self, is_retry: bool) -> Result<(), OrchestratorError> {
        let Some(turn) = self.turn.as_ref() else {
            return Ok(());
        };
        let request = LlmRequest::new(turn.working_messages.clone())
            .with_tools(self.agent.tools.iter().map(|t| t.spec()).collect());

        let cancel = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::channel(256);
        let generation = self.generation;

        let opened = self
            .agent
            .llm
            .stream(&self.agent.llm_config, request, events_tx, cancel.clone())
            .await;

        let handle = match opened {
            Ok(handle) => handle,
            Err(err) => {
                let err = OrchestratorError::from(err);
                if err.recovery_strategy() == RecoveryStrategy::RetryOnce && !is_retry {
                    tracing::warn!(session = %self.id, error = %err, "llm open failed, retrying once");
                    return Box::pin(self.open_llm(true)).await;
                }
                return self.llm_fatal(&err.to_string()).await;
            }
        };

        let forwarder = spawn_forwarder(events_rx, self.tx.clone(), move |event| {
            SessionEvent::Llm {
                turn: generation,
                event,
            }
        });

        self.llm = Some(ActiveLlm {
            handle,
            cancel,
            forwarder,
            retried: is_retry,
            opened_at: Instant::now(),
        });
        self.llm_first_deadline = Some(Instant::now() + self.cfg.timeouts.llm_first_token());
        Ok(())
    }

    async fn on_llm_event(&mut self, event: LlmEvent) -> Result<(), OrchestratorError> {
        match event {
            LlmEvent::Delta(text) => {
                if self.llm_first_deadline.take().is_some() {
                    if let Some(llm) = &self.llm {
                        PipelineMetrics::gauge(
                            &self.metrics.llm_first_token_ms,
                            llm.opened_at.elapsed().as_millis() as u64,
                        );
                    }
                }
                PipelineMetrics::incr(&self.metrics.llm_tokens);
                let Some(turn) = self.turn.as_mut() else {
                    return Ok(());
                };
                turn.llm_text.push_str(&text);
                let sentences = self.accumulator.push(&text);
                for sentence in sentences {
                    self.speak_sentence(sentence).await?;
                    // a synthesis-open failure ends the turn mid-loop
                    if self.llm.is_none() {
                        break;
                    }
                }
                Ok(())
            }
            LlmEvent::ToolCall { name, arguments } => {
                self.llm_first_deadline = None;
                if let Some(turn) = self.turn.as_mut() {
                    turn.pending_tool_calls.push((name, arguments));
                }
                Ok(())
            }
            LlmEvent::End(FinishReason::ToolCalls) => {
                self.llm = None;
                self.run_pending_tools().await
            }
            LlmEvent::End(FinishReason::Stop) | LlmEvent::End(FinishReason::Length) => {
                self.llm_first_deadline = None;
                self.llm = None;
                if let Some(rest) = self.accumulator.take_rest() {
                    self.speak_sentence(rest).await?;
                }
                match &self.tts {
                    Some(tts) => {
                        tts.session.finish();
                        Ok(())
                    }
                    // the model produced no speakable text at all
                    None => self.complete_turn(false, false).await,
                }
            }
            LlmEvent::End(FinishReason::Cancelled) => {
                // our own cancellation echoing back outside a bounded wait
                tracing::debug!(session = %self.id, "llm cancellation confirmed late");
                self.llm = None;
                Ok(())
            }
            LlmEvent::Failed { transient, message } => {
                PipelineMetrics::incr(&self.metrics.llm_errors);
                let already_retried = self.llm.as_ref().map(|l| l.retried).unwrap_or(false);
                self.teardown_llm();
                // a retry restarts the response from scratch, so it is only
                // safe while nothing has been spoken yet
                let nothing_spoken = self
                    .turn
                    .as_ref()
                    .map(|t| t.flushed_text.is_empty())
                    .unwrap_or(true);
                let err: OrchestratorError = if transient {
                    LlmError::Transient(message).into()
                } else {
                    LlmError::Fatal(message).into()
                };
                if err.recovery_strategy() == RecoveryStrategy::RetryOnce
                    && !already_retried
                    && nothing_spoken
                {
                    tracing::warn!(session = %self.id, error = %err, "llm stream failed, retrying once");
                    if let Some(turn) = self.turn.as_mut() {
                        turn.llm_text.clear();
                    }
                    self.accumulator.discard();
                    return self.open_llm(true).await;
                }
                self.llm_fatal(&err.to_string()).await
            }
        }
    }

    async fn run_pending_tools(&mut self) -> Result<(), OrchestratorError> {
        let calls = match self.turn.as_mut() {
            Some(turn) => std::mem::take(&mut turn.pending_tool_calls),
            None => return Ok(()),
        };

        for (name, arguments) in calls {
            PipelineMetrics::incr(&self.metrics.tool_invocations);
            let result = match self.agent.tools.iter().find(|t| t.name() == name) {
                Some(tool) => match tool.execute(&arguments).await {
                    Ok(output) => output,
                    Err(err) => format!("tool error: {err}"),
                },
                None => format!("tool error: unknown tool {name}"),
            };
            self.publisher
                .emit(PublishedEvent::ToolInvoked { name: name.clone() });
            if let Some(turn) = self.turn.as_mut() {
                turn.working_messages
                    .push(ChatMessage::assistant(format!("[calling {name}({arguments})]")));
                turn.working_messages
                    .push(ChatMessage::tool_result(name, result));
            }
        }

        // resume the model with the results appended
        self.open_llm(false).await
    }

    async fn llm_fatal(&mut self, message: &str) -> Result<(), OrchestratorError> {
        self.publish_error("llm.fatal", message);
        self.teardown_llm();
        self.teardown_tts();
        self.accumulator.discard();

        // whatever partial text the model produced stays in the record
        if let Some(turn) = self.turn.take() {
            if let Some(user_text) = turn.user_text {
                self.append_turn(
                    user_text,
                    turn.llm_text,
                    false,
                    true,
                    turn.retrieval_failed,
                    turn.started_at,
                );
            }
        }
        self.speak_fallback().await
    }

    // ── speaking ─────────────────────────────────────────────────────────

    async fn speak_sentence(&mut self, sentence: String) -> Result<(), OrchestratorError> {
        if self.tts.is_none() {
            if let Err(err) = self.open_tts().await {
                PipelineMetrics::incr(&self.metrics.tts_errors);
                self.publish_error("tts.fatal", &err.to_string());
                self.teardown_llm();
                self.accumulator.discard();
                return self.complete_turn(true, true).await;
            }
            self.set_state(SessionState::Speaking)?;
        }
        if let Some(turn) = self.turn.as_mut() {
            turn.flushed_text.push_str(&sentence);
        }
        self.publisher.emit(PublishedEvent::AssistantSentence {
            text: sentence.clone(),
        });
        if let Some(tts) = &self.tts {
            tts.session.push_text(sentence);
        }
        Ok(())
    }

    async fn open_tts(&mut self) -> Result<(), OrchestratorError> {
        let permit = self.speak_lock.acquire()?;
        let cancel = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::channel(256);
        let generation = self.generation;

        let session = self
            .agent
            .tts
            .open(&self.agent.tts_config, events_tx, cancel.clone())
            .await?;

        let forwarder = spawn_forwarder(events_rx, self.tx.clone(), move |event| {
            SessionEvent::Tts {
                turn: generation,
                event,
            }
        });

        self.tts = Some(ActiveTts {
            session,
            cancel,
            forwarder,
            _permit: permit,
            assembler: FrameAssembler::new(self.cfg.resampler_quality),
            carry: None,
            first_audio_seen: false,
            opened_at: Instant::now(),
        });
        self.tts_first_deadline = Some(Instant::now() + self.cfg.timeouts.tts_first_audio());
        Ok(())
    }

    async fn on_tts_event(&mut self, event: TtsEvent) -> Result<(), OrchestratorError> {
        match event {
            TtsEvent::Audio { pcm, sample_rate } => {
                PipelineMetrics::add(&self.metrics.tts_audio_bytes, pcm.len() as u64);
                let ingested = {
                    let Some(tts) = self.tts.as_mut() else {
                        return Ok(());
                    };
                    if !tts.first_audio_seen {
                        tts.first_audio_seen = true;
                        self.tts_first_deadline = None;
                        PipelineMetrics::gauge(
                            &self.metrics.tts_first_audio_ms,
                            tts.opened_at.elapsed().as_millis() as u64,
                        );
                    }

                    // byte stream to samples, carrying an odd tail across
                    // chunks
                    let mut bytes = Vec::with_capacity(pcm.len() + 1);
                    if let Some(carry) = tts.carry.take() {
                        bytes.push(carry);
                    }
                    bytes.extend_from_slice(&pcm);
                    if bytes.len() % 2 != 0 {
                        tts.carry = bytes.pop();
                    }
                    let raw = RawAudio::from_le_bytes(&bytes, sample_rate, 1);
                    tts.assembler.ingest(&raw)
                };
                match ingested {
                    Ok(frames) => {
                        for frame in frames {
                            self.forward_frame(frame);
                        }
                    }
                    Err(err) => {
                        tracing::warn!(session = %self.id, error = %err, "unusable synthesis chunk");
                    }
                }
                Ok(())
            }
            TtsEvent::End => {
                if let Some(llm) = &self.llm {
                    // the synthesizer should outlive the model stream; if it
                    // ends early, the model has nowhere to speak to
                    tracing::warn!(session = %self.id, "tts ended while llm still streaming");
                    llm.cancel.cancel();
                }
                self.teardown_llm();

                let tail = self.tts.as_mut().and_then(|t| t.assembler.flush_padded());
                if let Some(tail) = tail {
                    self.forward_frame(tail);
                }
                self.teardown_tts();

                if self.fallback_active {
                    self.fallback_active = false;
                    self.turn = None;
                    return self.enter_idle();
                }
                self.complete_turn(false, false).await
            }
            TtsEvent::Failed { message } => {
                PipelineMetrics::incr(&self.metrics.tts_errors);
                self.publish_error("tts.fatal", &message);
                // already-emitted audio plays out; no retry
                self.teardown_llm();
                self.teardown_tts();
                self.accumulator.discard();
                if self.fallback_active {
                    self.fallback_active = false;
                    self.turn = None;
                    return self.enter_idle();
                }
                self.complete_turn(true, false).await
            }
        }
    }

    fn forward_frame(&mut self, frame: AudioFrame) {
        match self.outbound.try_send(frame.clone()) {
            Ok(()) => {
                PipelineMetrics::incr(&self.metrics.frames_out);
                self.last_out_frame = Some(frame);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                // stale audio is worse than a dropped frame
                PipelineMetrics::incr(&self.metrics.frames_dropped_out);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    // ── turn completion, interruption, fallback ──────────────────────────

    async fn complete_turn(
        &mut self,
        interrupted: bool,
        use_flushed_text: bool,
    ) -> Result<(), OrchestratorError> {
        if let Some(turn) = self.turn.take() {
            if let Some(user_text) = turn.user_text {
                let assistant = if use_flushed_text {
                    turn.flushed_text
                } else {
                    turn.llm_text
                };
                self.append_turn(
                    user_text,
                    assistant,
                    interrupted,
                    false,
                    turn.retrieval_failed,
                    turn.started_at,
                );
            }
        }
        self.enter_idle()
    }

    fn append_turn(
        &mut self,
        user_text: String,
        assistant_text: String,
        interrupted: bool,
        incomplete: bool,
        retrieval_failed: bool,
        started_at: DateTime<Utc>,
    ) {
        if interrupted {
            PipelineMetrics::incr(&self.metrics.turns_interrupted);
        } else {
            PipelineMetrics::incr(&self.metrics.turns_completed);
        }
        self.publisher.emit(PublishedEvent::TurnCompleted {
            user: user_text.clone(),
            assistant: assistant_text.clone(),
            interrupted,
        });
        self.history.push(Turn {
            user_text,
            assistant_text,
            started_at,
            completed_at: Utc::now(),
            interrupted,
            incomplete,
            retrieval_failed,
        });
    }

    /// Barge-in core: stop audio, cancel the model and the synthesizer,
    /// wait (bounded) for confirmations, record the interrupted turn.
    async fn interrupt_agent_turn(&mut self) {
        PipelineMetrics::incr(&self.metrics.barge_ins);
        self.publisher.emit(PublishedEvent::BargeIn);
        let started = Instant::now();

        // 1. cut outbound audio inside one frame
        if let Some(mut fade) = self.last_out_frame.take() {
            fade.timestamp += FRAME_DURATION;
            fade.fade_out();
            self.forward_frame(fade);
            self.last_out_frame = None;
        }

        // 2. cooperative cancellation
        let mut llm_pending = false;
        if let Some(llm) = &self.llm {
            llm.cancel.cancel();
            llm_pending = true;
        }
        let mut tts_pending = false;
        if let Some(tts) = &self.tts {
            tts.cancel.cancel();
            tts_pending = true;
        }
        self.accumulator.discard();

        // 3. bounded wait for confirmations; unrelated events are set aside
        //    and replayed in order afterwards
        let deadline = started + self.cfg.timeouts.cancellation();
        while llm_pending || tts_pending {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let event = match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(event)) => event,
                _ => break,
            };
            match event {
                SessionEvent::Llm { turn, event } if turn == self.generation => match event {
                    LlmEvent::End(_) | LlmEvent::Failed { .. } => llm_pending = false,
                    _ => {}
                },
                SessionEvent::Tts { turn, event } if turn == self.generation => match event {
                    TtsEvent::End | TtsEvent::Failed { .. } => tts_pending = false,
                    // queued audio from the cancelled turn is discarded
                    TtsEvent::Audio { .. } => {}
                },
                SessionEvent::Frame(raw) => {
                    // keep the user's onset audio flowing into the pre-speech
                    // buffer; detector events wait until the wait is over
                    PipelineMetrics::incr(&self.metrics.frames_in);
                    if let Ok(frames) = self.assembler.ingest(&raw) {
                        for frame in frames {
                            self.vad.process(&frame);
                            self.prespeech.push(frame);
                        }
                    }
                }
                other => self.replay.push_back(other),
            }
        }
        PipelineMetrics::gauge(
            &self.metrics.cancellation_ms,
            started.elapsed().as_millis() as u64,
        );
        if llm_pending || tts_pending {
            tracing::warn!(
                session = %self.id,
                llm_pending,
                tts_pending,
                "cancellation deadline expired, aborting provider tasks"
            );
        }

        // past the deadline the tasks are discarded outright
        self.teardown_llm();
        self.teardown_tts();

        // 4. the cut-off response enters history exactly as far as it was
        //    spoken
        if let Some(turn) = self.turn.take() {
            if let Some(user_text) = turn.user_text {
                self.append_turn(
                    user_text,
                    turn.flushed_text,
                    true,
                    false,
                    turn.retrieval_failed,
                    turn.started_at,
                );
            }
        }
        self.fallback_active = false;
        self.llm_first_deadline = None;
        self.tts_first_deadline = None;
    }

    async fn speak_fallback(&mut self) -> Result<(), OrchestratorError> {
        PipelineMetrics::incr(&self.metrics.fallbacks_spoken);
        // orphan any straggling provider events from the aborted turn
        self.generation += 1;
        self.fallback_active = true;
        self.accumulator.discard();

        if let Err(err) = self.open_tts().await {
            tracing::error!(session = %self.id, error = %err, "fallback synthesis unavailable");
            self.fallback_active = false;
            return self.enter_idle();
        }
        self.set_state(SessionState::Speaking)?;
        if let Some(tts) = &self.tts {
            tts.session.push_text(self.cfg.fallback_text.clone());
            tts.session.finish();
        }
        Ok(())
    }

    // ── text-mode input ──────────────────────────────────────────────────

    async fn on_user_text(&mut self, text: String) -> Result<(), OrchestratorError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        match self.state.current() {
            SessionState::Speaking | SessionState::Thinking => {
                self.interrupt_agent_turn().await;
                self.set_state(SessionState::Idle)?;
            }
            SessionState::Listening => {
                // typed text supersedes the utterance in flight
                self.teardown_stt();
                self.turn = None;
                self.set_state(SessionState::Idle)?;
            }
            SessionState::Idle => {}
            _ => return Ok(()),
        }
        self.generation += 1;
        self.idle_deadline = None;
        self.turn = Some(TurnInProgress::new());
        self.begin_thinking(text).await
    }

    // ── deadlines ────────────────────────────────────────────────────────

    async fn handle_deadline(&mut self, kind: DeadlineKind) -> Result<(), OrchestratorError> {
        match kind {
            DeadlineKind::SttFinal => {
                self.stt_final_deadline = None;
                PipelineMetrics::incr(&self.metrics.stt_errors);
                self.publish_error("stt.timeout", "no final transcript after speech end");
                self.teardown_stt();
                self.turn = None;
                self.speak_fallback().await
            }
            DeadlineKind::LlmFirstToken => {
                self.llm_first_deadline = None;
                PipelineMetrics::incr(&self.metrics.llm_errors);
                self.llm_fatal("no token from provider within deadline").await
            }
            DeadlineKind::TtsFirstAudio => {
                self.tts_first_deadline = None;
                PipelineMetrics::incr(&self.metrics.tts_errors);
                self.publish_error("tts.fatal", "no audio from provider within deadline");
                self.teardown_llm();
                self.teardown_tts();
                self.accumulator.discard();
                if self.fallback_active {
                    self.fallback_active = false;
                    self.turn = None;
                    return self.enter_idle();
                }
                self.complete_turn(true, true).await
            }
            DeadlineKind::Idle => {
                tracing::info!(session = %self.id, "idle timeout, closing session");
                self.close().await;
                Ok(())
            }
        }
    }

    // ── state plumbing ───────────────────────────────────────────────────

    fn set_state(&mut self, to: SessionState) -> Result<(), OrchestratorError> {
        if self.state.current() == to {
            return Ok(());
        }
        let from = self.state.transition(to)?;
        self.publisher.emit(PublishedEvent::StateChanged { from, to });
        Ok(())
    }

    fn enter_idle(&mut self) -> Result<(), OrchestratorError> {
        self.set_state(SessionState::Idle)?;
        self.accumulator.discard();
        self.last_out_frame = None;
        self.stt_final_deadline = None;
        self.llm_first_deadline = None;
        self.tts_first_deadline = None;
        self.arm_idle();
        Ok(())
    }

    fn arm_idle(&mut self) {
        self.idle_deadline = Some(Instant::now() + self.cfg.timeouts.session_idle());
    }

    fn publish_error(&self, kind: &str, message: &str) {
        tracing::error!(session = %self.id, kind, message, "session error");
        self.publisher.emit(PublishedEvent::Error {
            kind: kind.to_string(),
            message: message.to_string(),
        });
    }

    async fn fail(&mut self, err: OrchestratorError) {
        match err.recovery_strategy() {
            RecoveryStrategy::Continue => {
                tracing::warn!(session = %self.id, error = %err, "recoverable fault, session continues");
            }
            RecoveryStrategy::SpokenFallback => {
                self.publish_error("session.error", &err.to_string());
                self.teardown_stt();
                self.teardown_llm();
                self.teardown_tts();
                self.turn = None;
                if self.speak_fallback().await.is_err() {
                    self.close().await;
                }
            }
            // transient errors are retried where they occur; one that still
            // reaches the loop boundary is fatal
            RecoveryStrategy::RetryOnce | RecoveryStrategy::Teardown => {
                self.publish_error("session.fatal", &err.to_string());
                let _ = self.state.transition(SessionState::Error);
                self.close().await;
            }
        }
    }

    async fn close(&mut self) {
        // a response cut off by teardown still enters the record
        if let Some(turn) = self.turn.take() {
            if let Some(user_text) = turn.user_text {
                if !self.fallback_active {
                    self.append_turn(
                        user_text,
                        turn.flushed_text,
                        true,
                        false,
                        turn.retrieval_failed,
                        turn.started_at,
                    );
                }
            }
        }
        self.teardown_stt();
        self.teardown_llm();
        self.teardown_tts();
        self.publisher.emit(PublishedEvent::Closed);
        let _ = self.state.transition(SessionState::Closed);
    }

    fn teardown_stt(&mut self) {
        if let Some(stt) = self.stt.take() {
            stt.forwarder.abort();
            stt.session.abort();
        }
        self.stt_final_deadline = None;
    }

    fn teardown_llm(&mut self) {
        if let Some(llm) = self.llm.take() {
            llm.cancel.cancel();
            llm.forwarder.abort();
            llm.handle.abort();
        }
        self.llm_first_deadline = None;
    }

    fn teardown_tts(&mut self) {
        if let Some(tts) = self.tts.take() {
            tts.cancel.cancel();
            tts.forwarder.abort();
            tts.session.abort();
        }
        self.tts_first_deadline = None;
    }
}

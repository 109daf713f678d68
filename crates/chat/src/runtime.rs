//! Single-task event loop that owns every piece of chat state.
//!
//! Background work (timers, backend calls, feed forwarding) runs in spawned tasks
//! that only post [`LoopEvent`]s back. Session-scoped events carry the
//! [`SessionGeneration`] they were issued under and are dropped once a reset has
//! moved the loop on.
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::context::SessionContext;
use crate::dispatch::{DispatchDelay, MessageDispatcher, RemoteCall, ScheduledCall};
use crate::error::{ChatError, ChatResult};
use crate::events::{
    ErrorTicket, LoopEvent, RemoteOutcome, SessionGeneration, SubscriptionTag, UserAction,
};
use crate::presentation::{
    ChatViewModel, PanelState, ScrollCoordinator, SuggestedPrompts, project,
};
use crate::prompts::parse_suggestions;
use crate::remote::{ChangeFeed, ChatBackend, FeedItem, PromptService};
use crate::store::{ErrorKind, ErrorNotice, SessionStore};
use crate::sync::{RemoteSyncListener, SyncOutcome, fold_change};

/// External collaborators the runtime talks to.
#[derive(Clone)]
pub struct ChatServices {
    pub backend: Arc<dyn ChatBackend>,
    pub feed: Arc<dyn ChangeFeed>,
    pub prompts: Option<Arc<dyn PromptService>>,
}

/// Cloneable front door for a view: push actions, observe frames.
#[derive(Clone)]
pub struct ChatHandle {
    events: mpsc::UnboundedSender<LoopEvent>,
    view: watch::Receiver<ChatViewModel>,
}

impl ChatHandle {
    /// Returns `false` once the loop has stopped.
    pub fn send(&self, action: UserAction) -> bool {
        self.events.send(LoopEvent::Action(action)).is_ok()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatViewModel> {
        self.view.clone()
    }

    pub fn view(&self) -> ChatViewModel {
        self.view.borrow().clone()
    }

    pub fn shutdown(&self) {
        let _ = self.events.send(LoopEvent::Shutdown);
    }
}

pub struct ChatRuntime {
    store: SessionStore,
    dispatcher: MessageDispatcher,
    scroll: ScrollCoordinator,
    panels: PanelState,
    prompts: SuggestedPrompts,
    context: SessionContext,
    sync: RemoteSyncListener,
    backend: Arc<dyn ChatBackend>,
    prompt_service: Option<Arc<dyn PromptService>>,
    generation: SessionGeneration,
    error_ticket: ErrorTicket,
    // Remote calls committed during the current event; started after publishing.
    outbox: Vec<(SessionGeneration, RemoteCall)>,
    events_tx: mpsc::UnboundedSender<LoopEvent>,
    events_rx: mpsc::UnboundedReceiver<LoopEvent>,
    view: watch::Sender<ChatViewModel>,
}

impl ChatRuntime {
    pub fn new(
        services: ChatServices,
        context: SessionContext,
        dispatcher: MessageDispatcher,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let store = SessionStore::new();
        let scroll = ScrollCoordinator::new();
        let panels = PanelState::default();
        let prompts = SuggestedPrompts::default();
        let (view, _) = watch::channel(project(&store, &scroll, &panels, &prompts));

        Self {
            store,
            dispatcher,
            scroll,
            panels,
            prompts,
            context,
            sync: RemoteSyncListener::new(services.feed),
            backend: services.backend,
            prompt_service: services.prompts,
            generation: SessionGeneration::default(),
            error_ticket: ErrorTicket::default(),
            outbox: Vec::new(),
            events_tx,
            events_rx,
            view,
        }
    }

    pub fn handle(&self) -> ChatHandle {
        ChatHandle {
            events: self.events_tx.clone(),
            view: self.view.subscribe(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn view(&self) -> ChatViewModel {
        self.view.borrow().clone()
    }

    /// Drops any session left over from a previous run and asks for prompts.
    pub fn start(&mut self) {
        match self.context.active() {
            Ok(Some(stale)) => {
                tracing::info!(session_id = %stale, "discarding active session from a previous run");
                if let Err(error) = self.context.clear() {
                    tracing::warn!("failed to clear stale session context: {error}");
                }
            }
            Ok(None) => {}
            Err(error) => tracing::warn!("failed to read session context: {error}"),
        }

        self.request_prompts();
        self.publish();
    }

    /// Runs until [`ChatHandle::shutdown`], then tears the session down.
    pub async fn run(mut self) {
        self.start();
        while self.step().await {}
        self.teardown();
    }

    /// Waits for one event and applies it; returns `false` when the loop should stop.
    pub async fn step(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => self.apply(event),
            None => false,
        }
    }

    pub fn apply(&mut self, event: LoopEvent) -> bool {
        let keep_running = match event {
            LoopEvent::Action(action) => {
                self.on_action(action);
                true
            }
            LoopEvent::DispatchDue { generation, call } => {
                if generation == self.generation {
                    self.outbox.push((generation, call));
                } else {
                    tracing::debug!(
                        operation = call.operation(),
                        "dropping deferred call from a previous session"
                    );
                }
                true
            }
            LoopEvent::RemoteCompleted {
                generation,
                outcome,
            } => {
                if generation == self.generation {
                    self.on_remote_completed(outcome);
                } else {
                    tracing::debug!("dropping backend response from a previous session");
                }
                true
            }
            LoopEvent::Feed { tag, item } => {
                self.on_feed(tag, item);
                true
            }
            LoopEvent::FeedClosed { tag } => {
                if self.sync.is_current(tag) {
                    let session_id = self.sync.session_id().cloned();
                    self.sync.stop();
                    if let Some(session_id) = session_id {
                        self.report(ChatError::Subscription {
                            stage: "change-feed-closed",
                            session_id,
                            message: "change feed closed".to_string(),
                        });
                    }
                }
                true
            }
            LoopEvent::ErrorExpired { ticket } => {
                let expired = ticket == self.error_ticket
                    && self.store.error().is_some_and(|notice| notice.kind.is_transient());
                if expired {
                    self.store.set_error(None);
                }
                true
            }
            LoopEvent::PromptsLoaded { generation, result } => {
                if generation == self.generation {
                    self.on_prompts_loaded(result);
                }
                true
            }
            LoopEvent::Shutdown => false,
        };

        self.publish();
        self.flush_outbox();
        keep_running
    }

    /// Releases the subscription, clears the persisted session and resets the store.
    pub fn teardown(&mut self) {
        self.sync.stop();
        if let Err(error) = self.context.clear() {
            tracing::warn!("failed to clear session context on teardown: {error}");
        }
        self.store.reset();
        self.generation = self.generation.next();
        self.outbox.clear();
        self.publish();
        tracing::info!("chat runtime stopped");
    }

    fn on_action(&mut self, action: UserAction) {
        match action {
            UserAction::SetInput(input) => self.store.set_input(input),
            UserAction::SubmitText => {
                let result = self.dispatcher.submit_text_input(&mut self.store);
                self.after_submit(result);
            }
            UserAction::PressEnter => {
                if self.dispatcher.accepts_enter(&self.store) {
                    let result = self.dispatcher.submit_text_input(&mut self.store);
                    self.after_submit(result);
                }
            }
            UserAction::QuickReply(option) => {
                let result = self.dispatcher.submit_quick_reply(&mut self.store, &option);
                self.after_submit(result);
            }
            UserAction::SuggestedPrompt(prompt) => {
                let result = self
                    .dispatcher
                    .submit_suggested_prompt(&mut self.store, &prompt);
                self.after_submit(result);
            }
            UserAction::Scrolled(metrics) => {
                self.scroll.on_scroll(&mut self.store, metrics);
            }
            UserAction::ScrollToBottom => {
                self.scroll.scroll_to_bottom(&mut self.store);
            }
            UserAction::StreamRendered => {
                self.scroll.mark_stream_rendered(&mut self.store);
                self.scroll.follow_new_content(&self.store);
            }
            UserAction::TogglePanel(panel) => {
                self.panels.toggle(panel);
            }
            UserAction::ClosePanel => self.panels.close(),
            UserAction::SetPromptsVisible(visible) => self.prompts.visible = visible,
            UserAction::NewChat => self.reset_session(),
        }
    }

    fn after_submit(&mut self, result: ChatResult<ScheduledCall>) {
        match result {
            Ok(scheduled) => {
                self.scroll.reveal_latest();
                self.schedule(scheduled);
            }
            Err(error) => self.report(error),
        }
    }

    fn schedule(&mut self, scheduled: ScheduledCall) {
        let generation = self.generation;
        let ScheduledCall { call, delay } = scheduled;
        let wait = match delay {
            DispatchDelay::Immediate => {
                self.outbox.push((generation, call));
                return;
            }
            DispatchDelay::NextTick => None,
            DispatchDelay::After(duration) => Some(duration),
        };

        let events = self.events_tx.clone();
        tokio::spawn(async move {
            match wait {
                Some(duration) => tokio::time::sleep(duration).await,
                None => tokio::task::yield_now().await,
            }
            let _ = events.send(LoopEvent::DispatchDue { generation, call });
        });
    }

    // Backend calls start only after the frame that shows their local commit.
    fn flush_outbox(&mut self) {
        for (generation, call) in self.outbox.drain(..) {
            tracing::debug!(operation = call.operation(), "calling chat backend");
            let backend = self.backend.clone();
            let events = self.events_tx.clone();
            tokio::spawn(async move {
                let outcome = match call {
                    RemoteCall::CreateSession(request) => {
                        RemoteOutcome::SessionCreated(backend.create_session(request).await)
                    }
                    RemoteCall::AppendMessage(request) => {
                        RemoteOutcome::MessageAppended(backend.append_message(request).await)
                    }
                };
                let _ = events.send(LoopEvent::RemoteCompleted {
                    generation,
                    outcome,
                });
            });
        }
    }

    fn on_remote_completed(&mut self, outcome: RemoteOutcome) {
        match outcome {
            RemoteOutcome::SessionCreated(Ok(response)) => {
                let session_id = response.data.id.clone();
                tracing::info!(session_id = %session_id, "chat session created");
                self.dispatcher.complete_start(&mut self.store, &response);
                self.scroll.reveal_latest();

                if let Err(error) = self.context.activate(&session_id) {
                    self.report(error);
                }
                match self
                    .sync
                    .start(&session_id, self.generation, &self.events_tx)
                {
                    Ok(_) => self.store.clear_subscription_error(),
                    Err(error) => self.report(error),
                }
            }
            RemoteOutcome::SessionCreated(Err(error))
            | RemoteOutcome::MessageAppended(Err(error)) => {
                self.dispatcher.fail_remote(&mut self.store);
                self.report(error);
            }
            RemoteOutcome::MessageAppended(Ok(())) => {
                tracing::debug!("message appended to chat session");
            }
        }
    }

    fn on_feed(&mut self, tag: SubscriptionTag, item: FeedItem) {
        if !self.sync.is_current(tag) {
            tracing::debug!(serial = tag.serial, "dropping change from a released subscription");
            return;
        }

        match item {
            Ok(event) => match fold_change(&mut self.store, &event) {
                SyncOutcome::Appended => {
                    tracing::debug!("folded assistant reply from change feed");
                    self.scroll.follow_new_content(&self.store);
                }
                SyncOutcome::Malformed(reason) => {
                    tracing::warn!("ignoring malformed change: {reason}");
                }
                outcome => tracing::trace!(?outcome, "change left the session untouched"),
            },
            Err(feed_error) => {
                let session_id = self.sync.session_id().cloned();
                self.sync.stop();
                if let Some(session_id) = session_id {
                    self.report(ChatError::Subscription {
                        stage: "change-feed-item",
                        session_id,
                        message: feed_error.message,
                    });
                }
            }
        }
    }

    fn on_prompts_loaded(&mut self, result: ChatResult<String>) {
        match result {
            Ok(raw) => {
                self.prompts.items = parse_suggestions(&raw);
                tracing::debug!(count = self.prompts.items.len(), "loaded suggested prompts");
            }
            Err(error) => tracing::warn!("failed to load suggested prompts: {error}"),
        }
    }

    fn reset_session(&mut self) {
        self.sync.stop();
        self.store.reset();
        self.scroll.reset();
        self.outbox.clear();
        self.generation = self.generation.next();
        // Invalidates any pending expiry timer along with the old error.
        self.error_ticket = ErrorTicket(self.error_ticket.0.wrapping_add(1));
        tracing::info!(generation = self.generation.0, "started a new chat");

        if let Err(error) = self.context.clear() {
            self.report(error);
        }
        self.request_prompts();
    }

    fn request_prompts(&mut self) {
        if !self.store.messages().is_empty() || !self.prompts.items.is_empty() {
            return;
        }
        let Some(service) = self.prompt_service.clone() else {
            return;
        };

        let profile = self.dispatcher.user().clone();
        let generation = self.generation;
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = service.generate_prompts(&profile).await;
            let _ = events.send(LoopEvent::PromptsLoaded { generation, result });
        });
    }

    /// Surfaces an error on the store; transient kinds expire after the configured delay.
    fn report(&mut self, error: ChatError) {
        let kind = match &error {
            error if error.is_validation() => ErrorKind::Validation,
            ChatError::Subscription { .. } => ErrorKind::Subscription,
            _ => ErrorKind::Remote,
        };
        match kind {
            ErrorKind::Validation => tracing::debug!("rejected submission: {error}"),
            ErrorKind::Remote => tracing::error!("chat backend call failed: {error}"),
            ErrorKind::Subscription => tracing::error!("live updates stopped: {error}"),
        }

        self.store.set_error(Some(ErrorNotice {
            kind,
            message: error.to_string(),
        }));
        self.error_ticket = ErrorTicket(self.error_ticket.0.wrapping_add(1));

        if kind.is_transient() {
            let ticket = self.error_ticket;
            let delay = self.dispatcher.timings().error_clear;
            let events = self.events_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = events.send(LoopEvent::ErrorExpired { ticket });
            });
        }
    }

    fn publish(&self) {
        let frame = project(&self.store, &self.scroll, &self.panels, &self.prompts);
        self.view.send_if_modified(|current| {
            if *current == frame {
                return false;
            }
            *current = frame;
            true
        });
    }
}

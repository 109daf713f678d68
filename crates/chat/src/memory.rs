//! In-process stand-ins for the chat backend, the document change feed and the
//! prompt service. They back the demo binary and the runtime tests.
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use bubble_storage::SessionId;
use futures::FutureExt;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::dispatch::RemoteCall;
use crate::error::{BackendRejectedSnafu, ChatResult, PromptServiceSnafu, SubscriptionSnafu};
use crate::message::{Message, Payload, Role};
use crate::remote::{
    AppendMessageRequest, BoxFuture, ChangeEvent, ChangeFeed, ChangeKind, ChangeStream,
    ChatBackend, CreateSessionRequest, CreateSessionResponse, FeedError, FeedItem, PromptService,
    RemoteSession, SessionStatus, SubscriptionHandle, UserProfile,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Subscriber {
    session_id: SessionId,
    events: mpsc::UnboundedSender<FeedItem>,
}

#[derive(Default)]
struct FeedState {
    next_id: u64,
    subscribers: HashMap<u64, Subscriber>,
}

/// Change feed that fans documents out to in-process subscribers.
pub struct MemoryChangeFeed {
    state: Arc<Mutex<FeedState>>,
    available: AtomicBool,
}

impl Default for MemoryChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChangeFeed {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FeedState::default())),
            available: AtomicBool::new(true),
        }
    }

    /// Sends a change to every subscriber of `session_id`; returns how many received it.
    pub fn publish(&self, session_id: &SessionId, kind: ChangeKind, document: Value) -> usize {
        self.deliver(session_id, || {
            Ok(ChangeEvent {
                kind,
                document: document.clone(),
            })
        })
    }

    /// Reports a subscription-level failure to every subscriber of `session_id`.
    pub fn fail(&self, session_id: &SessionId, message: impl Into<String>) -> usize {
        let message = message.into();
        self.deliver(session_id, || {
            Err(FeedError {
                message: message.clone(),
            })
        })
    }

    /// Drops every subscription of `session_id` from the feed side.
    pub fn disconnect(&self, session_id: &SessionId) {
        lock(&self.state)
            .subscribers
            .retain(|_, subscriber| subscriber.session_id != *session_id);
    }

    /// Makes further `subscribe` calls fail until re-enabled.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self, session_id: &SessionId) -> usize {
        lock(&self.state)
            .subscribers
            .values()
            .filter(|subscriber| subscriber.session_id == *session_id)
            .count()
    }

    pub fn total_subscribers(&self) -> usize {
        lock(&self.state).subscribers.len()
    }

    fn deliver(&self, session_id: &SessionId, item: impl Fn() -> FeedItem) -> usize {
        lock(&self.state)
            .subscribers
            .values()
            .filter(|subscriber| subscriber.session_id == *session_id)
            .filter(|subscriber| subscriber.events.send(item()).is_ok())
            .count()
    }
}

impl ChangeFeed for MemoryChangeFeed {
    fn subscribe(&self, session_id: &SessionId) -> ChatResult<ChangeStream> {
        if !self.available.load(Ordering::SeqCst) {
            return SubscriptionSnafu {
                stage: "memory-feed-subscribe",
                session_id: session_id.clone(),
                message: "change feed is unavailable".to_string(),
            }
            .fail();
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let subscriber_id = {
            let mut state = lock(&self.state);
            state.next_id += 1;
            let subscriber_id = state.next_id;
            state.subscribers.insert(
                subscriber_id,
                Subscriber {
                    session_id: session_id.clone(),
                    events: events_tx,
                },
            );
            subscriber_id
        };

        let state: Weak<Mutex<FeedState>> = Arc::downgrade(&self.state);
        let handle = SubscriptionHandle::new(move || {
            if let Some(state) = state.upgrade() {
                lock(&state).subscribers.remove(&subscriber_id);
            }
        });
        Ok(ChangeStream::new(events_rx, handle))
    }
}

type Responder = dyn Fn(&str) -> String + Send + Sync;

struct BackendState {
    documents: HashMap<SessionId, Vec<Value>>,
    calls: Vec<RemoteCall>,
    failures: VecDeque<String>,
    next_session: u64,
    clock_seconds: i64,
}

struct BackendShared {
    feed: Arc<MemoryChangeFeed>,
    state: Mutex<BackendState>,
    responder: Box<Responder>,
}

impl BackendShared {
    fn stamp(state: &mut BackendState, message: &Message) -> Value {
        state.clock_seconds += 1;
        let mut entry = serde_json::to_value(message).unwrap_or_else(|_| json!({}));
        if let Some(object) = entry.as_object_mut() {
            object.insert(
                "timestamp".to_string(),
                json!({"_seconds": state.clock_seconds, "_nanoseconds": 0}),
            );
        }
        entry
    }

    /// Appends to the stored document and broadcasts the whole document as `modified`.
    fn append_and_publish(&self, session_id: &SessionId, message: &Message) -> bool {
        let document = {
            let mut state = lock(&self.state);
            let entry = Self::stamp(&mut state, message);
            let Some(messages) = state.documents.get_mut(session_id) else {
                return false;
            };
            messages.push(entry);
            json!({"id": session_id.as_str(), "messages": messages.clone()})
        };
        self.feed
            .publish(session_id, ChangeKind::Modified, document);
        true
    }

    fn take_failure(&self) -> Option<String> {
        lock(&self.state).failures.pop_front()
    }
}

/// Chat backend that keeps session documents in memory and answers every human
/// message with an AI message delivered through the change feed.
pub struct MemoryChatBackend {
    shared: Arc<BackendShared>,
    reply_latency: Duration,
    auto_reply: bool,
}

impl MemoryChatBackend {
    pub fn new(feed: Arc<MemoryChangeFeed>) -> Self {
        Self {
            shared: Arc::new(BackendShared {
                feed,
                state: Mutex::new(BackendState {
                    documents: HashMap::new(),
                    calls: Vec::new(),
                    failures: VecDeque::new(),
                    next_session: 1,
                    clock_seconds: 0,
                }),
                responder: Box::new(|text: &str| format!("You said: {text}")),
            }),
            reply_latency: Duration::from_millis(250),
            auto_reply: true,
        }
    }

    pub fn with_reply_latency(mut self, latency: Duration) -> Self {
        self.reply_latency = latency;
        self
    }

    pub fn without_auto_reply(mut self) -> Self {
        self.auto_reply = false;
        self
    }

    /// Queues a rejection for the next backend call.
    pub fn fail_next(&self, message: impl Into<String>) {
        lock(&self.shared.state).failures.push_back(message.into());
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.shared.state).calls.clone()
    }

    pub fn document(&self, session_id: &SessionId) -> Option<Vec<Value>> {
        lock(&self.shared.state).documents.get(session_id).cloned()
    }

    /// Appends an AI reply to a stored session and publishes the change.
    pub fn push_reply(&self, session_id: &SessionId, text: &str) -> bool {
        let reply = Message {
            role: Role::Ai,
            message_type: None,
            payload: Payload::text(text),
            timestamp: None,
        };
        self.shared.append_and_publish(session_id, &reply)
    }

    fn schedule_reply(&self, session_id: SessionId, prompt: Option<String>) {
        if !self.auto_reply {
            return;
        }

        let shared = self.shared.clone();
        let latency = self.reply_latency;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            let text = (shared.responder)(prompt.as_deref().unwrap_or_default());
            let reply = Message {
                role: Role::Ai,
                message_type: None,
                payload: Payload::text(text),
                timestamp: None,
            };
            if !shared.append_and_publish(&session_id, &reply) {
                tracing::warn!(session_id = %session_id, "reply target session vanished");
            }
        });
    }
}

impl ChatBackend for MemoryChatBackend {
    fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> BoxFuture<'_, ChatResult<CreateSessionResponse>> {
        async move {
            lock(&self.shared.state)
                .calls
                .push(RemoteCall::CreateSession(request.clone()));
            if let Some(message) = self.shared.take_failure() {
                return BackendRejectedSnafu {
                    stage: "memory-create-session",
                    operation: "create-session",
                    message,
                }
                .fail();
            }

            let (session_id, messages) = {
                let mut state = lock(&self.shared.state);
                let session_id = SessionId::parse(&format!("session-{}", state.next_session))
                    .unwrap_or_else(|_| SessionId::new_v7());
                state.next_session += 1;
                let entry = BackendShared::stamp(&mut state, &request.message);
                state.documents.insert(session_id.clone(), vec![entry]);
                let messages = state
                    .documents
                    .get(&session_id)
                    .cloned()
                    .unwrap_or_default();
                (session_id, messages)
            };

            tracing::debug!(session_id = %session_id, user = %request.user.id, "created session");
            self.schedule_reply(session_id.clone(), request.message.text().map(str::to_string));

            Ok(CreateSessionResponse {
                status: SessionStatus::Created,
                data: RemoteSession {
                    id: session_id,
                    messages,
                },
            })
        }
        .boxed()
    }

    fn append_message(&self, request: AppendMessageRequest) -> BoxFuture<'_, ChatResult<()>> {
        async move {
            lock(&self.shared.state)
                .calls
                .push(RemoteCall::AppendMessage(request.clone()));
            if let Some(message) = self.shared.take_failure() {
                return BackendRejectedSnafu {
                    stage: "memory-append-message",
                    operation: "append-message",
                    message,
                }
                .fail();
            }

            if !self
                .shared
                .append_and_publish(&request.session_id, &request.message)
            {
                return BackendRejectedSnafu {
                    stage: "memory-append-message",
                    operation: "append-message",
                    message: format!("unknown session '{}'", request.session_id),
                }
                .fail();
            }

            self.schedule_reply(
                request.session_id.clone(),
                request.message.text().map(str::to_string),
            );
            Ok(())
        }
        .boxed()
    }
}

/// Prompt service returning a fixed answer.
pub struct MemoryPromptService {
    response: Result<String, String>,
    requests: AtomicUsize,
}

impl MemoryPromptService {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            response: Err(message.into()),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl PromptService for MemoryPromptService {
    fn generate_prompts<'a>(
        &'a self,
        profile: &'a UserProfile,
    ) -> BoxFuture<'a, ChatResult<String>> {
        async move {
            self.requests.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(user = %profile.id, "generating prompts");
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(message) => PromptServiceSnafu {
                    stage: "memory-generate-prompts",
                    message: message.clone(),
                }
                .fail(),
            }
        }
        .boxed()
    }
}

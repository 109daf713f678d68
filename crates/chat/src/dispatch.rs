use std::time::Duration;

use bubble_storage::SessionId;
use snafu::ensure;

use crate::error::{ChatError, ChatResult, EmptyInputSnafu, NoActiveSessionSnafu};
use crate::message::{Message, MessageType};
use crate::remote::{
    AppendMessageRequest, CHAT_SESSION_TYPE, CreateSessionRequest, CreateSessionResponse,
    SessionStatus, SessionUser, UserProfile,
};
use crate::store::{Flag, SessionStore};

pub const DEFAULT_ERROR_CLEAR_DELAY: Duration = Duration::from_millis(3_000);
pub const DEFAULT_SUGGESTED_PROMPT_DELAY: Duration = Duration::from_millis(500);

/// Backend request produced by the local commit phase.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    CreateSession(CreateSessionRequest),
    AppendMessage(AppendMessageRequest),
}

impl RemoteCall {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::CreateSession(_) => "create-session",
            Self::AppendMessage(_) => "append-message",
        }
    }
}

/// When the remote phase may start relative to the local commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchDelay {
    Immediate,
    /// After the event loop has yielded once, so the committed message is published first.
    NextTick,
    After(Duration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledCall {
    pub call: RemoteCall,
    pub delay: DispatchDelay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTimings {
    /// Lifetime of a transient error notice.
    pub error_clear: Duration,
    pub quick_reply: DispatchDelay,
    pub suggested_prompt: DispatchDelay,
}

impl Default for DispatchTimings {
    fn default() -> Self {
        Self {
            error_clear: DEFAULT_ERROR_CLEAR_DELAY,
            quick_reply: DispatchDelay::NextTick,
            suggested_prompt: DispatchDelay::After(DEFAULT_SUGGESTED_PROMPT_DELAY),
        }
    }
}

/// Turns user gestures into optimistic store updates plus deferred backend calls.
///
/// Every operation runs in two phases: the local commit happens synchronously on the
/// store, and the returned [`ScheduledCall`] tells the caller when the backend may be
/// contacted. The local append is therefore always published before any network
/// round-trip begins.
#[derive(Debug, Clone)]
pub struct MessageDispatcher {
    user: UserProfile,
    timings: DispatchTimings,
}

impl MessageDispatcher {
    pub fn new(user: UserProfile, timings: DispatchTimings) -> Self {
        Self { user, timings }
    }

    pub fn timings(&self) -> DispatchTimings {
        self.timings
    }

    pub fn user(&self) -> &UserProfile {
        &self.user
    }

    pub fn start_conversation(&self, store: &mut SessionStore, message: Message) -> ScheduledCall {
        self.start_conversation_after(store, message, DispatchDelay::Immediate)
    }

    fn start_conversation_after(
        &self,
        store: &mut SessionStore,
        message: Message,
        delay: DispatchDelay,
    ) -> ScheduledCall {
        store.append(message.clone());
        store.set_flag(Flag::Typing, true);
        store.set_creating(true);

        ScheduledCall {
            call: RemoteCall::CreateSession(CreateSessionRequest {
                user: SessionUser::from(&self.user),
                kind: CHAT_SESSION_TYPE.to_string(),
                message,
            }),
            delay,
        }
    }

    pub fn send_follow_up(
        &self,
        store: &mut SessionStore,
        message: Message,
        session_id: Option<&SessionId>,
    ) -> ChatResult<ScheduledCall> {
        self.send_follow_up_after(store, message, session_id, DispatchDelay::Immediate)
    }

    fn send_follow_up_after(
        &self,
        store: &mut SessionStore,
        message: Message,
        session_id: Option<&SessionId>,
        delay: DispatchDelay,
    ) -> ChatResult<ScheduledCall> {
        let Some(session_id) = session_id else {
            return NoActiveSessionSnafu {
                stage: "send-follow-up",
            }
            .fail();
        };

        store.append(message.clone());
        store.set_flag(Flag::Typing, true);

        Ok(ScheduledCall {
            call: RemoteCall::AppendMessage(AppendMessageRequest {
                message,
                session_id: session_id.clone(),
            }),
            delay,
        })
    }

    /// Starts a conversation when the backend knows none yet, otherwise appends to it.
    fn route(
        &self,
        store: &mut SessionStore,
        message: Message,
        follow_up_delay: DispatchDelay,
        start_delay: DispatchDelay,
    ) -> ChatResult<ScheduledCall> {
        match store.session_id().cloned() {
            None => Ok(self.start_conversation_after(store, message, start_delay)),
            Some(session_id) => {
                self.send_follow_up_after(store, message, Some(&session_id), follow_up_delay)
            }
        }
    }

    /// Submits the typed input. Rejects empty input without touching any flag.
    pub fn submit_text_input(&self, store: &mut SessionStore) -> ChatResult<ScheduledCall> {
        let text = store.input().trim().to_string();
        ensure!(
            !text.is_empty(),
            EmptyInputSnafu {
                stage: "submit-text-input",
            }
        );
        self.ensure_routable(store, "submit-text-input")?;

        store.set_flag(Flag::Streaming, true);
        store.set_input("");
        self.route(
            store,
            Message::human(MessageType::Text, text),
            DispatchDelay::Immediate,
            DispatchDelay::Immediate,
        )
    }

    /// Enter only submits from an idle composer with something typed.
    pub fn accepts_enter(&self, store: &SessionStore) -> bool {
        !store.flag(Flag::Typing) && !store.flag(Flag::Streaming) && !store.input().is_empty()
    }

    pub fn submit_quick_reply(
        &self,
        store: &mut SessionStore,
        option: &str,
    ) -> ChatResult<ScheduledCall> {
        self.ensure_routable(store, "submit-quick-reply")?;

        store.set_input(option);
        store.set_flag(Flag::Streaming, true);
        self.route(
            store,
            Message::human(MessageType::QuickReply, option),
            self.timings.quick_reply,
            DispatchDelay::Immediate,
        )
    }

    pub fn submit_suggested_prompt(
        &self,
        store: &mut SessionStore,
        prompt: &str,
    ) -> ChatResult<ScheduledCall> {
        self.ensure_routable(store, "submit-suggested-prompt")?;

        store.set_input(prompt);
        self.route(
            store,
            Message::human(MessageType::Text, prompt),
            self.timings.suggested_prompt,
            self.timings.suggested_prompt,
        )
    }

    /// Applies a successful create-session response.
    pub fn complete_start(&self, store: &mut SessionStore, response: &CreateSessionResponse) {
        store.set_creating(false);
        store.set_flag(Flag::Typing, false);
        if response.status == SessionStatus::Created {
            store.set_flag(Flag::Streaming, true);
        }
        store.adopt_remote_session(response.data.id.clone());
        store.set_flag(Flag::SessionLoaded, true);
    }

    /// Rolls back the pending indicators after a rejected backend call.
    ///
    /// The optimistic message stays; the session id stays unset when creation failed.
    pub fn fail_remote(&self, store: &mut SessionStore) {
        store.set_creating(false);
        store.set_flag(Flag::Typing, false);
        store.set_flag(Flag::Streaming, false);
    }

    // While creation is in flight there is no id to append to yet.
    fn ensure_routable(&self, store: &SessionStore, stage: &'static str) -> ChatResult<()> {
        if store.is_creating() {
            return Err(ChatError::NoActiveSession { stage });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::remote::RemoteSession;

    fn dispatcher() -> MessageDispatcher {
        MessageDispatcher::new(UserProfile::default(), DispatchTimings::default())
    }

    fn session_with_id(id: &str) -> SessionStore {
        let mut store = SessionStore::new();
        store.append(Message::human(MessageType::Text, "first"));
        store.adopt_remote_session(SessionId::parse(id).unwrap());
        store
    }

    fn created(id: &str) -> CreateSessionResponse {
        CreateSessionResponse {
            status: SessionStatus::Created,
            data: RemoteSession {
                id: SessionId::parse(id).unwrap(),
                messages: Vec::new(),
            },
        }
    }

    #[test]
    fn empty_input_is_rejected_without_side_effects() {
        let mut store = SessionStore::new();
        store.set_input("   ");
        let before = store.clone();

        let result = dispatcher().submit_text_input(&mut store);

        assert!(matches!(result, Err(ChatError::EmptyInput { .. })));
        assert_eq!(store, before);
    }

    #[test]
    fn first_text_submission_starts_a_conversation() {
        let mut store = SessionStore::new();
        store.set_input("hi");

        let scheduled = dispatcher().submit_text_input(&mut store).unwrap();

        assert_eq!(scheduled.delay, DispatchDelay::Immediate);
        let RemoteCall::CreateSession(request) = scheduled.call else {
            panic!("expected create-session");
        };
        assert_eq!(request.kind, "chat");
        assert_eq!(request.message.text(), Some("hi"));
        assert_eq!(store.messages().len(), 1);
        assert!(store.flag(Flag::Typing));
        assert!(store.flag(Flag::Streaming));
        assert_eq!(store.input(), "");
    }

    #[test]
    fn follow_up_requires_a_session_id() {
        let mut store = SessionStore::new();
        let result =
            dispatcher().send_follow_up(&mut store, Message::human(MessageType::Text, "x"), None);
        assert!(matches!(result, Err(ChatError::NoActiveSession { .. })));
        assert!(store.messages().is_empty());
    }

    #[test]
    fn follow_up_appends_and_sets_typing_but_not_streaming() {
        let mut store = session_with_id("s1");
        let session_id = store.session_id().cloned();

        let scheduled = dispatcher()
            .send_follow_up(
                &mut store,
                Message::human(MessageType::Text, "more"),
                session_id.as_ref(),
            )
            .unwrap();

        let RemoteCall::AppendMessage(request) = scheduled.call else {
            panic!("expected append-message");
        };
        assert_eq!(request.session_id.as_str(), "s1");
        assert_eq!(store.messages().len(), 2);
        assert!(store.flag(Flag::Typing));
        assert!(!store.flag(Flag::Streaming));
    }

    #[test]
    fn quick_reply_defers_follow_up_by_one_tick() {
        let mut store = session_with_id("s1");

        let scheduled = dispatcher().submit_quick_reply(&mut store, "Yes").unwrap();

        assert_eq!(scheduled.delay, DispatchDelay::NextTick);
        let last = store.messages().last().unwrap();
        assert_eq!(last.role, Role::Human);
        assert_eq!(last.message_type, Some(MessageType::QuickReply));
        assert_eq!(store.input(), "Yes");
        assert!(store.flag(Flag::Streaming));
    }

    #[test]
    fn quick_reply_without_session_starts_immediately() {
        let mut store = SessionStore::new();
        let scheduled = dispatcher().submit_quick_reply(&mut store, "Yes").unwrap();
        assert_eq!(scheduled.delay, DispatchDelay::Immediate);
        assert!(matches!(scheduled.call, RemoteCall::CreateSession(_)));
    }

    #[test]
    fn suggested_prompt_commits_locally_before_the_delayed_call() {
        let mut store = SessionStore::new();

        let scheduled = dispatcher()
            .submit_suggested_prompt(&mut store, "Plan my week")
            .unwrap();

        assert_eq!(
            scheduled.delay,
            DispatchDelay::After(DEFAULT_SUGGESTED_PROMPT_DELAY)
        );
        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.messages()[0].text(), Some("Plan my week"));
        assert!(store.flag(Flag::Typing));
    }

    #[test]
    fn submissions_wait_for_pending_session_creation() {
        let mut store = SessionStore::new();
        let dispatcher = dispatcher();
        dispatcher.start_conversation(&mut store, Message::human(MessageType::Text, "first"));

        let result = dispatcher.submit_quick_reply(&mut store, "Yes");

        assert!(matches!(result, Err(ChatError::NoActiveSession { .. })));
        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.input(), "");
    }

    #[test]
    fn enter_is_gated_on_idle_composer() {
        let dispatcher = dispatcher();
        let mut store = SessionStore::new();
        assert!(!dispatcher.accepts_enter(&store));

        store.set_input("hello");
        assert!(dispatcher.accepts_enter(&store));

        store.set_flag(Flag::Typing, true);
        assert!(!dispatcher.accepts_enter(&store));
        store.set_flag(Flag::Typing, false);
        store.set_flag(Flag::Streaming, true);
        assert!(!dispatcher.accepts_enter(&store));
    }

    #[test]
    fn complete_start_marks_session_loaded() {
        let mut store = SessionStore::new();
        store.set_input("hi");
        let dispatcher = dispatcher();
        dispatcher.submit_text_input(&mut store).unwrap();
        store.set_flag(Flag::Streaming, false);

        dispatcher.complete_start(&mut store, &created("s1"));

        assert!(!store.flag(Flag::Typing));
        assert!(store.flag(Flag::Streaming));
        assert!(store.flag(Flag::SessionLoaded));
        assert_eq!(store.session_id().map(SessionId::as_str), Some("s1"));
        assert_eq!(store.messages().len(), 1);
    }

    #[test]
    fn complete_start_without_created_status_does_not_stream() {
        let mut store = SessionStore::new();
        let mut response = created("s1");
        response.status = SessionStatus::Other;

        dispatcher().complete_start(&mut store, &response);

        assert!(!store.flag(Flag::Streaming));
        assert!(store.flag(Flag::SessionLoaded));
    }

    #[test]
    fn failed_remote_call_clears_pending_indicators() {
        let mut store = SessionStore::new();
        store.set_input("hi");
        let dispatcher = dispatcher();
        dispatcher.submit_text_input(&mut store).unwrap();

        dispatcher.fail_remote(&mut store);

        assert!(!store.flag(Flag::Typing));
        assert!(!store.flag(Flag::Streaming));
        assert_eq!(store.session_id(), None);
        assert_eq!(store.messages().len(), 1);
    }

    #[test]
    fn failed_start_can_be_retried_with_a_new_create() {
        let mut store = SessionStore::new();
        let dispatcher = dispatcher();
        dispatcher.start_conversation(&mut store, Message::human(MessageType::Text, "hi"));
        dispatcher.fail_remote(&mut store);

        store.set_input("hi again");
        let scheduled = dispatcher.submit_text_input(&mut store).unwrap();

        assert!(matches!(scheduled.call, RemoteCall::CreateSession(_)));
        assert_eq!(store.messages().len(), 2);
        assert!(store.is_creating());
    }
}

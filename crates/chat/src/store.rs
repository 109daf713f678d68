use bubble_storage::SessionId;

use crate::message::{ChatSession, Message};

/// Boolean status flags tracked next to the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Assistant reply pending; drives the typing bubble.
    Typing,
    /// A reply is being streamed into the view.
    Streaming,
    /// The latest streamed reply finished rendering.
    StreamingDone,
    /// Message list viewport sits at its bottom edge.
    FullyScrolled,
    /// Backend acknowledged the session.
    SessionLoaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFlags {
    pub typing: bool,
    pub streaming: bool,
    pub streaming_done: bool,
    pub fully_scrolled: bool,
    pub session_loaded: bool,
}

impl Default for StatusFlags {
    fn default() -> Self {
        Self {
            typing: false,
            streaming: false,
            streaming_done: false,
            // An empty list is trivially at its bottom.
            fully_scrolled: true,
            session_loaded: false,
        }
    }
}

impl StatusFlags {
    fn slot(&mut self, flag: Flag) -> &mut bool {
        match flag {
            Flag::Typing => &mut self.typing,
            Flag::Streaming => &mut self.streaming,
            Flag::StreamingDone => &mut self.streaming_done,
            Flag::FullyScrolled => &mut self.fully_scrolled,
            Flag::SessionLoaded => &mut self.session_loaded,
        }
    }

    pub fn get(&self, flag: Flag) -> bool {
        match flag {
            Flag::Typing => self.typing,
            Flag::Streaming => self.streaming,
            Flag::StreamingDone => self.streaming_done,
            Flag::FullyScrolled => self.fully_scrolled,
            Flag::SessionLoaded => self.session_loaded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad user input; expires on its own.
    Validation,
    /// A backend call failed; expires on its own, the user resubmits.
    Remote,
    /// Live updates are gone until the session is re-established.
    Subscription,
}

impl ErrorKind {
    pub fn is_transient(self) -> bool {
        !matches!(self, Self::Subscription)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNotice {
    pub kind: ErrorKind,
    pub message: String,
}

/// Client-side copy of the active conversation and its view flags.
///
/// Messages only ever grow at the tail; nothing here reorders or removes an entry
/// except [`SessionStore::reset`], which drops the whole conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStore {
    chat: Option<ChatSession>,
    flags: StatusFlags,
    error: Option<ErrorNotice>,
    // Outlives transient notices until the feed is re-established or the session resets.
    subscription_error: Option<ErrorNotice>,
    input: String,
    creating: bool,
    revision: u64,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every field to its initial value. Calling it twice is the same as once.
    pub fn reset(&mut self) {
        let fresh = Self {
            revision: self.revision,
            ..Self::default()
        };
        if *self != fresh {
            *self = fresh;
            self.touch();
        }
    }

    /// Appends at the tail, opening a local session on the first message.
    pub fn append(&mut self, message: Message) {
        self.chat
            .get_or_insert_with(ChatSession::default)
            .messages
            .push(message);
        self.touch();
    }

    /// Sets a flag; returns whether the value changed.
    pub fn set_flag(&mut self, flag: Flag, value: bool) -> bool {
        let slot = self.flags.slot(flag);
        if *slot == value {
            return false;
        }
        *slot = value;
        self.touch();
        true
    }

    pub fn flag(&self, flag: Flag) -> bool {
        self.flags.get(flag)
    }

    pub fn flags(&self) -> StatusFlags {
        self.flags
    }

    /// Shows an error notice.
    ///
    /// Subscription notices go to their own slot so a later transient notice cannot
    /// replace them; `None` clears only the transient slot.
    pub fn set_error(&mut self, error: Option<ErrorNotice>) {
        let slot = match &error {
            Some(notice) if notice.kind == ErrorKind::Subscription => &mut self.subscription_error,
            _ => &mut self.error,
        };
        if *slot != error {
            *slot = error;
            self.touch();
        }
    }

    /// Drops the subscription notice once live updates are flowing again.
    pub fn clear_subscription_error(&mut self) {
        if self.subscription_error.take().is_some() {
            self.touch();
        }
    }

    /// The notice to display: a transient one first, otherwise a lost subscription.
    pub fn error(&self) -> Option<&ErrorNotice> {
        self.error.as_ref().or(self.subscription_error.as_ref())
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        let input = input.into();
        if self.input != input {
            self.input = input;
            self.touch();
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Records the backend id on the local session, keeping local messages as they are.
    pub fn adopt_remote_session(&mut self, id: SessionId) {
        let chat = self.chat.get_or_insert_with(ChatSession::default);
        if chat.id.as_ref() != Some(&id) {
            chat.id = Some(id);
            self.touch();
        }
    }

    /// Marks a create-session call as in flight for the local session.
    pub fn set_creating(&mut self, creating: bool) {
        if self.creating != creating {
            self.creating = creating;
            self.touch();
        }
    }

    pub fn is_creating(&self) -> bool {
        self.creating
    }

    pub fn has_session(&self) -> bool {
        self.chat.is_some()
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.chat.as_ref().and_then(|chat| chat.id.as_ref())
    }

    pub fn messages(&self) -> &[Message] {
        self.chat
            .as_ref()
            .map(|chat| chat.messages.as_slice())
            .unwrap_or_default()
    }

    pub fn visible_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages().iter().filter(|message| message.is_visible())
    }

    /// Bumped on every observable change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

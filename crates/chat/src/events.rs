use crate::dispatch::RemoteCall;
use crate::error::ChatResult;
use crate::presentation::{Panel, ScrollMetrics};
use crate::remote::{CreateSessionResponse, FeedItem};

/// Identifies one lifetime of the active session.
///
/// Bumped on every reset so timers, responses and feed items that outlive their
/// session can be recognized and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SessionGeneration(pub u64);

impl SessionGeneration {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Routing key for feed items: the session generation plus a per-subscription serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionTag {
    pub generation: SessionGeneration,
    pub serial: u64,
}

/// Identifies one displayed error so an old expiry timer cannot clear a newer error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ErrorTicket(pub u64);

/// Input gestures forwarded by the view.
#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    SetInput(String),
    /// Send button; validates the current input.
    SubmitText,
    /// Enter key; ignored while typing, streaming or with an empty input.
    PressEnter,
    QuickReply(String),
    SuggestedPrompt(String),
    Scrolled(ScrollMetrics),
    ScrollToBottom,
    /// The view finished rendering the latest streamed reply.
    StreamRendered,
    TogglePanel(Panel),
    /// Click on the conversation area dismisses whichever panel is open.
    ClosePanel,
    SetPromptsVisible(bool),
    NewChat,
}

#[derive(Debug)]
pub enum RemoteOutcome {
    SessionCreated(ChatResult<CreateSessionResponse>),
    MessageAppended(ChatResult<()>),
}

/// Everything the event loop reacts to.
#[derive(Debug)]
pub enum LoopEvent {
    Action(UserAction),
    /// A deferred remote call reached its start time.
    DispatchDue {
        generation: SessionGeneration,
        call: RemoteCall,
    },
    RemoteCompleted {
        generation: SessionGeneration,
        outcome: RemoteOutcome,
    },
    Feed {
        tag: SubscriptionTag,
        item: FeedItem,
    },
    FeedClosed {
        tag: SubscriptionTag,
    },
    ErrorExpired {
        ticket: ErrorTicket,
    },
    PromptsLoaded {
        generation: SessionGeneration,
        result: ChatResult<String>,
    },
    Shutdown,
}

impl From<UserAction> for LoopEvent {
    fn from(action: UserAction) -> Self {
        Self::Action(action)
    }
}

use bubble_storage::SessionId;

use super::panels::{Panel, PanelState};
use super::scroll::{ScrollCoordinator, ScrollRequest};
use crate::message::Message;
use crate::store::{Flag, SessionStore};

/// Conversation starters offered while a session has no messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestedPrompts {
    pub items: Vec<String>,
    pub visible: bool,
}

impl Default for SuggestedPrompts {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            visible: true,
        }
    }
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatViewModel {
    pub session_id: Option<SessionId>,
    /// Conversation without SYSTEM entries, in conversation order.
    pub messages: Vec<Message>,
    pub show_message_list: bool,
    pub show_empty_state: bool,
    pub show_composer: bool,
    pub typing_indicator: bool,
    pub streaming: bool,
    pub suggested_prompts: Vec<String>,
    pub input: String,
    pub error: Option<String>,
    pub input_disabled: bool,
    pub send_enabled: bool,
    pub new_message_indicator: bool,
    pub active_panel: Option<Panel>,
    pub scroll_request: Option<ScrollRequest>,
}

pub fn project(
    store: &SessionStore,
    scroll: &ScrollCoordinator,
    panels: &PanelState,
    prompts: &SuggestedPrompts,
) -> ChatViewModel {
    let messages = store.visible_messages().cloned().collect::<Vec<_>>();
    let no_messages = store.messages().is_empty();
    let info_open = panels.is_open(Panel::Info);
    let conversation_covered = panels.covers_conversation();
    let error = store.error().map(|notice| notice.message.clone());

    let typing = store.flag(Flag::Typing);
    let streaming = store.flag(Flag::Streaming);
    let show_composer = !conversation_covered;

    ChatViewModel {
        session_id: store.session_id().cloned(),
        show_message_list: !conversation_covered && !no_messages,
        show_empty_state: no_messages && !info_open,
        show_composer,
        typing_indicator: typing,
        streaming,
        suggested_prompts: if show_composer && no_messages && prompts.visible {
            prompts.items.clone()
        } else {
            Vec::new()
        },
        input: store.input().to_string(),
        input_disabled: error.is_some(),
        send_enabled: !typing && !streaming && error.is_none() && !store.input().is_empty(),
        new_message_indicator: scroll.show_new_message_indicator(store),
        active_panel: panels.active(),
        scroll_request: scroll.last_request(),
        error,
        messages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageType, Payload, Role};
    use crate::store::{ErrorKind, ErrorNotice};

    fn frame(store: &SessionStore, panels: &PanelState) -> ChatViewModel {
        let prompts = SuggestedPrompts {
            items: vec!["Plan my week".to_string()],
            visible: true,
        };
        project(store, &ScrollCoordinator::new(), panels, &prompts)
    }

    #[test]
    fn empty_session_shows_prompts_and_empty_state() {
        let store = SessionStore::new();
        let view = frame(&store, &PanelState::default());

        assert!(view.show_empty_state);
        assert!(!view.show_message_list);
        assert!(view.show_composer);
        assert_eq!(view.suggested_prompts, vec!["Plan my week".to_string()]);
        assert!(!view.send_enabled);
    }

    #[test]
    fn system_messages_never_reach_the_view() {
        let mut store = SessionStore::new();
        store.append(Message {
            role: Role::System,
            message_type: None,
            payload: Payload::text("context"),
            timestamp: None,
        });
        store.append(Message::human(MessageType::Text, "hi"));

        let view = frame(&store, &PanelState::default());

        assert_eq!(view.messages.len(), 1);
        assert_eq!(view.messages[0].role, Role::Human);
        assert!(view.show_message_list);
        assert!(view.suggested_prompts.is_empty());
    }

    #[test]
    fn send_button_tracks_composer_state() {
        let mut store = SessionStore::new();
        store.set_input("hello");
        assert!(frame(&store, &PanelState::default()).send_enabled);

        store.set_flag(Flag::Typing, true);
        assert!(!frame(&store, &PanelState::default()).send_enabled);
        store.set_flag(Flag::Typing, false);

        store.set_error(Some(ErrorNotice {
            kind: ErrorKind::Validation,
            message: "Please enter a message".to_string(),
        }));
        let view = frame(&store, &PanelState::default());
        assert!(!view.send_enabled);
        assert!(view.input_disabled);
        assert_eq!(view.error.as_deref(), Some("Please enter a message"));
    }

    #[test]
    fn covering_panels_hide_the_conversation() {
        let mut store = SessionStore::new();
        store.append(Message::human(MessageType::Text, "hi"));
        let mut panels = PanelState::default();

        panels.toggle(Panel::Settings);
        let view = frame(&store, &panels);
        assert!(!view.show_message_list);
        assert!(!view.show_composer);
        assert_eq!(view.active_panel, Some(Panel::Settings));

        panels.toggle(Panel::History);
        let view = frame(&store, &panels);
        assert!(view.show_message_list);
        assert!(view.show_composer);
        assert_eq!(view.messages.len(), 1);
    }

    #[test]
    fn hidden_prompts_are_not_projected() {
        let store = SessionStore::new();
        let prompts = SuggestedPrompts {
            items: vec!["a".to_string()],
            visible: false,
        };
        let view = project(
            &store,
            &ScrollCoordinator::new(),
            &PanelState::default(),
            &prompts,
        );
        assert!(view.suggested_prompts.is_empty());
    }
}

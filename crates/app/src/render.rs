use bubble_chat::{ChatViewModel, Message, Panel, Role, UserAction};
use bubble_storage::SessionId;

/// Turns successive frames into terminal output, printing only what changed.
#[derive(Debug, Default)]
pub struct Renderer {
    printed: usize,
    first: Option<Message>,
    session_id: Option<SessionId>,
    error: Option<String>,
    prompts: Vec<String>,
    typing: bool,
    panel: Option<Panel>,
    indicator: bool,
    last_scroll: Option<u64>,
}

/// Output of one frame: lines to print and actions to feed back to the loop.
#[derive(Debug, Default, PartialEq)]
pub struct Drawn {
    pub lines: Vec<String>,
    pub actions: Vec<UserAction>,
}

impl Renderer {
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn draw(&mut self, frame: &ChatViewModel) -> Drawn {
        let mut drawn = Drawn::default();

        if self.printed > 0 && self.is_new_conversation(frame) {
            drawn.lines.push("--- new chat ---".to_string());
            self.printed = 0;
        }
        self.first = frame.messages.first().cloned();
        if frame.session_id.is_some() || self.printed == 0 {
            self.session_id = frame.session_id.clone();
        }
        for message in frame.messages.iter().skip(self.printed) {
            drawn.lines.push(format_message(message));
            // A terminal prints a reply in one go, so rendering is done right away.
            if message.role == Role::Ai {
                drawn.actions.push(UserAction::StreamRendered);
            }
        }
        self.printed = frame.messages.len();

        if frame.typing_indicator != self.typing {
            self.typing = frame.typing_indicator;
            if self.typing {
                drawn.lines.push("  ... assistant is typing".to_string());
            }
        }

        if frame.error != self.error {
            if let Some(error) = &frame.error {
                drawn.lines.push(format!("! {error}"));
            }
            self.error = frame.error.clone();
        }

        if frame.suggested_prompts != self.prompts {
            self.prompts = frame.suggested_prompts.clone();
            if !self.prompts.is_empty() {
                drawn.lines.push("suggested prompts:".to_string());
                drawn.lines.extend(
                    self.prompts
                        .iter()
                        .enumerate()
                        .map(|(index, prompt)| format!("  {}. {prompt}", index + 1)),
                );
            }
        }

        if frame.active_panel != self.panel {
            self.panel = frame.active_panel;
            drawn.lines.push(match self.panel {
                Some(panel) => format!("[{} panel open]", panel.label()),
                None => "[panel closed]".to_string(),
            });
        }

        if frame.new_message_indicator != self.indicator {
            self.indicator = frame.new_message_indicator;
            if self.indicator {
                drawn.lines.push("(new message below, /bottom to jump)".to_string());
            }
        }

        let scroll = frame.scroll_request.map(|request| request.seq);
        if scroll != self.last_scroll {
            self.last_scroll = scroll;
            if scroll.is_some() {
                tracing::trace!(?scroll, "scrolled to the newest message");
            }
        }

        drawn
    }

    /// Whether `frame` shows another conversation than the one printed so far.
    fn is_new_conversation(&self, frame: &ChatViewModel) -> bool {
        frame.messages.len() < self.printed
            || frame.messages.first() != self.first.as_ref()
            || self
                .session_id
                .as_ref()
                .is_some_and(|previous| frame.session_id.as_ref() != Some(previous))
    }
}

fn format_message(message: &Message) -> String {
    let speaker = match message.role {
        Role::Human => "you",
        Role::Ai => "bot",
        Role::System => "system",
    };
    let text = message.text().unwrap_or("[attachment]");
    format!("{speaker}> {text}")
}

#[cfg(test)]
mod tests {
    use bubble_chat::{MessageType, Payload};

    use super::*;

    fn ai(text: &str) -> Message {
        Message {
            role: Role::Ai,
            message_type: None,
            payload: Payload::text(text),
            timestamp: None,
        }
    }

    #[test]
    fn prints_only_new_messages_and_acknowledges_replies() {
        let mut renderer = Renderer::default();
        let mut frame = ChatViewModel {
            messages: vec![Message::human(MessageType::Text, "hi")],
            ..ChatViewModel::default()
        };

        let drawn = renderer.draw(&frame);
        assert_eq!(drawn.lines, vec!["you> hi".to_string()]);
        assert!(drawn.actions.is_empty());

        frame.messages.push(ai("hello"));
        let drawn = renderer.draw(&frame);
        assert_eq!(drawn.lines, vec!["bot> hello".to_string()]);
        assert_eq!(drawn.actions, vec![UserAction::StreamRendered]);

        assert_eq!(renderer.draw(&frame), Drawn::default());
    }

    #[test]
    fn reset_conversation_is_announced() {
        let mut renderer = Renderer::default();
        renderer.draw(&ChatViewModel {
            messages: vec![Message::human(MessageType::Text, "hi")],
            ..ChatViewModel::default()
        });

        let drawn = renderer.draw(&ChatViewModel::default());
        assert_eq!(drawn.lines, vec!["--- new chat ---".to_string()]);
    }

    #[test]
    fn new_chat_of_the_same_length_is_announced() {
        let mut renderer = Renderer::default();
        renderer.draw(&ChatViewModel {
            session_id: Some(SessionId::parse("s1").unwrap()),
            messages: vec![Message::human(MessageType::Text, "hi")],
            ..ChatViewModel::default()
        });

        let hello = Message::human(MessageType::Text, "hello again");
        let drawn = renderer.draw(&ChatViewModel {
            messages: vec![hello.clone()],
            ..ChatViewModel::default()
        });
        assert_eq!(
            drawn.lines,
            vec!["--- new chat ---".to_string(), "you> hello again".to_string()]
        );

        let drawn = renderer.draw(&ChatViewModel {
            session_id: Some(SessionId::parse("s2").unwrap()),
            messages: vec![hello.clone()],
            ..ChatViewModel::default()
        });
        assert!(drawn.lines.is_empty());

        let drawn = renderer.draw(&ChatViewModel {
            session_id: Some(SessionId::parse("s3").unwrap()),
            messages: vec![hello, ai("welcome back")],
            ..ChatViewModel::default()
        });
        assert_eq!(
            drawn.lines,
            vec![
                "--- new chat ---".to_string(),
                "you> hello again".to_string(),
                "bot> welcome back".to_string(),
            ]
        );
    }

    #[test]
    fn errors_and_prompts_are_printed_once() {
        let mut renderer = Renderer::default();
        let frame = ChatViewModel {
            error: Some("Please enter a message".to_string()),
            suggested_prompts: vec!["Plan a trip".to_string()],
            ..ChatViewModel::default()
        };

        let drawn = renderer.draw(&frame);
        assert_eq!(
            drawn.lines,
            vec![
                "! Please enter a message".to_string(),
                "suggested prompts:".to_string(),
                "  1. Plan a trip".to_string(),
            ]
        );
        assert_eq!(renderer.prompts(), ["Plan a trip".to_string()]);
        assert!(renderer.draw(&frame).lines.is_empty());
    }
}

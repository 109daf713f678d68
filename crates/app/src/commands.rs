use std::num::{ParseFloatError, ParseIntError};

use bubble_chat::{Panel, ScrollMetrics};
use snafu::{OptionExt, ResultExt, Snafu};

pub const HELP: &str = "\
commands:
  <text>              type and press enter
  /send [text]        press the send button (validates the input)
  /reply <option>     pick a quick reply
  /prompt <n>         pick suggested prompt n
  /prompts on|off     show or hide suggested prompts
  /new                start a new chat
  /history /discovery /settings /info
                      toggle a panel
  /close              close the open panel
  /scroll <height> <client> <top>
                      report the list viewport
  /bottom             jump to the newest message
  /help               show this text
  /quit               exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Say(String),
    Send(Option<String>),
    Reply(String),
    Prompt(usize),
    PromptsVisible(bool),
    NewChat,
    Panel(Panel),
    ClosePanel,
    Scroll(ScrollMetrics),
    Bottom,
    Help,
    Quit,
}

#[derive(Debug, Snafu)]
pub enum CommandError {
    #[snafu(display("unknown command `/{name}`, try /help"))]
    Unknown { name: String },
    #[snafu(display("`/{command}` needs {argument}"))]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[snafu(display("`{raw}` is not a prompt number: {source}"))]
    PromptNumber { raw: String, source: ParseIntError },
    #[snafu(display("`{raw}` is not a viewport measurement: {source}"))]
    Measurement { raw: String, source: ParseFloatError },
    #[snafu(display("expected `on` or `off`, got `{raw}`"))]
    Toggle { raw: String },
}

/// Parses one input line; `None` for a blank line.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Say(line.to_string())));
    };

    let (name, argument) = match rest.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "send" => Command::Send((!argument.is_empty()).then(|| argument.to_string())),
        "reply" => Command::Reply(required(argument, "reply", "an option")?.to_string()),
        "prompt" => {
            let raw = required(argument, "prompt", "a number")?;
            let number = raw.parse::<usize>().context(PromptNumberSnafu { raw })?;
            Command::Prompt(number)
        }
        "prompts" => match argument {
            "on" => Command::PromptsVisible(true),
            "off" => Command::PromptsVisible(false),
            raw => return ToggleSnafu { raw }.fail(),
        },
        "new" => Command::NewChat,
        "history" => Command::Panel(Panel::History),
        "discovery" => Command::Panel(Panel::Discovery),
        "settings" => Command::Panel(Panel::Settings),
        "info" => Command::Panel(Panel::Info),
        "close" => Command::ClosePanel,
        "scroll" => Command::Scroll(parse_metrics(argument)?),
        "bottom" => Command::Bottom,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        name => return UnknownSnafu { name }.fail(),
    };
    Ok(Some(command))
}

fn required<'a>(
    argument: &'a str,
    command: &'static str,
    expected: &'static str,
) -> Result<&'a str, CommandError> {
    (!argument.is_empty())
        .then_some(argument)
        .context(MissingArgumentSnafu {
            command,
            argument: expected,
        })
}

fn parse_metrics(argument: &str) -> Result<ScrollMetrics, CommandError> {
    let mut values = argument.split_whitespace().map(|raw| {
        raw.parse::<f64>()
            .context(MeasurementSnafu { raw: raw.to_string() })
    });
    let mut next = || {
        values.next().transpose()?.context(MissingArgumentSnafu {
            command: "scroll",
            argument: "scroll height, client height and scroll top",
        })
    };
    let scroll_height = next()?;
    let client_height = next()?;
    let scroll_top = next()?;
    Ok(ScrollMetrics::new(scroll_height, client_height, scroll_top))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_said() {
        assert_eq!(
            parse("  hello there ").unwrap(),
            Some(Command::Say("hello there".to_string()))
        );
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn send_takes_optional_text() {
        assert_eq!(parse("/send").unwrap(), Some(Command::Send(None)));
        assert_eq!(
            parse("/send hi").unwrap(),
            Some(Command::Send(Some("hi".to_string())))
        );
    }

    #[test]
    fn commands_with_arguments() {
        assert_eq!(
            parse("/reply Yes please").unwrap(),
            Some(Command::Reply("Yes please".to_string()))
        );
        assert_eq!(parse("/prompt 2").unwrap(), Some(Command::Prompt(2)));
        assert_eq!(
            parse("/prompts off").unwrap(),
            Some(Command::PromptsVisible(false))
        );
        assert_eq!(
            parse("/scroll 500 480 20").unwrap(),
            Some(Command::Scroll(ScrollMetrics::new(500.0, 480.0, 20.0)))
        );
        assert_eq!(parse("/info").unwrap(), Some(Command::Panel(Panel::Info)));
        assert_eq!(parse("/close").unwrap(), Some(Command::ClosePanel));
    }

    #[test]
    fn bad_input_is_reported() {
        assert!(matches!(parse("/dance"), Err(CommandError::Unknown { .. })));
        assert!(matches!(
            parse("/reply"),
            Err(CommandError::MissingArgument { .. })
        ));
        assert!(matches!(
            parse("/prompt two"),
            Err(CommandError::PromptNumber { .. })
        ));
        assert!(matches!(
            parse("/scroll 500 480"),
            Err(CommandError::MissingArgument { .. })
        ));
        assert!(matches!(
            parse("/scroll 500 tall 1"),
            Err(CommandError::Measurement { .. })
        ));
        assert!(matches!(parse("/prompts maybe"), Err(CommandError::Toggle { .. })));
    }
}

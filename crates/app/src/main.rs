use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use bubble_chat::{
    ChatHandle, ChatRuntime, ChatServices, MemoryChangeFeed, MemoryChatBackend,
    MemoryPromptService, MessageDispatcher, SessionContext, SettingsStore, UserAction,
};
use bubble_storage::{JsonFileActiveSessionStore, LOCAL_STATE_FILE_NAME, MemoryActiveSessionStore};
use tokio::io::{AsyncBufReadExt, BufReader};

mod commands;
mod render;

use commands::Command;
use render::Renderer;

const DEMO_PROMPTS: &str = "\
1. 🧭 Plan a weekend trip
2. ✍️ Draft a polite follow-up email
3. 💡 Explain a concept like I'm five";

#[tokio::main]
async fn main() {
    let settings_store = SettingsStore::load();
    let settings = settings_store.settings();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.log_filter.as_str().into()),
        )
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!("settings loaded from {:?}", settings_store.config_path());

    let feed = Arc::new(MemoryChangeFeed::new());
    let backend =
        MemoryChatBackend::new(feed.clone()).with_reply_latency(settings.demo_reply_latency());
    let services = ChatServices {
        backend: Arc::new(backend),
        feed,
        prompts: Some(Arc::new(MemoryPromptService::new(DEMO_PROMPTS))),
    };
    let context = open_context(&SettingsStore::default_config_dir());
    let dispatcher = MessageDispatcher::new(settings.user.clone(), settings.to_timings());

    let runtime = ChatRuntime::new(services, context, dispatcher);
    let handle = runtime.handle();
    let runtime_task = tokio::spawn(runtime.run());
    let renderer = Arc::new(Mutex::new(Renderer::default()));
    let renderer_task = tokio::spawn(render_loop(handle.clone(), renderer.clone()));

    println!("{}", commands::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                tracing::error!("failed to read from stdin: {error}");
                break;
            }
        };

        let command = match commands::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(error) => {
                println!("! {error}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        for action in into_actions(command, &renderer) {
            handle.send(action);
        }
    }

    handle.shutdown();
    if let Err(error) = runtime_task.await {
        tracing::error!("chat runtime task failed: {error}");
    }
    renderer_task.abort();
}

fn open_context(config_dir: &Path) -> SessionContext {
    let path = config_dir.join(LOCAL_STATE_FILE_NAME);
    match JsonFileActiveSessionStore::open(&path) {
        Ok(store) => {
            tracing::debug!("active session slot at {:?}", store.path());
            SessionContext::new(Arc::new(store))
        }
        Err(error) => {
            tracing::warn!("falling back to in-memory session context: {error}");
            SessionContext::new(Arc::new(MemoryActiveSessionStore::new()))
        }
    }
}

fn into_actions(command: Command, renderer: &Mutex<Renderer>) -> Vec<UserAction> {
    match command {
        Command::Say(text) => vec![UserAction::SetInput(text), UserAction::PressEnter],
        Command::Send(Some(text)) => vec![UserAction::SetInput(text), UserAction::SubmitText],
        Command::Send(None) => vec![UserAction::SubmitText],
        Command::Reply(option) => vec![UserAction::QuickReply(option)],
        Command::Prompt(number) => {
            let prompt = renderer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .prompts()
                .get(number.wrapping_sub(1))
                .cloned();
            match prompt {
                Some(prompt) => vec![UserAction::SuggestedPrompt(prompt)],
                None => {
                    println!("! no suggested prompt #{number}");
                    Vec::new()
                }
            }
        }
        Command::PromptsVisible(visible) => vec![UserAction::SetPromptsVisible(visible)],
        Command::NewChat => vec![UserAction::NewChat],
        Command::Panel(panel) => vec![UserAction::TogglePanel(panel)],
        Command::ClosePanel => vec![UserAction::ClosePanel],
        Command::Scroll(metrics) => vec![UserAction::Scrolled(metrics)],
        Command::Bottom => vec![UserAction::ScrollToBottom],
        Command::Help => {
            println!("{}", commands::HELP);
            Vec::new()
        }
        Command::Quit => Vec::new(),
    }
}

async fn render_loop(handle: ChatHandle, renderer: Arc<Mutex<Renderer>>) {
    let mut frames = handle.subscribe();
    loop {
        let drawn = {
            let frame = frames.borrow_and_update().clone();
            renderer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .draw(&frame)
        };
        for line in drawn.lines {
            println!("{line}");
        }
        for action in drawn.actions {
            handle.send(action);
        }

        if frames.changed().await.is_err() {
            break;
        }
    }
}

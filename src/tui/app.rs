//! Chat TUI (spec §4.7) — a ratatui frame loop combined with a fixed-
//! interval file poll, driven by `tokio::select!` over a crossterm event
//! stream and a poll tick. Grounded on the `tokio::select!` shape of
//! `swedishembedded-sven/crates/sven-tui/src/app.rs`, replacing its
//! WebSocket-agent event source with Kingdom's file-based poller.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind};
use futures_util::StreamExt;
use ratatui::layout::{Constraint, Direction, Layout as UiLayout};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span as UiSpan};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph};
use ratatui::DefaultTerminal;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::Config;
use crate::council::parse_mentions;
use crate::errors::KdResult;
use crate::invoker::{self, AgentQuery};
use crate::layout::Layout;
use crate::threads::ThreadStore;

use super::poller::{PollEvent, ThreadPoller};
use super::scheduler::{AutoTurnScheduler, TurnPlan};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct ChatApp {
    layout: Layout,
    config: Config,
    branch: String,
    thread: String,
    poller: ThreadPoller,
    scheduler: AutoTurnScheduler,
    muted: HashSet<String>,
    in_flight: HashMap<String, JoinHandle<()>>,
    log: VecDeque<String>,
    input: String,
    should_quit: bool,
    quit_requested_once: bool,
}

impl ChatApp {
    pub fn new(layout: Layout, config: Config, branch: String, thread: String) -> Self {
        Self {
            layout,
            config,
            branch,
            thread,
            poller: ThreadPoller::new(),
            scheduler: AutoTurnScheduler::new(),
            muted: HashSet::new(),
            in_flight: HashMap::new(),
            log: VecDeque::new(),
            input: String::new(),
            should_quit: false,
            quit_requested_once: false,
        }
    }

    fn unmuted_members(&self) -> Vec<String> {
        self.config
            .council
            .members
            .iter()
            .filter(|m| !self.muted.contains(*m))
            .cloned()
            .collect()
    }

    pub async fn run(&mut self, terminal: &mut DefaultTerminal) -> KdResult<()> {
        let mut events = EventStream::new();
        let mut ticker = tokio::time::interval(POLL_INTERVAL);

        while !self.should_quit {
            terminal.draw(|f| self.draw(f)).map_err(|e| crate::errors::KdError::io(self.layout.root(), e))?;

            tokio::select! {
                _ = ticker.tick() => {
                    self.on_tick();
                }
                maybe_event = events.next() => {
                    if let Some(Ok(event)) = maybe_event {
                        self.on_terminal_event(event).await;
                    }
                }
            }
        }
        Ok(())
    }

    fn on_tick(&mut self) {
        if let Ok(events) = self.poller.poll_messages(&self.layout, &self.branch, &self.thread) {
            for event in events {
                self.apply_poll_event(event);
            }
        }
        let members: Vec<String> = self.config.agents.keys().cloned().collect();
        for member in members {
            let backend = self.config.agents.get(&member).map(|p| p.binary.clone()).unwrap_or_default();
            let stream_path = self.layout.stream_path(&self.branch, &self.thread, &member);
            if !stream_path.exists() {
                continue;
            }
            let agent_kind = self.config.council.members.iter().find(|m| *m == &member).cloned().unwrap_or(backend);
            let events = self.poller.poll_stream(&agent_kind, &member, &stream_path);
            for event in events {
                self.apply_poll_event(event);
            }
        }
    }

    fn apply_poll_event(&mut self, event: PollEvent) {
        match event {
            PollEvent::NewMessage(m) => {
                self.log.push_back(format!("{}: {}", m.message.from, m.message.body));
            }
            PollEvent::StreamStarted { member } => {
                self.log.push_back(format!("{member}: ..."));
            }
            PollEvent::StreamDelta { member, text } => {
                self.log.push_back(format!("{member} (streaming): {text}"));
            }
            PollEvent::ThinkingDelta { member, text } => {
                if self.config.chat.thinking_visibility != crate::config::ThinkingVisibility::Hide {
                    self.log.push_back(format!("{member} (thinking): {text}"));
                }
            }
            PollEvent::AgentError { member, text } => {
                self.log.push_back(format!("{member} (error): {text}"));
            }
        }
    }

    async fn on_terminal_event(&mut self, event: Event) {
        let Event::Key(key) = event else { return };
        if key.kind != KeyEventKind::Press {
            return;
        }
        match key.code {
            KeyCode::Esc => self.handle_escape(),
            KeyCode::Enter => self.submit_input().await,
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => self.input.push(c),
            _ => {}
        }
    }

    fn handle_escape(&mut self) {
        if self.should_quit {
            return;
        }
        self.scheduler.interrupt();
        for (_, handle) in self.in_flight.drain() {
            handle.abort();
        }
        if self.quit_requested_once {
            self.should_quit = true;
        }
        self.quit_requested_once = true;
    }

    async fn submit_input(&mut self) {
        let text = std::mem::take(&mut self.input);
        if text.is_empty() {
            return;
        }
        if let Some(name) = text.strip_prefix("/mute ") {
            self.muted.insert(name.trim().to_string());
            return;
        }
        if let Some(name) = text.strip_prefix("/unmute ") {
            self.muted.remove(name.trim());
            return;
        }
        if text.trim() == "/quit" {
            self.should_quit = true;
            return;
        }

        self.dispatch_human_message(&text).await;
    }

    /// Spec §4.7: bump generation, persist the human message, then either
    /// broadcast (first exchange) or run a sequential round, re-checking
    /// the generation/interrupt flag before each sequential member. Never
    /// writes to branch-level session files (spec §4.7: "Session-file
    /// isolation").
    async fn dispatch_human_message(&mut self, text: &str) {
        let store = ThreadStore::new(&self.layout);
        let is_first_exchange = store
            .list_messages(&self.branch, &self.thread)
            .map(|m| m.is_empty())
            .unwrap_or(true);

        if let Err(e) = store.append_message(&self.branch, &self.thread, "king", None, text, None) {
            warn!(error = %e, "failed to append human message");
            return;
        }

        let generation = self.scheduler.on_human_message();
        let mentioned = parse_mentions(text);
        let unmuted = self.unmuted_members();
        let auto_messages = self.config.council.auto_messages.unwrap_or(unmuted.len());
        let plan = AutoTurnScheduler::plan(is_first_exchange, &mentioned, &unmuted, auto_messages);

        match plan {
            TurnPlan::None => {
                for member in mentioned {
                    if unmuted.contains(&member) {
                        self.launch_member(member, text.to_string());
                    }
                }
            }
            TurnPlan::Broadcast(members) => {
                for member in members {
                    self.launch_member(member, text.to_string());
                }
            }
            TurnPlan::Sequential(members) => {
                for member in members {
                    if !self.scheduler.is_current(generation) {
                        break;
                    }
                    self.launch_member(member, text.to_string());
                }
            }
        }
    }

    fn launch_member(&mut self, member: String, prompt: String) {
        let Some(profile) = self.config.agents.get(&member).cloned() else {
            self.log.push_back(format!("{member}: no agent profile configured"));
            return;
        };
        let stream_path = self.layout.stream_path(&self.branch, &self.thread, &member);
        let cwd = self.layout.root().to_path_buf();
        let timeout = Duration::from_secs(self.config.council.timeout);
        let query = AgentQuery {
            agent: member.clone(),
            prompt,
            cwd,
            timeout,
            resume: None,
            stream_path: Some(stream_path),
        };

        let branch = self.branch.clone();
        let thread = self.thread.clone();
        let layout_root = self.layout.root().to_path_buf();
        let member_for_task = member.clone();

        let handle = tokio::spawn(async move {
            let layout = Layout::new(layout_root);
            let store = ThreadStore::new(&layout);
            match invoker::invoke(&profile, query).await {
                Ok(response) => {
                    let body = response.error.unwrap_or(response.text);
                    let _ = store.append_message(&branch, &thread, &member_for_task, None, &body, None);
                }
                Err(e) => {
                    let _ = store.append_message(&branch, &thread, &member_for_task, None, &format!("(error: {e})"), None);
                }
            }
        });
        self.in_flight.insert(member, handle);
    }

    fn draw(&self, f: &mut ratatui::Frame) {
        let chunks = UiLayout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(3)])
            .split(f.area());

        let items: Vec<ListItem> = self.log.iter().map(|l| ListItem::new(Line::from(l.as_str()))).collect();
        let list = List::new(items).block(Block::default().borders(Borders::ALL).title(format!("{}/{}", self.branch, self.thread)));
        f.render_widget(list, chunks[0]);

        let input = Paragraph::new(Line::from(vec![UiSpan::styled("> ", Style::default().fg(Color::Cyan)), UiSpan::raw(self.input.as_str())]))
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(input, chunks[1]);
    }
}

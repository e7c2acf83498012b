//! Terminal chat interface.
//!
//! Rendering is a pure function of the orchestrator's state; the only
//! presentation-local state is the scroll position and the typed-input
//! buffer. Logs must go to a file, never stdout, while this is active.

use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame, Terminal,
};
use tokio::sync::mpsc;

use murmur_client::Role;
use murmur_foundation::AppState;

use crate::orchestrator::{AppEvent, Orchestrator};

#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    None,
    Quit,
}

/// Presentation-local state.
pub struct ChatUi {
    hold_to_talk: bool,
    /// `Some` while the typed-message line is open.
    input: Option<String>,
    /// Lines scrolled up from the newest turn; 0 sticks to the bottom.
    scroll_from_bottom: usize,
    last_turn_count: usize,
}

impl ChatUi {
    pub fn new(hold_to_talk: bool) -> Self {
        Self {
            hold_to_talk,
            input: None,
            scroll_from_bottom: 0,
            last_turn_count: 0,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent, orchestrator: &mut Orchestrator) -> Action {
        if key.kind == KeyEventKind::Release {
            if self.hold_to_talk && key.code == KeyCode::Char(' ') && self.input.is_none() {
                orchestrator.gesture_up();
            }
            return Action::None;
        }

        if let Some(buffer) = &mut self.input {
            match key.code {
                KeyCode::Enter => {
                    let text = std::mem::take(buffer);
                    self.input = None;
                    orchestrator.submit_text(&text);
                }
                KeyCode::Esc => self.input = None,
                KeyCode::Backspace => {
                    buffer.pop();
                }
                KeyCode::Char(c) => buffer.push(c),
                _ => {}
            }
            return Action::None;
        }

        match key.code {
            KeyCode::Char('q') => return Action::Quit,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Action::Quit;
            }
            KeyCode::Char(' ') => {
                // Repeat events must not retrigger the gesture.
                if key.kind == KeyEventKind::Press {
                    if self.hold_to_talk {
                        orchestrator.gesture_down();
                    } else if orchestrator.state() == AppState::Recording {
                        orchestrator.gesture_up();
                    } else {
                        orchestrator.gesture_down();
                    }
                }
            }
            KeyCode::Char('i') => {
                if orchestrator.state() == AppState::Idle {
                    self.input = Some(String::new());
                }
            }
            KeyCode::Up => self.scroll_from_bottom = self.scroll_from_bottom.saturating_add(1),
            KeyCode::Down => self.scroll_from_bottom = self.scroll_from_bottom.saturating_sub(1),
            _ => {}
        }
        Action::None
    }

    fn talk_hint(&self) -> &'static str {
        if self.hold_to_talk {
            "Hold Space to talk · i to type · ↑/↓ scroll · q to quit"
        } else {
            "Space starts/stops recording · i to type · ↑/↓ scroll · q to quit"
        }
    }
}

pub async fn run<B: Backend>(
    terminal: &mut Terminal<B>,
    orchestrator: &mut Orchestrator,
    mut events_rx: mpsc::UnboundedReceiver<AppEvent>,
    hold_to_talk: bool,
) -> anyhow::Result<()> {
    let mut ui = ChatUi::new(hold_to_talk);

    loop {
        terminal.draw(|f| draw_ui(f, orchestrator, &mut ui))?;

        tokio::select! {
            Some(event) = async {
                if event::poll(Duration::from_millis(10)).unwrap_or(false) {
                    event::read().ok()
                } else {
                    None
                }
            } => {
                match event {
                    Event::Key(key) => {
                        if ui.handle_key(key, orchestrator) == Action::Quit {
                            return Ok(());
                        }
                    }
                    // The terminal analog of the pointer leaving the mic
                    // button mid-press.
                    Event::FocusLost => orchestrator.gesture_up(),
                    _ => {}
                }
            }

            Some(event) = events_rx.recv() => {
                orchestrator.handle_event(event);
            }

            // Keep polling input even when no app events flow.
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
    }
}

fn draw_ui(f: &mut Frame, orchestrator: &Orchestrator, ui: &mut ChatUi) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(f.area());

    draw_header(f, chunks[0]);
    draw_chat(f, chunks[1], orchestrator, ui);
    draw_footer(f, chunks[2], orchestrator, ui);
    draw_status(f, chunks[3], orchestrator, ui);
}

fn draw_header(f: &mut Frame, area: Rect) {
    let title = Paragraph::new(Line::from(vec![
        Span::styled(
            "Murmur",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(" — voice chat assistant", Style::default().fg(Color::DarkGray)),
    ]))
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(title, area);
}

fn draw_chat(f: &mut Frame, area: Rect, orchestrator: &Orchestrator, ui: &mut ChatUi) {
    let block = Block::default().borders(Borders::ALL).title(" Conversation ");

    if orchestrator.conversation().is_empty() && orchestrator.state() != AppState::Processing {
        let welcome = Paragraph::new(vec![
            Line::default(),
            Line::from(Span::styled(
                "Welcome to Murmur",
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                "Hold the space bar and speak, then release to send.",
                Style::default().fg(Color::DarkGray),
            )),
        ])
        .alignment(Alignment::Center)
        .block(block);
        f.render_widget(welcome, area);
        return;
    }

    let width = area.width.saturating_sub(2).max(1) as usize;
    let lines = chat_lines(orchestrator, width);

    // Auto-scroll to the newest turn whenever the conversation changes.
    if orchestrator.conversation().len() != ui.last_turn_count {
        ui.last_turn_count = orchestrator.conversation().len();
        ui.scroll_from_bottom = 0;
    }

    let viewport = area.height.saturating_sub(2) as usize;
    let max_scroll = lines.len().saturating_sub(viewport);
    ui.scroll_from_bottom = ui.scroll_from_bottom.min(max_scroll);
    let offset = (max_scroll - ui.scroll_from_bottom) as u16;

    let chat = Paragraph::new(lines).block(block).scroll((offset, 0));
    f.render_widget(chat, area);
}

fn chat_lines(orchestrator: &Orchestrator, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    for turn in orchestrator.conversation().turns() {
        let (label, style, alignment) = match turn.role {
            Role::User => (
                "You",
                Style::default().fg(Color::Cyan),
                Alignment::Right,
            ),
            Role::Assistant => (
                "Assistant",
                Style::default().fg(Color::White),
                Alignment::Left,
            ),
        };
        lines.push(
            Line::from(Span::styled(
                label,
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::BOLD),
            ))
            .alignment(alignment),
        );
        for wrapped in wrap_text(&turn.content, width) {
            lines.push(Line::from(Span::styled(wrapped, style)).alignment(alignment));
        }
        lines.push(Line::default());
    }

    if orchestrator.state() == AppState::Processing {
        lines.push(Line::from(Span::styled(
            "· · ·",
            Style::default().fg(Color::DarkGray),
        )));
    }

    lines
}

fn draw_footer(f: &mut Frame, area: Rect, orchestrator: &Orchestrator, ui: &ChatUi) {
    let footer = if let Some(buffer) = &ui.input {
        Paragraph::new(format!("{}▏", buffer)).block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Message (Enter to send · Esc to cancel) "),
        )
    } else {
        match orchestrator.state() {
            AppState::Recording => {
                let live = orchestrator.live_transcript();
                let text = if live.is_empty() {
                    "Listening…".to_string()
                } else {
                    live
                };
                Paragraph::new(Span::styled(text, Style::default().fg(Color::White))).block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title(" ● Recording ")
                        .border_style(Style::default().fg(Color::Red)),
                )
            }
            AppState::Processing => Paragraph::new(Span::styled(
                "Waiting for the assistant…",
                Style::default().fg(Color::DarkGray),
            ))
            .block(Block::default().borders(Borders::ALL)),
            AppState::Idle => Paragraph::new(Span::styled(
                ui.talk_hint(),
                Style::default().fg(Color::DarkGray),
            ))
            .block(Block::default().borders(Borders::ALL)),
        }
    };
    f.render_widget(footer, area);
}

fn draw_status(f: &mut Frame, area: Rect, orchestrator: &Orchestrator, ui: &ChatUi) {
    let (dot_color, name) = match orchestrator.state() {
        AppState::Idle => (Color::Green, "Idle"),
        AppState::Recording => (Color::Red, "Recording"),
        AppState::Processing => (Color::Yellow, "Processing"),
    };

    let mut spans = vec![
        Span::styled(" ● ", Style::default().fg(dot_color)),
        Span::raw(name),
    ];
    if let Some(notice) = orchestrator.notice() {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(notice.to_string(), Style::default().fg(Color::Yellow)));
    } else if ui.input.is_some() {
        spans.push(Span::styled(
            "  typing a message",
            Style::default().fg(Color::DarkGray),
        ));
    }

    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Word wrap that preserves blank lines and hard-splits oversized words.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for raw in text.lines() {
        let mut current = String::new();
        let mut current_len = 0usize;
        for word in raw.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            loop {
                let sep = if current_len == 0 { 0 } else { 1 };
                if current_len + sep + word.len() <= width {
                    if sep == 1 {
                        current.push(' ');
                    }
                    current.extend(word.iter());
                    current_len += sep + word.len();
                    break;
                }
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                    continue;
                }
                // Oversized word on an empty line
                lines.push(word[..width].iter().collect());
                word = word[width..].to_vec();
                if word.is_empty() {
                    break;
                }
            }
        }
        lines.push(current);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_respects_width() {
        let lines = wrap_text("the quick brown fox jumps", 10);
        assert_eq!(lines, ["the quick", "brown fox", "jumps"]);
    }

    #[test]
    fn wrap_hard_splits_long_words() {
        let lines = wrap_text("abcdefghij", 4);
        assert_eq!(lines, ["abcd", "efgh", "ij"]);
    }

    #[test]
    fn wrap_preserves_blank_lines() {
        let lines = wrap_text("a\n\nb", 10);
        assert_eq!(lines, ["a", "", "b"]);
    }

    #[test]
    fn wrap_of_empty_text_is_one_blank_line() {
        assert_eq!(wrap_text("", 10), [""]);
    }

    #[test]
    fn wrap_never_panics_at_width_one() {
        let lines = wrap_text("hi there", 1);
        assert_eq!(lines, ["h", "i", "t", "h", "e", "r", "e"]);
    }
}

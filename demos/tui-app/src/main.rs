//! Terminal chat client.
//!
//! Run with: cargo run -p pairchat-tui -- [PAGE_URL]
//!
//! `PAGE_URL` is the address the client was opened from, e.g.
//! `http://192.168.1.5:3001/web/?interface=chat`. Its host locates the
//! backend; without `interface=chat` the pairing link is shown first.

use std::{io, time::Duration};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use pairchat_core::{ClientConfig, ConnectionState, PairingLink, TranscriptEntry};
use pairchat_session::ChatSession;
use pairchat_transport::WsConnector;
use qrcode::{QrCode, render::unicode::Dense1x2};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Session = ChatSession<WsConnector>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr only when asked for, so they can be redirected
    // away from the terminal UI.
    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .with(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    }

    let config = ClientConfig::from_env()?;
    let page_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("http://127.0.0.1:{}/web/", config.backend_port));
    let session = Session::from_origin(&page_url, &config)?;
    let pairing = PairingLink::for_endpoint(session.endpoint(), &config);
    let app = App::new(PairingLink::is_chat_mode(&page_url), pairing);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run app
    let result = run_app(&mut terminal, app, session).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

struct App {
    show_chat: bool,
    pairing: PairingLink,
    pairing_code: Option<String>,
    input: String,
    scroll: u16,
    follow: bool,
    notice: Option<String>,
}

impl App {
    fn new(show_chat: bool, pairing: PairingLink) -> Self {
        Self {
            show_chat,
            pairing_code: pairing_code(&pairing),
            pairing,
            input: String::new(),
            scroll: 0,
            follow: true,
            notice: None,
        }
    }

    /// Typing only goes to the message box once the chat is showing.
    fn type_char(&mut self, c: char) {
        if self.show_chat {
            self.input.push(c);
        }
    }

    fn scroll_up(&mut self, by: u16) {
        self.follow = false;
        self.scroll = self.scroll.saturating_sub(by);
    }

    fn scroll_down(&mut self, by: u16) {
        self.scroll = self.scroll.saturating_add(by);
    }
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut app: App,
    mut session: Session,
) -> anyhow::Result<()> {
    session.connect();

    loop {
        // Fold everything that arrived since the last frame, then repaint once.
        while let Some(event) = session.try_pump() {
            tracing::debug!(?event, "applied");
        }

        terminal.draw(|f| ui(f, &mut app, &session))?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        match key {
            KeyEvent {
                code: KeyCode::Char('c'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => {
                session.close();
                return Ok(());
            }
            KeyEvent {
                code: KeyCode::Char('r'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => {
                if session.state().can_connect() {
                    app.notice = Some("Reconnecting...".to_string());
                    session.connect();
                }
            }
            KeyEvent {
                code: KeyCode::Enter,
                ..
            } if !app.show_chat => app.show_chat = true,
            KeyEvent {
                code: KeyCode::Enter,
                ..
            } => {
                if app.input.is_empty() {
                    continue;
                }
                match session.submit(&app.input) {
                    Ok(()) => {
                        app.input.clear();
                        app.notice = None;
                        app.follow = true;
                    }
                    Err(e) => app.notice = Some(e.to_string()),
                }
            }
            KeyEvent {
                code: KeyCode::Char(c),
                modifiers: KeyModifiers::NONE | KeyModifiers::SHIFT,
                ..
            } => app.type_char(c),
            KeyEvent {
                code: KeyCode::Backspace,
                ..
            } => {
                app.input.pop();
            }
            KeyEvent {
                code: KeyCode::Up, ..
            } => app.scroll_up(1),
            KeyEvent {
                code: KeyCode::Down,
                ..
            } => app.scroll_down(1),
            KeyEvent {
                code: KeyCode::PageUp,
                ..
            } => app.scroll_up(10),
            KeyEvent {
                code: KeyCode::PageDown,
                ..
            } => app.scroll_down(10),
            KeyEvent {
                code: KeyCode::End, ..
            } => app.follow = true,
            _ => {}
        }
    }
}

/// Render the pairing link as a QR code, light modules on a dark terminal.
fn pairing_code(link: &PairingLink) -> Option<String> {
    match QrCode::new(link.as_str().as_bytes()) {
        Ok(code) => Some(
            code.render::<Dense1x2>()
                .dark_color(Dense1x2::Light)
                .light_color(Dense1x2::Dark)
                .build(),
        ),
        Err(e) => {
            tracing::warn!("cannot encode pairing link as QR: {e}");
            None
        }
    }
}

fn entry_line(entry: &TranscriptEntry, open: bool) -> Line<'_> {
    let mut spans = vec![
        Span::styled(
            format!("{}: ", entry.sender),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(entry.content.as_str()),
    ];
    if open {
        spans.push(Span::styled("▍", Style::default().fg(Color::DarkGray)));
    }
    Line::from(spans)
}

fn ui(f: &mut Frame, app: &mut App, session: &Session) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Transcript
            Constraint::Length(3), // Input
            Constraint::Length(1), // Status
        ])
        .split(f.area());

    if app.show_chat {
        let transcript = session.transcript();
        let lines: Vec<Line> = transcript
            .entries()
            .iter()
            .enumerate()
            .map(|(i, entry)| entry_line(entry, transcript.is_open(i)))
            .collect();

        let height = chunks[0].height.saturating_sub(2);
        let total = u16::try_from(lines.len()).unwrap_or(u16::MAX);
        let bottom = total.saturating_sub(height);
        if app.follow || app.scroll > bottom {
            app.scroll = bottom;
        }

        let output = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Chat"))
            .wrap(Wrap { trim: false })
            .scroll((app.scroll, 0));
        f.render_widget(output, chunks[0]);
    } else {
        let mut lines = vec![
            Line::from("Scan or open this link on the other device:"),
            Line::from(""),
            Line::from(Span::styled(
                app.pairing.as_str(),
                Style::default().fg(Color::Cyan),
            )),
            Line::from(""),
        ];
        // Skip the code when it would wrap and become unreadable.
        let inner = usize::from(chunks[0].width.saturating_sub(2));
        if let Some(code) = app
            .pairing_code
            .as_deref()
            .filter(|code| code.lines().all(|l| l.chars().count() <= inner))
        {
            lines.extend(code.lines().map(Line::from));
            lines.push(Line::from(""));
        }
        lines.push(Line::from("Press Enter to continue here instead."));

        let pairing = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Pair"))
            .wrap(Wrap { trim: false });
        f.render_widget(pairing, chunks[0]);
    }

    // Input area
    let input_style = if session.state().is_open() {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let input = Paragraph::new(app.input.as_str())
        .style(input_style)
        .block(Block::default().borders(Borders::ALL).title("Message"));
    f.render_widget(input, chunks[1]);

    if app.show_chat {
        let cursor = u16::try_from(app.input.chars().count()).unwrap_or(u16::MAX);
        f.set_cursor_position((chunks[1].x + cursor.saturating_add(1), chunks[1].y + 1));
    }

    // Status bar
    let state = session.state();
    let status_style = match state {
        ConnectionState::Open => Style::default().fg(Color::Green),
        ConnectionState::Closed => Style::default().fg(Color::Red),
        ConnectionState::Idle | ConnectionState::Connecting => Style::default().fg(Color::Yellow),
    };

    let mut status = vec![
        Span::raw(" "),
        Span::styled(state.label(), status_style),
        Span::raw(" | "),
        Span::styled("Ctrl+C", Style::default().fg(Color::Yellow)),
        Span::raw(" quit | "),
        Span::styled("Ctrl+R", Style::default().fg(Color::Yellow)),
        Span::raw(" reconnect "),
    ];
    if let Some(notice) = &app.notice {
        status.push(Span::raw("| "));
        status.push(Span::styled(notice.as_str(), Style::default().fg(Color::Red)));
    }
    f.render_widget(Paragraph::new(Line::from(status)), chunks[2]);
}

#[cfg(test)]
mod tests {
    use pairchat_core::ConnectionEndpoint;

    use super::*;

    fn pairing() -> PairingLink {
        let endpoint = ConnectionEndpoint::new("192.168.1.5", 3001, "/ws");
        PairingLink::for_endpoint(&endpoint, &ClientConfig::default())
    }

    #[test]
    fn test_pairing_code_is_square_block() {
        let code = pairing_code(&pairing()).unwrap();
        let rows: Vec<&str> = code.lines().collect();
        let width = rows[0].chars().count();

        assert!(rows.len() > 10);
        assert!(rows.iter().all(|row| row.chars().count() == width));
        // Two modules per character cell vertically.
        assert!(width > rows.len());
    }

    #[test]
    fn test_typing_ignored_on_pairing_screen() {
        let mut app = App::new(false, pairing());
        app.type_char('q');
        assert!(app.input.is_empty());

        app.show_chat = true;
        app.type_char('q');
        assert_eq!(app.input, "q");
    }
}

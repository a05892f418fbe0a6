//! TUI views and rendering
//!
//! Draws from `AppState` and never modifies it.

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use tracing::trace;

use super::state::{AppState, Status};

mod colors {
    use ratatui::style::Color;

    pub const HEADER: Color = Color::Rgb(0, 255, 255); // Cyan
    pub const KEYBIND: Color = Color::Rgb(0, 255, 255); // Cyan
    pub const RUNNING: Color = Color::Rgb(0, 255, 127); // Spring green
    pub const PENDING: Color = Color::Rgb(255, 215, 0); // Gold
    pub const COMPLETE: Color = Color::Rgb(50, 205, 50); // Lime green
    pub const FAILED: Color = Color::Rgb(220, 20, 60); // Crimson
    pub const DIM: Color = Color::DarkGray;
}

fn status_color(status: &Status) -> Color {
    match status {
        Status::Scanning | Status::Waiting => colors::PENDING,
        Status::Enriching => colors::RUNNING,
        Status::Done => colors::COMPLETE,
        Status::Error(_) => colors::FAILED,
        Status::Ready => Color::Gray,
    }
}

/// Main render function
pub fn render(state: &AppState, frame: &mut Frame) {
    trace!(status = ?state.status, "render: called");
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(state, frame, chunks[0]);
    render_input(state, frame, chunks[1]);
    render_output(state, frame, chunks[2]);
    render_status(state, frame, chunks[3]);
    render_footer(frame, chunks[4]);
}

fn render_header(state: &AppState, frame: &mut Frame, area: Rect) {
    let mut spans = vec![Span::styled(
        " magic-prompt ",
        Style::default().fg(colors::HEADER).add_modifier(Modifier::BOLD),
    )];
    if let Some(summary) = &state.project_summary {
        spans.push(Span::styled(summary.clone(), Style::default().fg(colors::DIM)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_input(state: &AppState, frame: &mut Frame, area: Rect) {
    let input = Paragraph::new(state.input.as_str())
        .block(Block::default().borders(Borders::ALL).title(" Prompt "));
    frame.render_widget(input, area);

    let cursor_cols = state.input[..state.cursor_pos].chars().count() as u16;
    let x = (area.x + 1 + cursor_cols).min(area.x + area.width.saturating_sub(2));
    frame.set_cursor_position(Position::new(x, area.y + 1));
}

fn render_output(state: &AppState, frame: &mut Frame, area: Rect) {
    let body = if state.output.is_empty() {
        Paragraph::new(Span::styled(
            "Start typing. The enriched prompt streams here once you pause.",
            Style::default().fg(colors::DIM),
        ))
    } else {
        Paragraph::new(state.output.as_str())
    };
    let output = body
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(" Enriched "));
    frame.render_widget(output, area);
}

fn render_status(state: &AppState, frame: &mut Frame, area: Rect) {
    let mut spans = vec![Span::styled(
        format!(" {}", state.status.label()),
        Style::default().fg(status_color(&state.status)),
    )];
    if let Some(note) = &state.note {
        spans.push(Span::styled(format!("  {}", note), Style::default().fg(colors::DIM)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_footer(frame: &mut Frame, area: Rect) {
    let keys = [("Esc", "quit"), ("^Y", "copy"), ("^U", "clear"), ("^R", "rescan")];
    let mut spans = Vec::new();
    for (key, label) in keys {
        spans.push(Span::styled(format!(" <{}>", key), Style::default().fg(colors::KEYBIND)));
        spans.push(Span::styled(format!(" {}", label), Style::default().fg(colors::DIM)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

#[cfg(test)]
mod tests {
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    use super::*;

    fn draw(state: &AppState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 12)).unwrap();
        terminal.draw(|frame| render(state, frame)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer.content().iter().map(|cell| cell.symbol()).collect()
    }

    #[test]
    fn test_render_shows_input_and_output() {
        let mut state = AppState::new();
        state.input = "add auth".to_string();
        state.cursor_pos = state.input.len();
        state.output = "Add JWT auth to the login handler".to_string();
        state.status = Status::Done;

        let screen = draw(&state);
        assert!(screen.contains("add auth"));
        assert!(screen.contains("Add JWT auth"));
        assert!(screen.contains("Done"));
    }

    #[test]
    fn test_render_placeholder_and_note() {
        let mut state = AppState::new();
        state.note = Some("Copied".to_string());
        let screen = draw(&state);
        assert!(screen.contains("Start typing"));
        assert!(screen.contains("Copied"));
    }
}

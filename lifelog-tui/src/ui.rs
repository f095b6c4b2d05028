//! UI rendering module.
//!
//! Header with the window and search box, the lane timeline, the system log
//! and a status line. Error and help overlays are drawn last.

use chrono::Utc;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, InputMode, LogLevel};
use crate::theme::{colors, styles};
use crate::timeline::TimelineWidget;

/// Render the entire UI
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let bg_block = Block::default().style(Style::default().bg(colors::BG_DARK));
    frame.render_widget(bg_block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Window + search
            Constraint::Min(10),   // Lanes
            Constraint::Length(5), // Log area
            Constraint::Length(1), // Status
        ])
        .split(area);

    render_header(frame, app, chunks[0]);
    render_lanes(frame, app, chunks[1]);
    render_logs(frame, app, chunks[2]);
    render_status(frame, app, chunks[3]);

    if app.error_popup.is_some() {
        render_error_popup(frame, app, area);
    }

    if app.show_help {
        render_help_overlay(frame, area);
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(40), Constraint::Length(36)])
        .split(area);

    let window = Paragraph::new(Line::from(vec![
        Span::styled(format!(" {} ", app.window), styles::text()),
        Span::styled(format!(" {} ", app.window_resolution()), styles::text_hint()),
    ]))
    .block(
        Block::default()
            .title(" lifelog ")
            .title_style(styles::title_accent())
            .borders(Borders::ALL)
            .border_style(styles::border())
            .style(Style::default().bg(colors::BG_MEDIUM)),
    );
    frame.render_widget(window, chunks[0]);

    let searching = app.input_mode == InputMode::Searching;
    let (text, style) = if searching {
        (format!(" {}█", app.search_input), styles::input_focused())
    } else if app.search.is_empty() {
        (" / to search".to_string(), styles::text_hint())
    } else {
        (format!(" {}", app.search), styles::text())
    };
    let search = Paragraph::new(text).style(style).block(
        Block::default()
            .title(" Search ")
            .title_style(if searching { styles::title_accent() } else { styles::title() })
            .borders(Borders::ALL)
            .border_style(if searching {
                styles::border_focused()
            } else {
                styles::border_dim()
            })
            .style(Style::default().bg(colors::BG_MEDIUM)),
    );
    frame.render_widget(search, chunks[1]);
}

fn render_lanes(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border())
        .style(Style::default().bg(colors::BG_DARK));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if app.lanes.is_empty() {
        let empty = Paragraph::new("No lanes configured")
            .style(styles::text_dim())
            .alignment(Alignment::Center);
        let y = inner.y + inner.height / 2;
        frame.render_widget(empty, Rect::new(inner.x, y, inner.width, 1));
        return;
    }

    let timeline = TimelineWidget::new(&app.lanes, app.window, Utc::now())
        .selected(app.selected_lane)
        .frame(app.frame_count);
    frame.render_widget(timeline, inner);
}

/// Render the log area
fn render_logs(frame: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .logs
        .iter()
        .rev()
        .take(area.height.saturating_sub(2) as usize)
        .map(|entry| {
            let (prefix, color) = match entry.level {
                LogLevel::Info => ("i", colors::BLUE),
                LogLevel::Success => ("+", colors::GREEN),
                LogLevel::Warning => ("!", colors::YELLOW),
                LogLevel::Error => ("x", colors::RED),
            };

            ListItem::new(Line::from(vec![
                Span::styled(format!("[{}] ", prefix), Style::default().fg(color)),
                Span::styled(&entry.message, styles::text_dim()),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" System Log ")
            .title_style(Style::default().fg(colors::FG_DIM))
            .borders(Borders::ALL)
            .border_style(styles::border_dim())
            .style(Style::default().bg(colors::BG_DARK)),
    );

    frame.render_widget(list, area);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
    let status = Paragraph::new(app.status_text())
        .style(styles::text_hint().bg(colors::BG_MEDIUM));
    frame.render_widget(status, area);
}

/// Render error popup
fn render_error_popup(frame: &mut Frame, app: &App, area: Rect) {
    let Some(popup) = app.error_popup.as_ref() else {
        return;
    };

    let popup_width = (area.width * 60 / 100).clamp(30, 60);
    let popup_height = 7;

    let popup_area = centered_rect(popup_width, popup_height, area);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .title(format!(" {} ", popup.title))
        .title_style(
            Style::default()
                .fg(Color::White)
                .bg(colors::RED)
                .add_modifier(Modifier::BOLD),
        )
        .borders(Borders::ALL)
        .border_style(Style::default().fg(colors::RED))
        .style(Style::default().bg(colors::BG_ERROR));

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let text = Paragraph::new(popup.message.as_str())
        .style(styles::text())
        .wrap(Wrap { trim: true });

    frame.render_widget(text, inner);

    let hint = Paragraph::new("Press ESC or ENTER to dismiss")
        .style(styles::text_hint())
        .alignment(Alignment::Center);

    let hint_area = Rect::new(
        popup_area.x,
        popup_area.y + popup_area.height.saturating_sub(1),
        popup_area.width,
        1,
    );
    frame.render_widget(hint, hint_area);
}

fn help_line(keys: &'static str, action: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("  {:<16}", keys), Style::default().fg(colors::BLUE)),
        Span::raw(action),
    ])
}

fn help_section(title: &'static str) -> Line<'static> {
    Line::from(Span::styled(
        title,
        Style::default().fg(colors::PURPLE).add_modifier(Modifier::BOLD),
    ))
}

/// Render help overlay
fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(56, 22, area);

    frame.render_widget(Clear, popup_area);

    let help_text = vec![
        Line::from(Span::styled(
            "Keyboard Shortcuts",
            Style::default().fg(colors::BLUE).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        help_section("Window"),
        help_line("h/l Left/Right", "Pan a quarter window"),
        help_line("H/L", "Pan a whole window"),
        help_line("+ / -", "Zoom in / out"),
        help_line("t", "Jump to now"),
        help_line("0 / Home", "Reset window"),
        Line::from(""),
        help_section("Lanes"),
        help_line("j/k Up/Down", "Select lane"),
        help_line("/", "Search (Enter applies, Esc cancels)"),
        help_line("r", "Reload all lanes"),
        Line::from(""),
        help_section("General"),
        help_line("?", "Toggle this help"),
        help_line("q/Ctrl+C", "Quit"),
    ];

    let paragraph = Paragraph::new(help_text)
        .block(
            Block::default()
                .title(" Help ")
                .title_style(styles::title())
                .borders(Borders::ALL)
                .border_style(styles::border())
                .style(Style::default().bg(colors::BG_MEDIUM)),
        )
        .style(styles::text());

    frame.render_widget(paragraph, popup_area);
}

/// Helper to create a centered rectangle
fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};

    #[test]
    fn test_centered_rect_fits_small_area() {
        let area = Rect::new(0, 0, 20, 10);
        let rect = centered_rect(56, 22, area);
        assert_eq!(rect, Rect::new(0, 0, 20, 10));
        assert_eq!(centered_rect(10, 4, area), Rect::new(5, 3, 10, 4));
    }

    #[test]
    fn test_render_shows_lanes_and_log() {
        let mut app = App::new(&["Read", "Steps"], chrono::Duration::days(5));
        app.show_error("Steps failed", "HTTP 502: bad gateway");

        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|frame| render(frame, &app)).unwrap();

        let text: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(text.contains("Read"));
        assert!(text.contains("System Log"));
        assert!(text.contains("Steps failed"));
    }
}

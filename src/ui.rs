use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, SYSTEM_PRESETS};
use crate::client::ALLOWED_MODELS;
use crate::transcript::Role;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    // Render popups (in order of priority)
    if app.show_system_editor {
        render_system_editor(app, frame, area);
    } else if app.show_model_picker {
        render_model_picker(app, frame, area);
    } else if app.show_preset_picker {
        render_preset_picker(app, frame, area);
    }
}

/// Strip control characters so untrusted chat content can never smuggle
/// terminal escape sequences into the display. Newlines and tabs survive.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let provider = app
        .params
        .provider
        .as_deref()
        .map(|p| format!(" [{}]", p))
        .unwrap_or_default();

    let title = Line::from(vec![
        Span::styled(" worker-chat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("{} ", app.params.model),
            Style::default().fg(Color::Green),
        ),
        Span::styled(
            format!("temp {:.2}", app.params.temperature),
            Style::default().fg(Color::Yellow),
        ),
        Span::styled(provider, Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");

    let chat_text = if app.display.is_empty() && !app.busy {
        Text::from(Span::styled(
            "Type a message and press Enter...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Text::from(chat_lines(app))
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));

    frame.render_widget(chat, area);
}

/// Build the visible chat lines: every finalized display entry, then the
/// in-flight assistant slot while a request is running.
pub fn chat_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines: Vec<Line> = Vec::new();

    for msg in &app.display {
        match msg.role {
            Role::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
            }
            Role::Assistant => {
                lines.push(Line::from(Span::styled(
                    "AI:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
            }
        }
        for line in sanitize(&msg.content).lines() {
            lines.push(Line::from(line.to_string()));
        }
        lines.push(Line::default());
    }

    if app.busy {
        lines.push(Line::from(Span::styled(
            "AI:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        if app.live.is_empty() {
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        } else {
            for line in sanitize(&app.live).lines() {
                lines.push(Line::from(line.to_string()));
            }
        }
        lines.push(Line::default());
    }

    lines
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let border_color = if app.busy { Color::DarkGray } else { Color::Yellow };
    let title = if app.busy {
        " Waiting for reply (Esc to stop) "
    } else {
        " Message (Enter to send) "
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.cursor;

    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    if !app.busy {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let hints = if app.busy {
        " Esc stop  Ctrl+C quit "
    } else {
        " Enter send  Esc quit  Ctrl+L clear  Ctrl+O model  Ctrl+P preset  Ctrl+E system  Ctrl+←/→ temp "
    };

    let style = if app.busy {
        Style::default().bg(Color::Yellow).fg(Color::Black)
    } else {
        Style::default().bg(Color::Blue).fg(Color::White)
    };

    let footer = Paragraph::new(hints).style(style);
    frame.render_widget(footer, area);
}

fn centered_popup(area: Rect, width: u16, height: u16) -> Rect {
    let popup_width = width.min(area.width.saturating_sub(4));
    let popup_height = height.min(area.height.saturating_sub(4));

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    Rect::new(popup_x, popup_y, popup_width, popup_height)
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup_area = centered_popup(area, 40, ALLOWED_MODELS.len() as u16 + 2);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Select Model (Enter to select, Esc to cancel) ");

    let items: Vec<ListItem> = ALLOWED_MODELS
        .iter()
        .map(|model| {
            let style = if *model == app.params.model {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ", model)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.model_picker_state);
}

fn render_preset_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup_area = centered_popup(area, 50, SYSTEM_PRESETS.len() as u16 + 2);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" System Preset (Enter to select, Esc to cancel) ");

    let items: Vec<ListItem> = SYSTEM_PRESETS
        .iter()
        .map(|(name, prompt)| {
            let current = app.params.system == *prompt;
            let prefix = if current { "* " } else { "  " };
            let style = if current {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!("{}{}", prefix, name)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.preset_picker_state);
}

fn render_system_editor(app: &App, frame: &mut Frame, area: Rect) {
    let popup_area = centered_popup(area, 60, 3);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" System Prompt (Enter to save, Esc to cancel) ");

    let inner_width = popup_area.width.saturating_sub(2) as usize;
    let cursor_pos = app.system_cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .system_input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let editor = Paragraph::new(visible_text).block(block);
    frame.render_widget(editor, popup_area);

    let cursor_x = (cursor_pos - scroll_offset) as u16;
    frame.set_cursor_position((popup_area.x + cursor_x + 1, popup_area.y + 1));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ChatParams, WorkerClient, DEFAULT_ENDPOINT};
    use crate::transcript::Message;

    fn make_app() -> App {
        App::new(WorkerClient::new(DEFAULT_ENDPOINT), ChatParams::default())
    }

    fn line_text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn markup_renders_literally() {
        let mut app = make_app();
        app.display
            .push(Message::user("<script>alert('x')</script>"));

        let lines = chat_lines(&app);
        let joined: String = lines.iter().map(|l| line_text(l) + "\n").collect();
        assert!(joined.contains("<script>alert('x')</script>"));
    }

    #[test]
    fn sanitize_strips_escape_sequences() {
        let hostile = "ok\x1b[2Jevil\x07";
        // The ESC byte is gone, so the sequence can no longer execute.
        assert_eq!(sanitize(hostile), "ok[2Jevil");
        assert!(!sanitize(hostile).contains('\x1b'));
        assert_eq!(sanitize("line1\nline2\tend"), "line1\nline2\tend");
    }

    #[test]
    fn busy_with_no_delta_shows_thinking() {
        let mut app = make_app();
        app.busy = true;
        let lines = chat_lines(&app);
        let joined: String = lines.iter().map(|l| line_text(l)).collect();
        assert!(joined.contains("Thinking."));
    }

    #[test]
    fn live_text_replaces_thinking_indicator() {
        let mut app = make_app();
        app.busy = true;
        app.live = "partial answer".to_string();
        let lines = chat_lines(&app);
        let joined: String = lines.iter().map(|l| line_text(l) + "\n").collect();
        assert!(joined.contains("partial answer"));
        assert!(!joined.contains("Thinking"));
    }
}

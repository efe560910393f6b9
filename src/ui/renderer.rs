//! Terminal frame construction.
//!
//! The renderer is a pure consumer of session state: it turns the
//! conversation log, mode, and status annotations into one ratatui frame.
//! The only state it writes back is the resolved scroll offset, since the
//! auto-follow arithmetic depends on the viewport size known here.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::core::app::{App, UiMode, COLLAPSE_THRESHOLD};
use crate::core::ids;
use crate::core::message::Turn;

const ACCENT: Color = Color::Rgb(0xfe, 0x3f, 0x01);
const SUBTLE: Color = Color::DarkGray;

pub fn draw(frame: &mut Frame, app: &mut App) {
    let input_height = match app.ui.mode {
        UiMode::Insert | UiMode::Command => {
            (app.ui.input.lines().len() as u16 + 2).clamp(3, 6)
        }
        _ => 1,
    };

    let [header_area, transcript_area, status_area, input_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(1),
        Constraint::Length(1),
        Constraint::Length(input_height),
    ])
    .areas(frame.area());

    frame.render_widget(header_line(app), header_area);

    if app.ui.mode == UiMode::ModelSelect {
        draw_model_list(frame, app, transcript_area);
    } else {
        draw_transcript(frame, app, transcript_area);
    }

    frame.render_widget(status_line(app), status_area);
    draw_input(frame, app, input_area);
}

fn header_line(app: &App) -> Paragraph<'static> {
    let mut spans = vec![
        Span::styled(" sotto ", Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)),
        Span::styled("· ", Style::default().fg(SUBTLE)),
        Span::raw(app.session.model.clone()),
        Span::styled(
            format!(" · {} turns", app.log.len()),
            Style::default().fg(SUBTLE),
        ),
    ];
    if app.session.image_mode {
        spans.push(Span::styled(" [image]", Style::default().fg(ACCENT)));
    }
    if app.session.has_active_generation() {
        spans.push(Span::styled(" · generating", Style::default().fg(ACCENT)));
    }
    Paragraph::new(Line::from(spans))
}

fn status_line(app: &App) -> Paragraph<'static> {
    let line = if app.ui.mode == UiMode::YankCode {
        Line::from(vec![
            Span::styled("[yank] ", Style::default().fg(Color::Yellow)),
            Span::raw(format!("block id: {}", app.ui.yank_buffer)),
            Span::styled("▌", Style::default().fg(Color::Yellow)),
        ])
    } else if let Some(status) = &app.ui.status {
        let color = if status.starts_with('✖') {
            Color::Red
        } else if status.starts_with('✔') {
            Color::Green
        } else {
            SUBTLE
        };
        Line::from(Span::styled(status.clone(), Style::default().fg(color)))
    } else if let Some(progress) = &app.ui.image_progress {
        Line::from(vec![
            Span::styled("[image] ", Style::default().fg(ACCENT)),
            Span::styled(progress.clone(), Style::default().fg(SUBTLE)),
        ])
    } else {
        Line::default()
    };
    Paragraph::new(line)
}

fn draw_transcript(frame: &mut Frame, app: &mut App, area: Rect) {
    let text = transcript_text(app);
    let total = wrapped_height(&text, area.width);

    let max_offset = total.saturating_sub(area.height);
    let offset = if app.ui.auto_scroll {
        max_offset
    } else {
        app.ui.scroll_offset.min(max_offset)
    };
    app.ui.scroll_offset = offset;

    let paragraph = Paragraph::new(text)
        .wrap(Wrap { trim: false })
        .scroll((offset, 0));
    frame.render_widget(paragraph, area);
}

fn transcript_text(app: &App) -> Text<'static> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut previous_role = None;

    for turn in &app.log {
        if previous_role.is_some() && previous_role != Some(turn.role) {
            lines.push(Line::default());
        }
        previous_role = Some(turn.role);

        if turn.is_user() {
            lines.extend(user_lines(turn));
        } else {
            lines.extend(assistant_lines(app, turn));
        }
    }

    Text::from(lines)
}

fn user_lines(turn: &Turn) -> Vec<Line<'static>> {
    displayed_content(turn)
        .lines()
        .map(|line| {
            Line::from(Span::styled(
                line.to_string(),
                Style::default().fg(Color::White),
            ))
            .right_aligned()
        })
        .collect()
}

fn assistant_lines(app: &App, turn: &Turn) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let streaming_target = app
        .session
        .active_generation()
        .map(|g| g.target_turn_id == turn.id)
        .unwrap_or(false);

    if turn.content.is_empty() && streaming_target {
        lines.push(Line::from(Span::styled(
            "thinking…",
            Style::default().fg(SUBTLE).add_modifier(Modifier::ITALIC),
        )));
    } else if turn.collapsed {
        lines.push(Line::from(Span::raw(displayed_content(turn))));
    } else {
        lines.extend(content_lines(app, turn));
    }

    lines.push(Line::from(Span::styled(
        format!(
            "{} | {}",
            turn.id,
            turn.created_at.with_timezone(&chrono::Local).format("%H:%M:%S")
        ),
        Style::default().fg(SUBTLE),
    )));

    lines
}

/// Assistant content with fenced regions set off and tagged with their
/// block address once the index has one for them.
fn content_lines(app: &App, turn: &Turn) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut in_fence = false;
    let mut fence_ordinal = 0usize;

    for raw in turn.content.lines() {
        let trimmed = raw.trim_start();
        if let Some(rest) = trimmed.strip_prefix("```") {
            if in_fence {
                in_fence = false;
                let tag = app
                    .code_blocks
                    .get(&ids::block_id(&turn.id, fence_ordinal))
                    .map(|block| format!("── [{}]", block.id))
                    .unwrap_or_else(|| "──".to_string());
                fence_ordinal += 1;
                lines.push(Line::from(Span::styled(tag, Style::default().fg(ACCENT))));
            } else {
                in_fence = true;
                let language = rest.trim();
                let label = if language.is_empty() {
                    "── code".to_string()
                } else {
                    format!("── {language}")
                };
                lines.push(Line::from(Span::styled(
                    label,
                    Style::default().fg(ACCENT),
                )));
            }
        } else if in_fence {
            lines.push(Line::from(Span::styled(
                raw.to_string(),
                Style::default().fg(Color::Yellow),
            )));
        } else {
            lines.push(Line::from(Span::raw(raw.to_string())));
        }
    }

    lines
}

fn displayed_content(turn: &Turn) -> String {
    if turn.collapsed && turn.content.chars().count() > COLLAPSE_THRESHOLD {
        let head: String = turn.content.chars().take(COLLAPSE_THRESHOLD).collect();
        format!("{head}…")
    } else {
        turn.content.clone()
    }
}

fn draw_model_list(frame: &mut Frame, app: &App, area: Rect) {
    let mut lines = vec![
        Line::from(Span::styled(
            "select a model (j/k to move, enter to apply, esc to cancel)",
            Style::default().fg(SUBTLE),
        )),
        Line::default(),
    ];

    if app.session.models.is_empty() {
        lines.push(Line::from(Span::styled(
            "loading models…",
            Style::default().fg(SUBTLE),
        )));
    }

    for (index, model) in app.session.models.iter().enumerate() {
        if index == app.ui.selected_model {
            lines.push(Line::from(vec![
                Span::styled("> ", Style::default().fg(ACCENT)),
                Span::styled(model.clone(), Style::default().fg(ACCENT)),
            ]));
        } else {
            lines.push(Line::from(Span::raw(format!("  {model}"))));
        }
    }

    frame.render_widget(Paragraph::new(Text::from(lines)), area);
}

fn draw_input(frame: &mut Frame, app: &mut App, area: Rect) {
    match app.ui.mode {
        UiMode::Insert | UiMode::Command => {
            let title = if app.ui.mode == UiMode::Insert {
                " insert "
            } else {
                " command : "
            };
            app.ui.input.set_cursor_line_style(Style::default());
            app.ui.input.set_block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(ACCENT))
                    .title(title),
            );
            frame.render_widget(&app.ui.input, area);
        }
        _ => {
            frame.render_widget(
                Paragraph::new(Line::from(Span::styled(
                    " i insert · o/O recall · : command · y yank · gg/G scroll · q quit",
                    Style::default().fg(SUBTLE),
                ))),
                area,
            );
        }
    }
}

/// Display rows `text` occupies at `width` once wrapped.
fn wrapped_height(text: &Text, width: u16) -> u16 {
    if width == 0 {
        return 0;
    }
    let width = width as usize;
    let mut rows: usize = 0;
    for line in &text.lines {
        let line_width: usize = line.spans.iter().map(|span| span.content.width()).sum();
        rows += 1 + line_width.saturating_sub(1) / width;
    }
    rows.min(u16::MAX as usize) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::create_test_app;

    #[test]
    fn wrapped_height_counts_soft_wraps() {
        let text = Text::from(vec![
            Line::from(Span::raw("short")),
            Line::from(Span::raw("x".repeat(25))),
            Line::default(),
        ]);
        assert_eq!(wrapped_height(&text, 10), 1 + 3 + 1);
    }

    #[test]
    fn collapsed_turn_truncates_to_threshold() {
        let mut turn = Turn::user("aa", "y".repeat(150));
        turn.collapsed = true;
        let shown = displayed_content(&turn);
        assert_eq!(shown.chars().count(), COLLAPSE_THRESHOLD + 1);
        assert!(shown.ends_with('…'));
    }

    #[test]
    fn content_lines_tag_indexed_blocks() {
        let mut app = create_test_app();
        let content = "intro\n```go\nfmt.Println()\n```\noutro";
        app.log.push(Turn::new(
            "aa",
            crate::core::message::Role::Assistant,
            content,
        ));
        app.code_blocks.rebuild_for_turn("aa", content);

        let lines = content_lines(&app, &app.log[0]);
        let rendered: Vec<String> = lines
            .iter()
            .map(|line| {
                line.spans
                    .iter()
                    .map(|span| span.content.clone().into_owned())
                    .collect::<String>()
            })
            .collect();

        assert!(rendered.contains(&"── go".to_string()));
        assert!(rendered.contains(&"── [aaa]".to_string()));
        assert!(rendered.contains(&"fmt.Println()".to_string()));
    }
}

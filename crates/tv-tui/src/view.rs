//! Renders a `SessionSnapshot`.  Pure function of the snapshot; no state.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Frame,
};
use tv_proto::protocol::PlayerStatus;

use crate::focus::{EpgFocus, RewindFocus};
use crate::session::{
    ChannelSummary, EpgSnapshot, OverlayMode, ProgramSummary, RewindSnapshot, SessionSnapshot,
};
use crate::theme::*;

const INFO_BAR_HEIGHT: u16 = 5;

pub fn draw(frame: &mut Frame, snap: &SessionSnapshot) {
    let area = frame.area();
    frame.render_widget(Block::default().style(Style::default().bg(C_BG)), area);

    if snap.channel_count == 0 && snap.mode == OverlayMode::None {
        let msg = Paragraph::new(Line::from(Span::styled(
            "No channels",
            style_secondary(),
        )));
        frame.render_widget(msg, centered(area, 11, 1));
    }

    match snap.mode {
        OverlayMode::None => draw_channel_badge(frame, area, snap),
        OverlayMode::Controls => draw_info_bar(frame, area, snap),
        OverlayMode::Epg => {
            if let Some(epg) = &snap.epg {
                draw_epg(frame, area, epg);
            }
        }
        OverlayMode::Rewind => {
            if let Some(rewind) = &snap.rewind {
                draw_rewind(frame, area, rewind);
            }
        }
    }

    if let Some(notice) = &snap.notice {
        draw_notice(frame, area, notice);
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn status_badge(snap: &SessionSnapshot) -> Option<Span<'static>> {
    if snap.switching {
        return Some(Span::styled(" TUNING ", Style::default().fg(C_CONNECTING)));
    }
    if snap.archive_position.is_some() && snap.player_status == PlayerStatus::Playing {
        return Some(Span::styled(" ARCHIVE ", Style::default().fg(C_ARCHIVE)));
    }
    let color = match snap.player_status {
        PlayerStatus::Playing => C_PLAYING,
        PlayerStatus::Buffering => C_CONNECTING,
        PlayerStatus::Error => C_ERROR,
        PlayerStatus::Paused | PlayerStatus::Idle => C_SECONDARY,
    };
    snap.player_status
        .badge_label()
        .map(|l| Span::styled(format!(" {} ", l), Style::default().fg(color)))
}

fn channel_title(channel: &ChannelSummary) -> Vec<Span<'static>> {
    let mut spans = vec![
        Span::styled(format!("{:>3} ", channel.number), style_secondary()),
        Span::styled(
            channel.name.clone(),
            style_default().add_modifier(Modifier::BOLD),
        ),
    ];
    if channel.is_hd {
        spans.push(Span::styled(" HD", style_muted()));
    }
    if channel.favorite {
        spans.push(Span::styled(" ★", Style::default().fg(C_STAR)));
    }
    spans
}

/// Minimal corner badge shown while no overlay is up.
fn draw_channel_badge(frame: &mut Frame, area: Rect, snap: &SessionSnapshot) {
    let Some(channel) = &snap.channel else {
        return;
    };
    let mut spans = channel_title(channel);
    if let Some(badge) = status_badge(snap) {
        spans.push(badge);
    }
    let line = Line::from(spans);
    let width = (line.width() as u16).min(area.width);
    let rect = Rect::new(area.x + area.width.saturating_sub(width), area.y, width, 1);
    frame.render_widget(Paragraph::new(line), rect);
}

fn draw_info_bar(frame: &mut Frame, area: Rect, snap: &SessionSnapshot) {
    let height = INFO_BAR_HEIGHT.min(area.height);
    let rect = Rect::new(area.x, area.y + area.height - height, area.width, height);
    frame.render_widget(Clear, rect);
    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(style_border(true))
        .style(Style::default().bg(C_PANEL_BG));
    let inner = block.inner(rect);
    frame.render_widget(block, rect);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(inner);

    let mut title = snap.channel.as_ref().map(channel_title).unwrap_or_default();
    if let Some(badge) = status_badge(snap) {
        title.push(Span::raw("  "));
        title.push(badge);
    }
    if let Some(at) = snap.archive_position {
        title.push(Span::styled(
            format!("  from {}", at.format("%d/%m %H:%M")),
            Style::default().fg(C_ARCHIVE),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(title)), rows[0]);

    match &snap.program {
        Some(program) => {
            frame.render_widget(Paragraph::new(program_line(program)), rows[1]);
            draw_progress(frame, rows[2], program.progress);
        }
        None => frame.render_widget(
            Paragraph::new(Span::styled("No program information", style_muted())),
            rows[1],
        ),
    }

    let hints = Line::from(Span::styled(
        "▲▼ channel   OK guide   R rewind   F favourite   P pause   Esc hide",
        style_muted(),
    ));
    frame.render_widget(Paragraph::new(hints), rows[3]);
}

fn program_line(program: &ProgramSummary) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!(
                "{}–{} ",
                program.start.format("%H:%M"),
                program.end.format("%H:%M")
            ),
            style_secondary(),
        ),
        Span::styled(program.title.clone(), style_default()),
        Span::styled(format!("  {} min", program.duration_minutes), style_muted()),
    ])
}

fn draw_progress(frame: &mut Frame, area: Rect, progress: f64) {
    if area.width < 4 || area.height == 0 {
        return;
    }
    const BLOCKS: [char; 9] = [' ', '▏', '▎', '▍', '▌', '▋', '▊', '▉', '█'];
    let width = area.width as usize;
    let eighths = (progress.clamp(0.0, 1.0) * width as f64 * 8.0) as usize;
    let full = eighths / 8;
    let mut bar: String = "█".repeat(full);
    if full < width {
        bar.push(BLOCKS[eighths % 8]);
        bar.push_str(&" ".repeat(width - full - 1));
    }
    frame.render_widget(
        Paragraph::new(Span::styled(bar, Style::default().fg(C_PLAYING))),
        area,
    );
}

fn draw_epg(frame: &mut Frame, area: Rect, epg: &EpgSnapshot) {
    let rect = centered(area, area.width.saturating_sub(8).max(40), area.height.saturating_sub(4));
    frame.render_widget(Clear, rect);
    let block = Block::default()
        .title(" Guide ")
        .borders(Borders::ALL)
        .border_style(style_border(true))
        .style(Style::default().bg(C_PANEL_BG));
    let inner = block.inner(rect);
    frame.render_widget(block, rect);

    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(2), Constraint::Min(0)])
        .split(inner);

    let bar_focused = epg.focus == EpgFocus::CategoryBar;
    let mut tabs = Vec::new();
    for (i, label) in epg.categories.iter().enumerate() {
        let style = match (i == epg.category_index, bar_focused) {
            (true, true) => style_selected_focused().fg(C_ACCENT),
            (true, false) => style_selected(),
            _ => style_secondary(),
        };
        tabs.push(Span::styled(format!(" {} ", label), style));
        tabs.push(Span::raw(" "));
    }
    frame.render_widget(Paragraph::new(Line::from(tabs)), parts[0]);

    if epg.rows.is_empty() {
        frame.render_widget(
            Paragraph::new(Span::styled("Nothing here", style_muted())),
            parts[1],
        );
        return;
    }

    let items: Vec<ListItem> = epg
        .rows
        .iter()
        .map(|row| {
            let mut spans = channel_title(row);
            if let Some(now) = &row.now_playing {
                spans.push(Span::styled(format!("   {}", now), style_secondary()));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();
    let highlight = if bar_focused {
        style_selected()
    } else {
        style_selected_focused()
    };
    let list = List::new(items).highlight_style(highlight);
    let mut state = ListState::default();
    state.select(epg.selected);
    frame.render_stateful_widget(list, parts[1], &mut state);
}

fn draw_rewind(frame: &mut Frame, area: Rect, rewind: &RewindSnapshot) {
    let rect = centered(area, 44, 9);
    frame.render_widget(Clear, rect);
    let block = Block::default()
        .title(format!(" Rewind · {} ", rewind.channel_name))
        .borders(Borders::ALL)
        .border_style(style_border(true))
        .style(Style::default().bg(C_PANEL_BG));
    let inner = block.inner(rect);
    frame.render_widget(block, rect);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(inner);

    if rewind.empty {
        frame.render_widget(
            Paragraph::new(Span::styled("No archive available", style_muted())),
            rows[1],
        );
        return;
    }

    let cell = |text: String, focus: RewindFocus| {
        let style = if rewind.focus == focus {
            style_selected_focused().fg(C_ACCENT)
        } else {
            style_default()
        };
        Span::styled(format!(" {} ", text), style)
    };
    let day = rewind
        .day_index
        .and_then(|i| rewind.days.get(i))
        .cloned()
        .unwrap_or_default();
    let picker = Line::from(vec![
        cell(format!("{:^9}", day), RewindFocus::Day),
        Span::raw(" "),
        cell(format!("{:02}", rewind.hour.unwrap_or(0)), RewindFocus::Hour),
        Span::raw(":"),
        cell(format!("{:02}", rewind.minute.unwrap_or(0)), RewindFocus::Minute),
        Span::raw("   "),
        cell("Watch".to_string(), RewindFocus::Confirm),
    ]);
    frame.render_widget(Paragraph::new(picker), rows[1]);

    let status = if rewind.out_of_range {
        Span::styled("Outside the archive window", Style::default().fg(C_ERROR))
    } else {
        match rewind.instant {
            Some(at) => Span::styled(at.format("%a %d %b %H:%M").to_string(), style_secondary()),
            None => Span::raw(""),
        }
    };
    frame.render_widget(Paragraph::new(status), rows[3]);
}

fn draw_notice(frame: &mut Frame, area: Rect, notice: &str) {
    let width = (notice.chars().count() as u16 + 4).min(area.width);
    let rect = Rect::new(area.x + area.width.saturating_sub(width + 1), area.y + 1, width, 3);
    if rect.bottom() > area.bottom() {
        return;
    }
    frame.render_widget(Clear, rect);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(C_CONNECTING))
        .style(Style::default().bg(C_PANEL_BG));
    frame.render_widget(
        Paragraph::new(Span::styled(notice.to_string(), style_default())).block(block),
        rect,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};

    fn render(snap: &SessionSnapshot) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|f| draw(f, snap)).unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    fn channel() -> ChannelSummary {
        ChannelSummary {
            index: 0,
            number: 7,
            name: "Arte".into(),
            category: "Culture".into(),
            is_hd: true,
            favorite: true,
            now_playing: Some("Documentary".into()),
        }
    }

    #[test]
    fn test_empty_lineup_message() {
        let out = render(&SessionSnapshot::default());
        assert!(out.contains("No channels"));
    }

    #[test]
    fn test_controls_show_channel_and_status() {
        let snap = SessionSnapshot {
            mode: OverlayMode::Controls,
            channel_count: 1,
            current_channel_index: Some(0),
            channel: Some(channel()),
            player_status: PlayerStatus::Playing,
            ..SessionSnapshot::default()
        };
        let out = render(&snap);
        assert!(out.contains("Arte"));
        assert!(out.contains("LIVE"));
        assert!(out.contains("No program information"));
    }

    #[test]
    fn test_epg_lists_rows_and_categories() {
        let snap = SessionSnapshot {
            mode: OverlayMode::Epg,
            channel_count: 1,
            epg: Some(EpgSnapshot {
                categories: vec!["All".into(), "Favorites".into(), "Culture".into()],
                category_index: 0,
                focus: EpgFocus::ChannelList,
                rows: vec![channel()],
                selected: Some(0),
            }),
            ..SessionSnapshot::default()
        };
        let out = render(&snap);
        assert!(out.contains("Favorites"));
        assert!(out.contains("Documentary"));
    }

    #[test]
    fn test_rewind_out_of_range_warning() {
        let snap = SessionSnapshot {
            mode: OverlayMode::Rewind,
            notice: Some("Channel unavailable".into()),
            rewind: Some(RewindSnapshot {
                channel_name: "Arte".into(),
                days: vec!["Yesterday".into(), "Today".into()],
                day_index: Some(0),
                hour: Some(3),
                minute: Some(5),
                focus: RewindFocus::Hour,
                instant: None,
                out_of_range: true,
                empty: false,
            }),
            ..SessionSnapshot::default()
        };
        let out = render(&snap);
        assert!(out.contains("Yesterday"));
        assert!(out.contains("Outside the archive window"));
        assert!(out.contains("Channel unavailable"));
    }
}

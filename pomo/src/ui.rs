use crate::app::{App, AppMode, EntryForm, FormField};
use crate::countdown::{format_countdown, progress};
use crate::machine::Snapshot;
use pomo_ipc::{Mode, Phase, RunState};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Gauge, List, ListItem, Paragraph},
    Frame,
};

pub fn draw(f: &mut Frame, app: &App, snapshot: &Snapshot) {
    let area = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(7),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .split(area);
    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(chunks[2]);

    draw_header(f, chunks[0], app, snapshot);
    draw_timer(f, chunks[1], app, snapshot);
    draw_schedule(f, middle[0], app, snapshot);
    draw_settings(f, middle[1], app, snapshot);
    draw_status_bar(f, chunks[3], app);

    match &app.mode {
        AppMode::EntryForm(form) => draw_form_overlay(f, app, form),
        AppMode::ShowHelp => draw_help_overlay(f, app),
        AppMode::Normal => {}
    }
}

fn phase_color(app: &App, phase: Phase) -> Color {
    match phase {
        Phase::Work => app.config.theme.work,
        Phase::Break => app.config.theme.rest,
        Phase::Idle => app.config.theme.gray,
    }
}

fn draw_header(f: &mut Frame, area: Rect, app: &App, snapshot: &Snapshot) {
    let theme = &app.config.theme;
    let icons = &app.config.icons;
    let mode = match snapshot.timer.mode {
        Mode::Default => "default",
        Mode::Planned => "planned",
    };
    let text = Line::from(vec![
        Span::raw(icons.header_left.clone()),
        Span::styled(
            "POMO",
            Style::default().fg(theme.blue).add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" {} ", icons.separator)),
        Span::styled(mode, Style::default().fg(theme.magenta)),
        Span::raw(icons.header_right.clone()),
    ]);
    f.render_widget(
        Paragraph::new(text).alignment(Alignment::Center).block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_style(Style::default().fg(theme.black)),
        ),
        area,
    );
}

fn draw_timer(f: &mut Frame, area: Rect, app: &App, snapshot: &Snapshot) {
    let theme = &app.config.theme;
    let icons = &app.config.icons;
    let timer = &snapshot.timer;
    let accent = phase_color(app, timer.phase);
    let state_icon = match snapshot.state {
        RunState::Running => &icons.play,
        RunState::Paused => &icons.pause,
        RunState::Completed => &icons.done,
        RunState::Idle => &icons.stop,
    };
    let mut title = format!(" {} {} ", icons.timer, timer.phase);
    if let Some(name) = snapshot.current_entry_name() {
        title = format!(" {} {} {} {} ", icons.timer, timer.phase, icons.separator, name);
    }
    let block = Block::default()
        .title(Span::styled(title, Style::default().fg(theme.gray)))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(accent));
    let inner_area = block.inner(area);
    f.render_widget(block, area);
    let v_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(inner_area);
    f.render_widget(
        Paragraph::new(format!(
            "{} {}",
            state_icon,
            format_countdown(timer.remaining_time)
        ))
        .style(Style::default().fg(theme.foreground).add_modifier(Modifier::BOLD))
        .alignment(Alignment::Center),
        v_chunks[0],
    );
    f.render_widget(
        Paragraph::new(snapshot.state.to_string())
            .style(Style::default().fg(theme.gray))
            .alignment(Alignment::Center),
        v_chunks[1],
    );
    f.render_widget(
        Gauge::default()
            .gauge_style(Style::default().fg(accent).bg(theme.black))
            .percent((progress(timer.remaining_time, timer.phase_length) * 100.0) as u16),
        v_chunks[2],
    );
}

fn draw_schedule(f: &mut Frame, area: Rect, app: &App, snapshot: &Snapshot) {
    let theme = &app.config.theme;
    let icons = &app.config.icons;
    let schedule = &snapshot.timer.schedule;
    let block = Block::default()
        .title(Span::styled(
            format!(" {} Schedule ", icons.schedule),
            Style::default().fg(theme.gray),
        ))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(if snapshot.timer.mode == Mode::Planned {
            theme.blue
        } else {
            theme.black
        }));
    if schedule.is_empty() {
        f.render_widget(
            Paragraph::new("No planned entries. Press 'a' to add one.")
                .style(Style::default().fg(theme.gray))
                .alignment(Alignment::Center)
                .block(block),
            area,
        );
        return;
    }
    let current = schedule.current_index();
    let items: Vec<ListItem> = schedule
        .entries()
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let marker = match current {
                Some(c) if c == i => &icons.current,
                Some(c) if i < c => &icons.done,
                _ => &icons.pending,
            };
            let select = if i == app.selected_entry {
                Span::styled(icons.select.clone(), Style::default().fg(theme.selection))
            } else {
                Span::raw(" ")
            };
            let name_style = if current == Some(i) {
                Style::default()
                    .fg(phase_color(app, snapshot.timer.phase))
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(theme.foreground)
            };
            let line = Line::from(vec![
                select,
                Span::raw(format!(" {} ", marker)),
                Span::styled(
                    format!(
                        "{}-{}-{} ",
                        entry.start_time, entry.work_end_time, entry.break_end_time
                    ),
                    Style::default().fg(theme.cyan),
                ),
                Span::styled(entry.display_name(i), name_style),
            ]);
            let item = ListItem::new(line);
            if i == app.selected_entry {
                item.style(Style::default().bg(theme.black))
            } else {
                item
            }
        })
        .collect();
    f.render_widget(List::new(items).block(block), area);
}

fn draw_settings(f: &mut Frame, area: Rect, app: &App, snapshot: &Snapshot) {
    let theme = &app.config.theme;
    let settings = &snapshot.timer.settings;
    let row = |label: &str, value: String| {
        Line::from(vec![
            Span::styled(format!("{:<12}", label), Style::default().fg(theme.gray)),
            Span::styled(value, Style::default().fg(theme.foreground)),
        ])
    };
    let lines = vec![
        row("Work", format!("{} min", settings.work_duration)),
        row("Break", format!("{} min", settings.break_duration)),
        row(
            "Auto repeat",
            if settings.auto_repeat { "on" } else { "off" }.to_string(),
        ),
        row("Volume", format!("{:.0}%", settings.volume * 100.0)),
        row("Step", format!("{} min", app.step())),
    ];
    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .title(Span::styled(
                    format!(" {} Settings ", app.config.icons.settings),
                    Style::default().fg(theme.gray),
                ))
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(theme.black)),
        ),
        area,
    );
}

fn draw_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let (mode_text, mode_color) = match app.mode {
        AppMode::Normal => ("NORMAL", theme.rest),
        AppMode::EntryForm(_) => ("ENTRY", theme.yellow),
        AppMode::ShowHelp => ("HELP", theme.magenta),
    };
    let help = match (&app.mode, &app.message) {
        (AppMode::Normal, Some(message)) => message.as_str(),
        (AppMode::Normal, None) => {
            "s:start │ b:break │ space:pause │ x:stop │ m:mode │ a/e/d:entries │ ?:help │ q:quit"
        }
        (AppMode::EntryForm(_), _) => "tab:next field │ enter:save │ esc:cancel",
        (AppMode::ShowHelp, _) => "any key:close",
    };
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(
                format!(" {} ", mode_text),
                Style::default()
                    .bg(mode_color)
                    .fg(theme.background)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" "),
            Span::raw(help),
        ]))
        .block(Block::default().style(Style::default().bg(theme.black).fg(theme.gray))),
        area,
    );
}

fn draw_form_overlay(f: &mut Frame, app: &App, form: &EntryForm) {
    let theme = &app.config.theme;
    let area = centered_rect(50, 40, f.area());
    f.render_widget(Clear, area);
    let title = if form.editing.is_some() {
        " Edit Entry "
    } else {
        " New Entry "
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.yellow))
        .border_type(BorderType::Double)
        .style(Style::default().bg(theme.background));
    let inner_area = block.inner(area);
    f.render_widget(block, area);

    let mut lines: Vec<Line> = FormField::ALL
        .iter()
        .map(|&field| {
            let focused = field == form.focus;
            let mut spans = vec![
                Span::styled(
                    if focused { "▸ " } else { "  " },
                    Style::default().fg(theme.selection),
                ),
                Span::styled(
                    format!("{:<12}", field.label()),
                    Style::default().fg(theme.gray),
                ),
                Span::styled(form.value(field).to_string(), Style::default().fg(theme.foreground)),
            ];
            if focused {
                spans.push(Span::styled(
                    app.config.icons.input_cursor.clone(),
                    Style::default()
                        .fg(theme.foreground)
                        .add_modifier(Modifier::SLOW_BLINK),
                ));
            }
            Line::from(spans)
        })
        .collect();
    if let Some(error) = &form.error {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(theme.work),
        )));
    }
    f.render_widget(Paragraph::new(lines), inner_area);
}

fn draw_help_overlay(f: &mut Frame, app: &App) {
    let theme = &app.config.theme;
    let area = centered_rect(60, 80, f.area());
    f.render_widget(Clear, area);

    let shortcuts = [
        ("s", "Start work (planned: start schedule)"),
        ("b", "Start break after a finished phase"),
        ("Space", "Pause / resume"),
        ("x", "Stop"),
        ("R", "Reset"),
        ("m", "Switch default / planned mode"),
        ("a / e / d", "Add / edit / delete entry"),
        ("j / k", "Move selection"),
        ("+ / -", "Work duration"),
        ("> / <", "Break duration"),
        ("i", "Cycle step (1, 5, 25 min)"),
        ("r", "Toggle auto repeat"),
        ("V / v", "Volume up / down"),
        ("t", "Test sound"),
        ("q", "Quit"),
    ];
    let items: Vec<ListItem> = shortcuts
        .iter()
        .map(|(key, desc)| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:<12}", key), Style::default().fg(theme.blue)),
                Span::raw(*desc),
            ]))
        })
        .collect();
    f.render_widget(
        List::new(items).block(
            Block::default()
                .title(" Keys ")
                .borders(Borders::ALL)
                .border_type(BorderType::Double)
                .border_style(Style::default().fg(theme.magenta))
                .style(Style::default().bg(theme.background)),
        ),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::machine::{Event, Machine};
    use ratatui::{backend::TestBackend, Terminal};

    fn render(app: &App, snapshot: &Snapshot) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| draw(f, app, snapshot)).unwrap();
        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer[(x, y)].symbol());
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn running_timer_shows_countdown() {
        let mut machine = Machine::with_clock(ManualClock::at("09:00"));
        machine.send(Event::StartWork);
        machine.send(Event::Tick);
        let screen = render(&App::new(Config::default()), &machine.snapshot());
        assert!(screen.contains("24:59"));
        assert!(screen.contains("Work"));
        assert!(screen.contains("No planned entries"));
    }

    #[test]
    fn help_overlay_lists_keys() {
        let mut app = App::new(Config::default());
        app.mode = AppMode::ShowHelp;
        let screen = render(&app, &Snapshot::default());
        assert!(screen.contains("Toggle auto repeat"));
    }
}

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;
use std::time::Duration;
use tracing::warn;

use crate::models::{Job, ResponseBucket};
use crate::settings::Preferences;
use crate::sheet::JobStore;
use crate::tracker::{Notice, NoticeLevel, Tracker};
use crate::view::{filter_and_sort, StatusCounts, StatusFilter};

// Redraw often enough for notices to disappear on their own
const TICK: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Normal,
    Search,
    ConfirmDelete(String),
}

struct AppState {
    query: String,
    status: StatusFilter,
    selected: usize,
    scroll_offset: u16,
    mode: Mode,
}

impl AppState {
    fn new(query: String, status: StatusFilter) -> Self {
        Self {
            query,
            status,
            selected: 0,
            scroll_offset: 0,
            mode: Mode::Normal,
        }
    }

    fn clamp(&mut self, len: usize) {
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }

    fn next(&mut self, len: usize) {
        if len > 0 && self.selected < len - 1 {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }
}

struct Palette {
    accent: Color,
    muted: Color,
    highlight_bg: Color,
    applied: Color,
    ready: Color,
}

impl Palette {
    fn new(dark: bool) -> Self {
        if dark {
            Self {
                accent: Color::Cyan,
                muted: Color::DarkGray,
                highlight_bg: Color::DarkGray,
                applied: Color::Green,
                ready: Color::Yellow,
            }
        } else {
            Self {
                accent: Color::Blue,
                muted: Color::Gray,
                highlight_bg: Color::Gray,
                applied: Color::Green,
                ready: Color::Magenta,
            }
        }
    }

    fn bucket(&self, bucket: ResponseBucket) -> Color {
        match bucket {
            ResponseBucket::Waiting => Color::Yellow,
            ResponseBucket::Confirmation => Color::Magenta,
            ResponseBucket::Rejection => Color::Red,
            ResponseBucket::Interview => Color::Cyan,
            ResponseBucket::Acceptance => Color::Green,
            ResponseBucket::Other => self.muted,
        }
    }

    fn notice(&self, level: NoticeLevel) -> Color {
        match level {
            NoticeLevel::Success => self.applied,
            NoticeLevel::Info => self.accent,
            NoticeLevel::Error => Color::Red,
        }
    }
}

pub async fn run_browse<S: JobStore>(
    tracker: &mut Tracker<S>,
    prefs: &mut Preferences,
    query: String,
    status: StatusFilter,
) -> Result<()> {
    let mut state = AppState::new(query, status);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, tracker, prefs).await;

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    // Nothing may keep polling once the view is gone
    tracker.canceller().cancel();

    result
}

async fn run_loop<S: JobStore>(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    tracker: &mut Tracker<S>,
    prefs: &mut Preferences,
) -> Result<()> {
    let mut list_state = ListState::default();

    loop {
        let palette = Palette::new(prefs.dark_mode);
        let notice = tracker.notice().cloned();
        let counts = StatusCounts::of(tracker.jobs());
        let selected_id = {
            let visible = filter_and_sort(tracker.jobs(), &state.query, state.status);
            state.clamp(visible.len());
            list_state.select((!visible.is_empty()).then_some(state.selected));
            terminal.draw(|frame| {
                draw(frame, state, &visible, counts, notice.as_ref(), &palette, &mut list_state)
            })?;
            visible.get(state.selected).map(|job| job.id.clone())
        };

        if !event::poll(TICK)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match state.mode.clone() {
            Mode::Search => match key.code {
                KeyCode::Enter | KeyCode::Esc => state.mode = Mode::Normal,
                KeyCode::Backspace => {
                    state.query.pop();
                    state.selected = 0;
                }
                KeyCode::Char(c) => {
                    state.query.push(c);
                    state.selected = 0;
                }
                _ => {}
            },
            Mode::ConfirmDelete(id) => {
                state.mode = Mode::Normal;
                if matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
                    let _ = tracker.delete(&id, |_| true).await;
                }
            }
            Mode::Normal => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Down | KeyCode::Char('j') => {
                    let len = filter_and_sort(tracker.jobs(), &state.query, state.status).len();
                    state.next(len);
                }
                KeyCode::Up | KeyCode::Char('k') => state.prev(),
                KeyCode::Char('J') | KeyCode::PageDown => state.scroll_down(),
                KeyCode::Char('K') | KeyCode::PageUp => state.scroll_up(),
                KeyCode::Char('/') => state.mode = Mode::Search,
                KeyCode::Char('f') => {
                    state.status = state.status.cycle();
                    state.selected = 0;
                }
                KeyCode::Char('r') => {
                    let _ = tracker.load().await;
                }
                KeyCode::Char('a') => {
                    if let Some(id) = &selected_id {
                        let _ = tracker.mark_applied(id).await;
                    }
                }
                KeyCode::Char('d') => {
                    if let Some(id) = selected_id {
                        state.mode = Mode::ConfirmDelete(id);
                    }
                }
                KeyCode::Char('t') => {
                    if let Err(e) = prefs.toggle_dark_mode() {
                        warn!("Could not save theme: {}", e);
                    }
                }
                KeyCode::Char('x') => tracker.clear_notice(),
                _ => {}
            },
        }
    }
    Ok(())
}

fn draw(
    frame: &mut Frame,
    state: &AppState,
    visible: &[&Job],
    counts: StatusCounts,
    notice: Option<&Notice>,
    palette: &Palette,
    list_state: &mut ListState,
) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    frame.render_widget(header(state, counts, palette), rows[0]);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(35),
            Constraint::Percentage(65),
        ])
        .split(rows[1]);

    // Left panel: job list
    let items: Vec<ListItem> = visible
        .iter()
        .map(|job| {
            let (icon, color) = if job.is_applied() {
                ("+", palette.applied)
            } else {
                (" ", palette.ready)
            };
            let position = if job.position.chars().count() > 30 {
                format!("{}...", job.position.chars().take(27).collect::<String>())
            } else {
                job.position.clone()
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", icon), Style::default().fg(color)),
                Span::raw(format!("{} | {}", position, job.company)),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(format!(
            " Jobs ({}) ", visible.len()
        )))
        .highlight_style(Style::default().bg(palette.highlight_bg).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, chunks[0], list_state);

    // Right panel: job detail
    let detail = build_detail(visible.get(state.selected).copied(), palette);
    let detail_widget = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));

    frame.render_widget(detail_widget, chunks[1]);

    frame.render_widget(footer(state, visible, notice, palette), rows[2]);
}

fn header<'a>(state: &AppState, counts: StatusCounts, palette: &Palette) -> Paragraph<'a> {
    let facets = [StatusFilter::All, StatusFilter::NotApplied, StatusFilter::Applied];
    let mut spans: Vec<Span> = vec![Span::styled(
        " latest jobs  ",
        Style::default().fg(palette.accent).add_modifier(Modifier::BOLD),
    )];
    for facet in facets {
        let label = format!("{} ({})  ", facet, counts.for_filter(facet));
        let style = if facet == state.status {
            Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(palette.muted)
        };
        spans.push(Span::styled(label, style));
    }
    if !state.query.is_empty() || state.mode == Mode::Search {
        spans.push(Span::raw(format!("search: {}", state.query)));
    }
    Paragraph::new(Line::from(spans))
}

fn footer<'a>(
    state: &AppState,
    visible: &[&Job],
    notice: Option<&Notice>,
    palette: &Palette,
) -> Paragraph<'a> {
    match &state.mode {
        Mode::Search => Paragraph::new(format!(" /{}  (enter to finish)", state.query)),
        Mode::ConfirmDelete(id) => {
            let label = visible
                .iter()
                .find(|j| &j.id == id)
                .map(|j| format!("{} at {}", j.position, j.company))
                .unwrap_or_else(|| id.clone());
            Paragraph::new(format!(" Delete {}? (y/N)", label))
                .style(Style::default().fg(Color::Red))
        }
        Mode::Normal => match notice {
            Some(notice) => Paragraph::new(format!(" {}", notice.message))
                .style(Style::default().fg(palette.notice(notice.level))),
            None => Paragraph::new(
                " j/k:navigate  J/K:scroll  /:search  f:filter  a:applied  d:delete  r:refresh  t:theme  q:quit",
            )
            .style(Style::default().fg(palette.muted)),
        },
    }
}

fn build_detail<'a>(job: Option<&'a Job>, palette: &Palette) -> Text<'a> {
    let Some(job) = job else {
        return Text::raw("No jobs found...");
    };

    let mut lines: Vec<Line> = Vec::new();

    // Header
    lines.push(Line::from(Span::styled(
        &job.position,
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(format!("at {}", job.company)));

    if job.is_applied() {
        lines.push(Line::from(vec![
            Span::styled("Applied", Style::default().fg(palette.applied)),
            Span::raw(format!(" on {}  ", job.date_applied)),
            Span::styled(
                job.response_label(),
                Style::default().fg(palette.bucket(job.response_bucket())),
            ),
        ]));
    } else {
        lines.push(Line::from(Span::styled(
            "Ready to apply",
            Style::default().fg(palette.ready),
        )));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(format!("Type: {}", job.employment_type)));
    lines.push(Line::from(format!("Posted: {}", job.date_posted)));
    if !job.predicted_pay.is_empty() {
        lines.push(Line::from(format!("Pay: {}", job.predicted_pay)));
    }
    if !job.posting_link.is_empty() {
        lines.push(Line::from(format!("Link: {}", job.posting_link)));
    }
    lines.push(Line::from(Span::styled(
        format!("id: {}", job.id),
        Style::default().fg(palette.muted),
    )));

    for (title, body) in [("Salary & Benefits", &job.salary_benefits), ("Notes", &job.notes)] {
        if body.trim().is_empty() {
            continue;
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            title,
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for line in textwrap::fill(body, 70).lines() {
            lines.push(Line::from(format!("  {}", line)));
        }
    }

    Text::from(lines)
}

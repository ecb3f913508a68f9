use crate::coordinator::PlaceCoordinator;
use crate::fetcher::FetchError;
use crate::geo::format_distance;
use crate::place::{Category, CategoryKind, Place, RankedPlace};
use anyhow::{anyhow, Result};
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Duration;

const PAGE_SIZE: usize = 20;
const TICK: Duration = Duration::from_millis(200);

pub struct App {
    pub coordinator: PlaceCoordinator,
    pub places: Vec<RankedPlace>,
    pub state: TableState,
    pub show_detail: bool,
    pub status_message: Option<String>,
    pending: Option<Receiver<Result<Vec<Place>, FetchError>>>,
}

impl App {
    pub fn new(coordinator: PlaceCoordinator) -> Result<Self> {
        let mut app = Self {
            coordinator,
            places: Vec::new(),
            state: TableState::default(),
            show_detail: false,
            status_message: None,
            pending: None,
        };
        app.reload()?;
        Ok(app)
    }

    /// Re-read the store and re-apply filter and ranking
    pub fn reload(&mut self) -> Result<()> {
        self.places = self.coordinator.visible_places()?;

        if self.places.is_empty() {
            self.state.select(None);
        } else {
            let keep = self.state.selected().unwrap_or(0).min(self.places.len() - 1);
            self.state.select(Some(keep));
        }
        Ok(())
    }

    pub fn toggle_category(&mut self, kind: CategoryKind) -> Result<()> {
        self.coordinator.toggle(kind);
        self.state.select(Some(0));
        self.reload()
    }

    /// Start a refresh on a worker thread; `poll_refresh` applies it
    pub fn refresh(&mut self) {
        if self.pending.is_some() {
            self.status_message = Some("Refresh already running".to_string());
            return;
        }

        self.pending = Some(self.coordinator.start_refresh());
        self.status_message = Some(format!("Refreshing from {}...", self.coordinator.source_name()));
    }

    pub fn is_refreshing(&self) -> bool {
        self.pending.is_some()
    }

    /// Persist a finished background fetch. Returns true once one was applied.
    pub fn poll_refresh(&mut self) -> Result<bool> {
        let fetched = match &self.pending {
            Some(rx) => match rx.try_recv() {
                Ok(result) => result.map_err(anyhow::Error::from),
                Err(TryRecvError::Empty) => return Ok(false),
                Err(TryRecvError::Disconnected) => Err(anyhow!("fetch worker exited without a result")),
            },
            None => return Ok(false),
        };
        self.pending = None;

        let source = self.coordinator.source_name();
        let outcome = fetched.and_then(|places| self.coordinator.persist(&source, &places));

        self.status_message = Some(match outcome {
            Ok(report) => format!(
                "Refreshed from {}: {} new, {} updated",
                report.source, report.stats.inserted, report.stats.updated
            ),
            Err(e) => format!("Refresh failed: {:#}", e),
        });
        self.reload()?;
        Ok(true)
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_place(&self) -> Option<&RankedPlace> {
        self.state.selected().and_then(|i| self.places.get(i))
    }

    pub fn next(&mut self) {
        let len = self.places.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.places.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) => len - 1,
            Some(i) => i - 1,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let len = self.places.len();
        if len == 0 {
            return;
        }
        let i = self.state.selected().map(|i| (i + PAGE_SIZE).min(len - 1)).unwrap_or(0);
        self.state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let i = self.state.selected().map(|i| i.saturating_sub(PAGE_SIZE)).unwrap_or(0);
        self.state.select(Some(i));
    }

    pub fn counts(&self) -> CategoryCounts {
        let mut counts = CategoryCounts::default();

        for ranked in &self.places {
            match ranked.place.category() {
                Category::Hospital => counts.hospitals += 1,
                Category::Police => counts.police += 1,
                Category::Library => counts.libraries += 1,
                Category::Other(_) => counts.other += 1,
            }
        }

        counts
    }
}

#[derive(Default)]
pub struct CategoryCounts {
    pub hospitals: usize,
    pub police: usize,
    pub libraries: usize,
    pub other: usize,
}

impl CategoryCounts {
    pub fn get(&self, kind: CategoryKind) -> usize {
        match kind {
            CategoryKind::Hospital => self.hospitals,
            CategoryKind::Police => self.police,
            CategoryKind::Library => self.libraries,
        }
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        // Wake up periodically so a finished background refresh gets applied
        if event::poll(TICK)? {
            if let Event::Key(key) = event::read()? {
                if let KeyCode::Char(c) = key.code {
                    if let Some(kind) = CategoryKind::from_key(c) {
                        app.toggle_category(kind)?;
                        continue;
                    }
                }

                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                    KeyCode::Enter => app.toggle_detail(),
                    KeyCode::Char('r') => app.refresh(),
                    KeyCode::Down | KeyCode::Char('j') => app.next(),
                    KeyCode::Up | KeyCode::Char('k') => app.previous(),
                    KeyCode::PageDown => app.page_down(),
                    KeyCode::PageUp => app.page_up(),
                    KeyCode::Home => app.state.select(Some(0)),
                    KeyCode::End => {
                        if !app.places.is_empty() {
                            app.state.select(Some(app.places.len() - 1));
                        }
                    }
                    _ => {}
                }
            }
        }

        app.poll_refresh()?;
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with filters
            Constraint::Min(0),    // Place list
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_table(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        render_table(f, chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn category_color(category: &Category) -> Color {
    match category {
        Category::Hospital => Color::Red,
        Category::Police => Color::Blue,
        Category::Library => Color::Green,
        Category::Other(_) => Color::White,
    }
}

fn toggle_span(label: &str, key: char, enabled: bool, count: usize, color: Color) -> Vec<Span<'static>> {
    let style = if enabled {
        Style::default().fg(color).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::CROSSED_OUT)
    };

    vec![
        Span::styled(format!("[{}] ", key), Style::default().fg(Color::Yellow)),
        Span::styled(format!("{} {}", label, count), style),
        Span::raw("  "),
    ]
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let counts = app.counts();
    let filter = app.coordinator.filter();

    let mut spans = vec![Span::styled(
        "GeoAssist  ",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )];
    for kind in CategoryKind::ALL {
        spans.extend(toggle_span(
            kind.label(),
            kind.key(),
            filter.is_enabled(kind),
            counts.get(kind),
            category_color(&Category::from_label(kind.label())),
        ));
    }

    spans.push(Span::raw("|  "));
    spans.push(match app.coordinator.user_position() {
        Some(p) => Span::styled(
            format!("📍 {:.4}, {:.4}", p.latitude, p.longitude),
            Style::default().fg(Color::White),
        ),
        None => Span::styled("📍 no position", Style::default().fg(Color::DarkGray)),
    });

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Distance", "Name", "Category", "Address"].iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.places.iter().map(|ranked| {
        let place = &ranked.place;
        let color = category_color(&place.category());

        let cells = vec![
            Cell::from(ranked.distance_label().unwrap_or_else(|| "—".to_string())),
            Cell::from(truncate(&place.name, 34)),
            Cell::from(place.category.clone()).style(Style::default().fg(color)),
            Cell::from(truncate(&place.address, 40)),
        ];

        Row::new(cells).height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(36),
            Constraint::Length(12),
            Constraint::Min(20),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Nearby Places "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);
    let total = app.places.len();

    let mut status_spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, total),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(message) = &app.status_message {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(message.clone(), Style::default().fg(Color::Green)));
    }

    status_spans.push(Span::raw(" | "));
    status_spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Details | "));
    status_spans.push(Span::styled("r", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Refresh | "));
    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Nav | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Place Details ");

    let ranked = match app.selected_place() {
        Some(r) => r,
        None => {
            f.render_widget(Paragraph::new("No place selected").block(block), area);
            return;
        }
    };
    let place = &ranked.place;
    let label = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);

    let content = vec![
        Line::from(""),
        Line::from(vec![Span::styled("  Name: ", label), Span::raw(place.name.clone())]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Category: ", label),
            Span::styled(
                place.category.clone(),
                Style::default().fg(category_color(&place.category())),
            ),
        ]),
        Line::from(""),
        Line::from(vec![Span::styled("  Address: ", label), Span::raw(place.address.clone())]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Coordinates: ", label),
            Span::raw(format!("{:.5}, {:.5}", place.latitude, place.longitude)),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Distance: ", label),
            Span::raw(
                ranked
                    .distance_meters
                    .map(format_distance)
                    .unwrap_or_else(|| "unknown (no position)".to_string()),
            ),
        ]),
        Line::from(""),
        Line::from(vec![Span::styled(
            "  Press Enter to close",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )]),
    ];

    f.render_widget(Paragraph::new(content).block(block), area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len - 3).collect();
        format!("{}...", cut)
    }
}

// 🖥️ Operator Console - read-only view over the three collections
//
// Tabs: Catalog | Pending Additions | Pending Deletions
// Nothing here mutates state; moderation only happens through the gated API.

use anyhow::Result;
use building_catalog::{
    get_events_for_subject, list, BuildingView, CallerTimeZone, Collection, ListQuery, Listing,
    ModerationEvent, PendingDeletionView, SortDir, SortField,
};
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
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
use rusqlite::Connection;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Catalog,
    PendingAdditions,
    PendingDeletions,
}

impl Page {
    pub const ALL: [Page; 3] = [Page::Catalog, Page::PendingAdditions, Page::PendingDeletions];

    pub fn next(&self) -> Self {
        match self {
            Page::Catalog => Page::PendingAdditions,
            Page::PendingAdditions => Page::PendingDeletions,
            Page::PendingDeletions => Page::Catalog,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Catalog => Page::PendingDeletions,
            Page::PendingAdditions => Page::Catalog,
            Page::PendingDeletions => Page::PendingAdditions,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Catalog => "Catalog",
            Page::PendingAdditions => "Pending Additions",
            Page::PendingDeletions => "Pending Deletions",
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            Page::Catalog => Collection::Buildings,
            Page::PendingAdditions => Collection::PendingAdditions,
            Page::PendingDeletions => Collection::PendingDeletions,
        }
    }
}

pub struct App {
    conn: Connection,
    pub tz: CallerTimeZone,
    pub current_page: Page,
    pub sort_by: SortField,
    pub sort_dir: SortDir,
    pub listing: Listing,
    pub state: TableState,
    pub show_detail: bool,
    /// Audit trail of the selected building, newest first
    pub history: Vec<ModerationEvent>,
}

impl App {
    pub fn new(conn: Connection, tz: CallerTimeZone) -> Result<Self> {
        let mut app = Self {
            conn,
            tz,
            current_page: Page::Catalog,
            sort_by: SortField::Name,
            sort_dir: SortDir::Asc,
            listing: Listing::Buildings(Vec::new()),
            state: TableState::default(),
            show_detail: false,
            history: Vec::new(),
        };
        app.reload()?;
        Ok(app)
    }

    /// Re-run the listing for the current page and sort
    pub fn reload(&mut self) -> Result<()> {
        let query = ListQuery::new(self.sort_by, self.sort_dir);
        self.listing = list(&self.conn, self.current_page.collection(), &query, &self.tz)?;

        if self.listing.is_empty() {
            self.state.select(None);
        } else {
            self.state.select(Some(0));
        }
        self.load_history()
    }

    fn load_history(&mut self) -> Result<()> {
        self.history = match self.selected_id() {
            Some(id) => get_events_for_subject(&self.conn, &id)?,
            None => Vec::new(),
        };
        Ok(())
    }

    pub fn selected_id(&self) -> Option<String> {
        let i = self.state.selected()?;
        match &self.listing {
            Listing::Buildings(items) => items.get(i).map(|b| b.id.clone()),
            Listing::PendingDeletions(items) => items
                .get(i)
                .and_then(|d| d.building.as_ref())
                .map(|b| b.id.clone()),
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn next_page(&mut self) -> Result<()> {
        self.switch_page(self.current_page.next())
    }

    pub fn previous_page(&mut self) -> Result<()> {
        self.switch_page(self.current_page.previous())
    }

    fn switch_page(&mut self, page: Page) -> Result<()> {
        self.current_page = page;
        // lastUpdated and submittedDate are not shared between collections
        if !page.collection().sort_fields().contains(&self.sort_by) {
            self.sort_by = SortField::Name;
        }
        self.reload()
    }

    /// Advance to the next sort key the current collection accepts
    pub fn cycle_sort(&mut self) -> Result<()> {
        let fields = self.current_page.collection().sort_fields();
        let pos = fields.iter().position(|f| *f == self.sort_by).unwrap_or(0);
        self.sort_by = fields[(pos + 1) % fields.len()];
        self.reload()
    }

    pub fn toggle_direction(&mut self) -> Result<()> {
        self.sort_dir = match self.sort_dir {
            SortDir::Asc => SortDir::Desc,
            SortDir::Desc => SortDir::Asc,
        };
        self.reload()
    }

    fn select(&mut self, i: Option<usize>) -> Result<()> {
        self.state.select(i);
        self.load_history()
    }

    pub fn next(&mut self) -> Result<()> {
        let len = self.listing.len();
        if len == 0 {
            return Ok(());
        }
        let i = match self.state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        self.select(Some(i))
    }

    pub fn previous(&mut self) -> Result<()> {
        let len = self.listing.len();
        if len == 0 {
            return Ok(());
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.select(Some(i))
    }

    pub fn page_down(&mut self) -> Result<()> {
        let len = self.listing.len();
        if len == 0 {
            return Ok(());
        }
        let i = self.state.selected().map(|i| (i + 20).min(len - 1)).unwrap_or(0);
        self.select(Some(i))
    }

    pub fn page_up(&mut self) -> Result<()> {
        let i = self.state.selected().map(|i| i.saturating_sub(20)).unwrap_or(0);
        self.select(Some(i))
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
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

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page()?;
                    } else {
                        app.next_page()?;
                    }
                }
                KeyCode::BackTab => app.previous_page()?,
                KeyCode::Char('s') => app.cycle_sort()?,
                KeyCode::Char('d') => app.toggle_direction()?,
                KeyCode::Char('r') => app.reload()?,
                KeyCode::Down | KeyCode::Char('j') => app.next()?,
                KeyCode::Up | KeyCode::Char('k') => app.previous()?,
                KeyCode::PageDown => app.page_down()?,
                KeyCode::PageUp => app.page_up()?,
                KeyCode::Home => app.select(Some(0))?,
                KeyCode::End => {
                    if !app.listing.is_empty() {
                        app.select(Some(app.listing.len() - 1))?;
                    }
                }
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
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

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in Page::ALL.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Sort: {} {}", app.sort_by.as_str(), app.sort_dir.as_str()),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Rows: {}", app.listing.len()),
        Style::default().fg(Color::Green),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });
    Row::new(cells).style(Style::default().bg(Color::DarkGray)).height(1)
}

fn type_color(code: &str) -> Color {
    match code.chars().next() {
        Some('R') => Color::Green,
        Some('C') => Color::Cyan,
        Some('I') => Color::Yellow,
        _ => Color::White,
    }
}

fn building_row(b: &BuildingView) -> Row<'static> {
    let code = b.building_type.as_str();
    Row::new(vec![
        Cell::from(truncate(&b.name, 30)),
        Cell::from(b.occupancy.to_string()),
        Cell::from(code).style(Style::default().fg(type_color(code))),
        Cell::from(b.style.as_str()),
        Cell::from(b.last_updated.clone()),
    ])
    .height(1)
}

fn deletion_row(d: &PendingDeletionView) -> Row<'static> {
    match &d.building {
        Some(b) => {
            let code = b.building_type.as_str();
            Row::new(vec![
                Cell::from(truncate(&d.name, 30)),
                Cell::from(b.occupancy.to_string()),
                Cell::from(code).style(Style::default().fg(type_color(code))),
                Cell::from(d.submitted_date.clone()),
            ])
        }
        None => Row::new(vec![
            Cell::from(truncate(&d.name, 30)).style(Style::default().fg(Color::Red)),
            Cell::from("-"),
            Cell::from("missing").style(Style::default().fg(Color::Red)),
            Cell::from(d.submitted_date.clone()),
        ]),
    }
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let title = format!(" {} ", app.current_page.title());

    let (header, rows, widths): (Row, Vec<Row>, Vec<Constraint>) = match &app.listing {
        Listing::Buildings(items) => (
            header_row(&["Name", "Occupancy", "Type", "Style", "Last Updated"]),
            items.iter().map(building_row).collect(),
            vec![
                Constraint::Length(32),
                Constraint::Length(10),
                Constraint::Length(8),
                Constraint::Length(18),
                Constraint::Length(24),
            ],
        ),
        Listing::PendingDeletions(items) => (
            header_row(&["Name", "Occupancy", "Type", "Submitted"]),
            items.iter().map(deletion_row).collect(),
            vec![
                Constraint::Length(32),
                Constraint::Length(10),
                Constraint::Length(8),
                Constraint::Length(24),
            ],
        ),
    };

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(title),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));

    let status_spans = vec![
        Span::styled(
            format!(" Row: {}/{} ", selected, app.listing.len()),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw(" | "),
        key("Enter"),
        Span::raw(" Details | "),
        key("Tab"),
        Span::raw(" Page | "),
        key("s"),
        Span::raw(" Sort | "),
        key("d"),
        Span::raw(" Direction | "),
        key("r"),
        Span::raw(" Reload | "),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" Quit"),
    ];

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len - 3).collect::<String>())
    }
}

fn field_line(label: &'static str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("  {}: ", label),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(value),
    ])
}

fn section_line(title: &'static str) -> Line<'static> {
    Line::from(vec![Span::styled(
        format!("  {}", title),
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
    )])
}

fn building_lines(b: &BuildingView) -> Vec<Line<'static>> {
    let image = match &b.image {
        Some(img) if !img.is_empty() => format!("{} bytes (base64)", img.len()),
        Some(_) => "none".to_string(),
        None => "not listed".to_string(),
    };

    vec![
        field_line("Id", b.id.clone()),
        field_line("Name", b.name.clone()),
        field_line("Occupancy", b.occupancy.to_string()),
        field_line("Type", b.building_type.as_str().to_string()),
        field_line(
            "Tiles",
            b.tiles.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", "),
        ),
        field_line("Style", b.style.as_str().to_string()),
        field_line("Last Updated", b.last_updated.clone()),
        field_line("Image", image),
    ]
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected();
    let mut content = vec![Line::from("")];

    match (&app.listing, selected) {
        (Listing::Buildings(items), Some(i)) if i < items.len() => {
            content.extend(building_lines(&items[i]));
        }
        (Listing::PendingDeletions(items), Some(i)) if i < items.len() => {
            let d = &items[i];
            content.push(field_line("Submitted", d.submitted_date.clone()));
            content.push(Line::from(""));
            match &d.building {
                Some(b) => content.extend(building_lines(b)),
                None => content.push(Line::from(Span::styled(
                    "  Referenced building no longer exists",
                    Style::default().fg(Color::Red),
                ))),
            }
        }
        _ => content.push(Line::from("  Nothing selected")),
    }

    content.push(Line::from(""));
    content.push(Line::from("  ─────────────────────────────────────"));
    content.push(Line::from(""));
    content.push(section_line("HISTORY"));
    content.push(Line::from(""));
    if app.history.is_empty() {
        content.push(Line::from("  (no events)"));
    }
    for event in app.history.iter().take(10) {
        content.push(Line::from(vec![
            Span::styled(
                format!("  {} ", app.tz.render(event.timestamp)),
                Style::default().fg(Color::DarkGray),
            ),
            Span::styled(event.kind.as_str(), Style::default().fg(Color::Green)),
            Span::raw(format!(" by {}", event.actor)),
        ]));
    }

    content.push(Line::from(""));
    content.push(Line::from(Span::styled(
        "  Press Enter to close",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )));

    let detail_panel = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Details "),
    );

    f.render_widget(detail_panel, area);
}

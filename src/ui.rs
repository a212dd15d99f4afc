use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, MouseEvent, MouseEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::{wrap, Options as WrapOptions};
use unicode_width::UnicodeWidthStr;

use crate::feed::{FeedLoader, FeedStatus};
use crate::listing::{ProductCard, ProductList, SortKey};
use crate::scroll::{MouseCapture, ScrollObserver, Viewport};

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_INPUT_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_WARNING: Color = Color::Rgb(249, 226, 175);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const CARD_INDENT: &str = "  ";
const MIN_CARD_WIDTH: usize = 16;
const LOADING_ROW_HEIGHT: usize = 1;
const INPUT_PLACEHOLDER_WIDTH: usize = 14;

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

fn grade_color(grade: &str) -> Color {
    match grade.to_ascii_lowercase().as_str() {
        "a" | "b" => COLOR_SUCCESS,
        "c" => COLOR_WARNING,
        "d" | "e" => COLOR_ERROR,
        _ => COLOR_TEXT_SECONDARY,
    }
}

fn wrap_indented(text: &str, width: usize, style: Style) -> Vec<Line<'static>> {
    let options = WrapOptions::new(width)
        .initial_indent(CARD_INDENT)
        .subsequent_indent(CARD_INDENT);
    wrap(text, options)
        .into_iter()
        .map(|line| Line::from(Span::styled(line.into_owned(), style)))
        .collect()
}

/// Rows drawn for one product card, separator included.
fn card_lines(card: &ProductCard, width: usize) -> Vec<Line<'static>> {
    let width = width.max(MIN_CARD_WIDTH);
    let label = Style::default()
        .fg(COLOR_TEXT_SECONDARY)
        .add_modifier(Modifier::BOLD);
    let body = Style::default().fg(COLOR_TEXT_PRIMARY);

    let mut lines = Vec::new();
    lines.extend(
        wrap(&card.name, width)
            .into_iter()
            .map(|line| {
                Line::from(Span::styled(
                    line.into_owned(),
                    Style::default()
                        .fg(COLOR_ACCENT)
                        .add_modifier(Modifier::BOLD),
                ))
            }),
    );
    lines.extend(wrap_indented(
        &format!("Image: {}", card.image),
        width,
        Style::default()
            .fg(COLOR_TEXT_SECONDARY)
            .add_modifier(Modifier::ITALIC),
    ));
    lines.push(Line::from(Span::styled("Categories:", label)));
    lines.extend(wrap_indented(&card.categories, width, body));
    lines.push(Line::from(Span::styled("Ingredients:", label)));
    lines.extend(wrap_indented(&card.ingredients, width, body));
    lines.push(Line::from(vec![
        Span::styled("Nutrition Grade: ", label),
        Span::styled(
            card.grade.clone(),
            Style::default()
                .fg(grade_color(&card.grade))
                .add_modifier(Modifier::BOLD),
        ),
    ]));
    lines.push(Line::from(Span::styled(
        "─".repeat(width),
        Style::default().fg(COLOR_BORDER_IDLE),
    )));
    lines
}

fn line_width(line: &Line<'_>) -> usize {
    line.spans
        .iter()
        .map(|span| UnicodeWidthStr::width(span.content.as_ref()))
        .sum()
}

fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

pub struct Options {
    pub loader: FeedLoader,
    pub sort: SortKey,
    pub scroll_debounce: Duration,
    pub scroll_threshold: usize,
    pub source_label: String,
}

pub struct Model {
    loader: FeedLoader,
    list: ProductList,
    observer: ScrollObserver,
    source_label: String,
    status_message: String,
    scroll: usize,
    list_height: usize,
    rendered: Vec<Line<'static>>,
    card_starts: Vec<usize>,
    rendered_for: Option<(u64, SortKey, usize)>,
    needs_redraw: bool,
    spinner: Spinner,
}

impl Model {
    pub fn new(opts: Options) -> Self {
        let mut model = Self {
            loader: opts.loader,
            list: ProductList::new(opts.sort),
            observer: ScrollObserver::new(opts.scroll_debounce, opts.scroll_threshold),
            status_message: format!("Loading products from {}...", opts.source_label),
            source_label: opts.source_label,
            scroll: 0,
            list_height: 0,
            rendered: Vec::new(),
            card_starts: Vec::new(),
            rendered_for: None,
            needs_redraw: true,
            spinner: Spinner::new(),
        };
        model.loader.start();
        model.list.refresh(model.loader.state());
        model
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let capture = MouseCapture::acquire(io::stdout())?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        self.observer.cancel();
        self.loader.shutdown();
        drop(capture);
        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.sync() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let now = Instant::now();
            let mut timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));
            if let Some(due) = self.observer.time_until_ready(now) {
                timeout = timeout.min(due);
            }

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                self.status_message = format!("Error: {}", err);
                                self.mark_dirty();
                            }
                        }
                    }
                    Event::Mouse(mouse) => self.handle_mouse(mouse),
                    Event::Resize(_, _) => self.mark_dirty(),
                    _ => {}
                }
            }

            self.check_scroll(Instant::now());

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.is_loading() {
                    if self.spinner.advance() {
                        self.mark_dirty();
                    }
                } else {
                    self.spinner.reset();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn is_loading(&self) -> bool {
        self.loader.state().in_flight()
    }

    /// Applies delivered pages and refreshes the sorted view.
    fn sync(&mut self) -> bool {
        let loaded = self.loader.poll();
        let resorted = self.list.refresh(self.loader.state());
        if loaded {
            self.refresh_status();
        }
        loaded || resorted
    }

    fn refresh_status(&mut self) {
        let state = self.loader.state();
        let catalog = state
            .catalog_size()
            .map(|size| format!(", {size} in catalog"))
            .unwrap_or_default();
        self.status_message = match self.loader.status() {
            FeedStatus::Idle => "Idle.".to_string(),
            FeedStatus::LoadingFirstPage => {
                format!("Loading products from {}...", self.source_label)
            }
            FeedStatus::Failed(message) => format!("Failed to load products: {message}"),
            FeedStatus::Ready if state.exhausted() => format!(
                "{} of {} products shown from {}. End of catalog.",
                self.list.len(),
                state.records().len(),
                self.source_label
            ),
            FeedStatus::Ready => format!(
                "{} of {} products shown from {} (page {}{}).",
                self.list.len(),
                state.records().len(),
                self.source_label,
                state.page(),
                catalog
            ),
        };
    }

    fn content_height(&self) -> usize {
        let trailer = if self.loader.is_fetching_more() {
            LOADING_ROW_HEIGHT
        } else {
            0
        };
        self.rendered.len() + trailer
    }

    fn viewport(&self) -> Viewport {
        Viewport {
            height: self.list_height,
            offset: self.scroll,
            content_height: self.content_height(),
        }
    }

    fn scroll_by(&mut self, delta: isize, now: Instant) {
        let max = self.viewport().max_offset();
        let target = if delta.is_negative() {
            self.scroll.saturating_sub(delta.unsigned_abs())
        } else {
            self.scroll.saturating_add(delta as usize)
        };
        self.scroll = target.min(max);
        self.observer.on_scroll(now);
        self.mark_dirty();
    }

    fn scroll_to(&mut self, offset: usize, now: Instant) {
        self.scroll = offset.min(self.viewport().max_offset());
        self.observer.on_scroll(now);
        self.mark_dirty();
    }

    fn page_step(&self) -> isize {
        self.list_height.saturating_sub(1).max(1) as isize
    }

    /// Debounced near-bottom check; advances the feed when it fires.
    fn check_scroll(&mut self, now: Instant) {
        if !self.observer.poll(now, self.viewport()) {
            return;
        }
        if self.loader.advance_page() {
            self.status_message = format!(
                "Loading page {} from {}...",
                self.loader.state().page(),
                self.source_label
            );
            self.spinner.reset();
            self.mark_dirty();
        }
    }

    fn set_sort(&mut self, key: SortKey) {
        if self.list.set_sort_key(key) {
            self.list.refresh(self.loader.state());
            self.status_message = format!("Sorted by {}.", key.label());
            self.mark_dirty();
        }
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        let now = Instant::now();
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
            KeyCode::Char('j') | KeyCode::Down => self.scroll_by(1, now),
            KeyCode::Char('k') | KeyCode::Up => self.scroll_by(-1, now),
            KeyCode::PageDown | KeyCode::Char(' ') => self.scroll_by(self.page_step(), now),
            KeyCode::PageUp => self.scroll_by(-self.page_step(), now),
            KeyCode::Char('g') | KeyCode::Home => self.scroll_to(0, now),
            KeyCode::Char('G') | KeyCode::End => self.scroll_to(usize::MAX, now),
            KeyCode::Char('s') => self.set_sort(self.list.sort_key().next()),
            KeyCode::Char('S') => self.set_sort(self.list.sort_key().previous()),
            KeyCode::Char(digit @ '1'..='4') => {
                let index = digit as usize - '1' as usize;
                self.set_sort(SortKey::ALL[index]);
            }
            KeyCode::Char('o') => self.open_top_card()?,
            _ => {}
        }
        Ok(false)
    }

    fn handle_mouse(&mut self, event: MouseEvent) {
        let now = Instant::now();
        match event.kind {
            MouseEventKind::ScrollDown => self.scroll_by(3, now),
            MouseEventKind::ScrollUp => self.scroll_by(-3, now),
            _ => {}
        }
    }

    fn top_card_index(&self) -> Option<usize> {
        if self.card_starts.is_empty() {
            return None;
        }
        let position = self
            .card_starts
            .partition_point(|start| *start <= self.scroll)
            .saturating_sub(1);
        self.list.projection().get(position).copied()
    }

    fn open_top_card(&mut self) -> Result<()> {
        let Some(index) = self.top_card_index() else {
            self.status_message = "No product to open.".to_string();
            self.mark_dirty();
            return Ok(());
        };
        let Some(product) = self.loader.state().records().get(index) else {
            return Ok(());
        };
        let name = product.display_name().unwrap_or_default().to_string();
        match product.page_url() {
            Some(url) => {
                webbrowser::open(&url)?;
                tracing::info!(%url, "opened product page");
                self.status_message = format!("Opened {name} in browser.");
            }
            None => {
                self.status_message = format!("{name} has no product page.");
            }
        }
        self.mark_dirty();
        Ok(())
    }

    fn ensure_rendered(&mut self, width: usize) {
        let stamp = (
            self.loader.state().revision(),
            self.list.sort_key(),
            width,
        );
        if self.rendered_for == Some(stamp) {
            return;
        }
        self.rendered.clear();
        self.card_starts.clear();
        let state = self.loader.state();
        for product in self.list.products(state) {
            self.card_starts.push(self.rendered.len());
            let card = ProductCard::from_product(product);
            self.rendered.extend(card_lines(&card, width));
        }
        self.rendered_for = Some(stamp);
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        let status_text = if self.is_loading() {
            format!("{} {}", self.spinner.frame(), self.status_message)
                .trim()
                .to_string()
        } else {
            self.status_message.clone()
        };
        let status_line = Paragraph::new(status_text).style(
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .bg(COLOR_PANEL_FOCUSED_BG)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status_line, layout[0]);

        let navbar = Paragraph::new(navbar_line(self.list.sort_key(), layout[1].width as usize))
            .style(Style::default().bg(COLOR_PANEL_BG));
        frame.render_widget(navbar, layout[1]);

        self.draw_products(frame, layout[2]);

        let footer = Paragraph::new(footer_text())
            .style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(footer, layout[3]);
    }

    fn draw_products(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(COLOR_BORDER_IDLE))
            .title(format!(" Products · {} ", self.list.sort_key().label()))
            .style(Style::default().bg(COLOR_PANEL_BG));
        let inner = block.inner(area);
        frame.render_widget(block, area);
        self.list_height = inner.height as usize;

        match self.loader.status() {
            FeedStatus::Failed(message) => {
                let error = Paragraph::new(format!("Error: {message}"))
                    .style(Style::default().fg(COLOR_ERROR))
                    .wrap(Wrap { trim: true });
                frame.render_widget(error, inner);
                return;
            }
            FeedStatus::Idle | FeedStatus::LoadingFirstPage => {
                let spinner = Paragraph::new(format!(
                    "{} Loading products...",
                    self.spinner.frame()
                ))
                .style(
                    Style::default()
                        .fg(COLOR_ACCENT)
                        .add_modifier(Modifier::BOLD),
                )
                .alignment(Alignment::Center);
                frame.render_widget(spinner, centered_rect(60, 1, inner));
                return;
            }
            FeedStatus::Ready => {}
        }

        let width = inner.width.saturating_sub(1).max(1) as usize;
        self.ensure_rendered(width);
        self.scroll = self.scroll.min(self.viewport().max_offset());

        let height = inner.height as usize;
        let mut lines: Vec<Line<'static>> = self
            .rendered
            .iter()
            .skip(self.scroll)
            .take(height)
            .cloned()
            .collect();

        if self.rendered.is_empty() && !self.loader.is_fetching_more() {
            lines.push(Line::from(Span::styled(
                "No products to display.",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )));
        }

        if self.loader.is_fetching_more() && lines.len() < height {
            lines.push(Line::from(Span::styled(
                format!("{} Loading more products...", self.spinner.frame()),
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            )));
        }

        frame.render_widget(Paragraph::new(Text::from(lines)), inner);
    }
}

/// Top bar. The search inputs and the Sorting/Filter buttons are inert; only
/// the sort selector on the right responds (keys `s`, `S`, `1`-`4`).
fn navbar_line(sort: SortKey, width: usize) -> Line<'static> {
    let input = Style::default().fg(COLOR_TEXT_SECONDARY).bg(COLOR_INPUT_BG);
    let button = Style::default()
        .fg(COLOR_TEXT_PRIMARY)
        .bg(COLOR_BORDER_IDLE)
        .add_modifier(Modifier::BOLD);
    let gap = Style::default().bg(COLOR_PANEL_BG);
    let field = " ".repeat(INPUT_PLACEHOLDER_WIDTH);

    let mut spans = vec![
        Span::styled(" ", gap),
        Span::styled(field.clone(), input),
        Span::styled(" search ", button),
        Span::styled("  ", gap),
        Span::styled(field, input),
        Span::styled(" barcode search ", button),
        Span::styled("  ", gap),
        Span::styled(" Sorting ", button),
        Span::styled(" ", gap),
        Span::styled(" Filter ", button),
    ];

    let selector = Span::styled(
        format!(" Sort: {} ", sort.label()),
        Style::default()
            .fg(COLOR_ACCENT)
            .bg(COLOR_PANEL_FOCUSED_BG)
            .add_modifier(Modifier::BOLD),
    );
    let used = line_width(&Line::from(spans.clone()));
    let selector_width = UnicodeWidthStr::width(selector.content.as_ref());
    if used + selector_width < width {
        spans.push(Span::styled(" ".repeat(width - used - selector_width), gap));
    } else {
        spans.push(Span::styled(" ", gap));
    }
    spans.push(selector);
    Line::from(spans)
}

fn footer_text() -> String {
    "j/k scroll · PgUp/PgDn page · g/G top/bottom · s/S or 1-4 sort · o open · q quit".to_string()
}

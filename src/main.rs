mod audio;
mod playback;
mod post;
mod visualizers;

use std::{env, fs, io, time::Duration};

use anyhow::{Context as _, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::info;
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use audio::analyser::Analyser;
use audio::engine::{AudioEngine, MediaEvent, MediaEventKind, TrackHandle};
use playback::{BeadId, BeadState, Coordinator};
use post::Post;
use visualizers::{Visualizer, pie::PieChartVisualizer, spectrum::SpectrumVisualizer};

const SEEK_STEP_PERCENT: f64 = 5.0;

enum Panel {
    Spectrum,
    Poll,
}

struct App {
    post: Post,
    coordinator: Coordinator<TrackHandle>,
    engine: AudioEngine,
    spectrum: SpectrumVisualizer,
    pie: Option<PieChartVisualizer>,
    /// Bead the spectrum is currently attached to.
    attached: Option<BeadId>,
    selected: BeadId,
    panel: Panel,
}

impl App {
    fn seek_by(&mut self, delta: f64) {
        if let Some(view) = self.coordinator.view(self.selected) {
            let Some(duration) = view.duration else {
                return;
            };
            if duration > 0.0 {
                let percent = view.position / duration * 100.0;
                self.coordinator.seek(self.selected, percent + delta);
            }
        }
    }

    /// Track indices equal bead ids: tracks are registered in bead order.
    fn apply_media_event(&mut self, event: MediaEvent) {
        match event.kind {
            MediaEventKind::LoadedMetadata => {}
            MediaEventKind::Progress(ranges) => self.coordinator.on_progress(event.track, ranges),
            MediaEventKind::Ended => self.coordinator.on_ended(event.track),
            MediaEventKind::Error(message) => log::warn!("bead {}: {}", event.track + 1, message),
        }
    }

    /// Keep the spectrum attached to whichever bead holds the session;
    /// detach (stopping all sampling) when the session goes idle.
    fn sync_spectrum(&mut self) {
        let active = self.coordinator.active();
        if active == self.attached {
            return;
        }
        match active {
            Some(id) => {
                let user = self
                    .post
                    .beads
                    .get(id)
                    .map(|b| b.user.as_str())
                    .unwrap_or("?");
                self.spectrum.attach(
                    Analyser::new(self.engine.tap()),
                    format!("bead {} · {}", id + 1, user),
                );
            }
            None => self.spectrum.detach(),
        }
        self.attached = active;
    }
}

fn main() -> Result<()> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Info);
    clog.init();

    // 1. Load the post payload
    let path = env::args()
        .nth(1)
        .context("usage: bead_player <post.json>")?;
    let raw = fs::read_to_string(&path).with_context(|| format!("failed to read {path}"))?;
    let post: Post = serde_json::from_str(&raw).context("malformed post payload")?;
    info!("loaded post {} ({} beads)", post.id, post.beads.len());

    // 2. Set up the engine and register every bead in collection order
    let engine = AudioEngine::new()?;
    let mut coordinator = Coordinator::new();
    for bead in &post.beads {
        let handle = engine.add_track(&bead.bead_url);
        coordinator.register(handle);
    }
    if coordinator.is_empty() {
        log::warn!("post {} has no beads to play", post.id);
    }
    let pie = post.poll.as_ref().map(PieChartVisualizer::new);

    let mut app = App {
        post,
        coordinator,
        engine,
        spectrum: SpectrumVisualizer::new(),
        pie,
        attached: None,
        selected: 0,
        panel: Panel::Spectrum,
    };

    // 3. Set up the terminal UI
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run(&mut terminal, &mut app);

    // 4. Cleanup
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    result
}

fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        if event::poll(Duration::from_millis(16))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => break,
                        KeyCode::Up => app.selected = app.selected.saturating_sub(1),
                        KeyCode::Down => {
                            if app.selected + 1 < app.coordinator.len() {
                                app.selected += 1;
                            }
                        }
                        KeyCode::Char(' ') | KeyCode::Enter => {
                            app.coordinator.request_toggle(app.selected)
                        }
                        KeyCode::Left => app.seek_by(-SEEK_STEP_PERCENT),
                        KeyCode::Right => app.seek_by(SEEK_STEP_PERCENT),
                        KeyCode::Tab => {
                            app.panel = match app.panel {
                                Panel::Spectrum => Panel::Poll,
                                Panel::Poll => Panel::Spectrum,
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        for media_event in app.engine.poll_events() {
            app.apply_media_event(media_event);
        }
        app.sync_spectrum();

        terminal.draw(|f| draw(f, app))?;
    }
    Ok(())
}

fn draw(f: &mut Frame, app: &mut App) {
    let rows = app.post.beads.len().max(1) as u16 + 2;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(rows), Constraint::Min(0)])
        .split(f.area());

    draw_beads(f, chunks[0], app);

    match app.panel {
        Panel::Spectrum => app.spectrum.draw(f, chunks[1]),
        Panel::Poll => match app.pie.as_mut() {
            Some(pie) => pie.draw(f, chunks[1]),
            None => {
                let empty = Paragraph::new("this post has no poll").block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title(" Poll Results "),
                );
                f.render_widget(empty, chunks[1]);
            }
        },
    }
}

fn draw_beads(f: &mut Frame, area: Rect, app: &App) {
    let bar_width = area.width.saturating_sub(40) as usize;
    let mut lines = Vec::with_capacity(app.post.beads.len());
    for (id, bead) in app.post.beads.iter().enumerate() {
        let Some(view) = app.coordinator.view(id) else {
            continue;
        };
        let glyph = if view.duration.is_none() {
            "…" // metadata not loaded yet, or the source failed
        } else {
            match view.state {
                BeadState::Playing => "▶",
                BeadState::Paused => "⏸",
                BeadState::Idle => "·",
            }
        };
        let marker = if id == app.selected { ">" } else { " " };
        let name_style = if view.state == BeadState::Playing {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };

        let mut spans = vec![
            Span::raw(format!("{marker} {glyph} ")),
            Span::styled(format!("{:<12}", truncate(&bead.user, 12)), name_style),
            Span::raw(" "),
        ];
        spans.extend(progress_spans(
            bar_width,
            view.played_percent,
            view.buffered_percent,
        ));
        spans.push(Span::raw(format!(
            " {} / {}",
            view.current_time, view.total_time
        )));
        lines.push(Line::from(spans));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", app.post.title));
    f.render_widget(Paragraph::new(lines).block(block), area);
}

/// Layered progress bar: played over buffered over the empty track, the
/// same three layers the web slider stacks.
fn progress_spans(width: usize, played_percent: f64, buffered_percent: f64) -> Vec<Span<'static>> {
    let played = ((width as f64 * played_percent / 100.0).round() as usize).min(width);
    let buffered = ((width as f64 * buffered_percent / 100.0).round() as usize)
        .clamp(played, width);
    vec![
        Span::styled("█".repeat(played), Style::default().fg(Color::Cyan)),
        Span::styled(
            "▒".repeat(buffered - played),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled("─".repeat(width - buffered), Style::default().fg(Color::Black)),
    ]
}

fn truncate(s: &str, max_chars: usize) -> &str {
    s.char_indices()
        .nth(max_chars)
        .map(|(i, _)| &s[..i])
        .unwrap_or(s)
}

use std::ffi::OsStr;
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{execute, ExecutableCommand};
use notify::{Config as WatchConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::prelude::{Color, Rect, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::block::Padding;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Terminal;
use tracing_subscriber::EnvFilter;

use livemd::{
    Appearance, Applied, BlockRenderer, Config, LiveDocument, RenderedBlock, Strategy,
    SyntaxCatalog, SyntectTheme,
};

fn system_open<S: AsRef<OsStr>>(arg: S) -> Result<()> {
    #[cfg(target_os = "macos")]
    let status = Command::new("open").arg(arg).status()?;

    #[cfg(all(unix, not(target_os = "macos")))]
    let status = Command::new("xdg-open").arg(arg).status()?;

    #[cfg(target_os = "windows")]
    let status = Command::new("cmd")
        .args(["/C", "start", ""])
        .arg(arg)
        .status()?;

    if !status.success() {
        return Err(anyhow!("system open command failed with status {status}"));
    }
    Ok(())
}

fn inset_rect(area: Rect, horizontal: u16, vertical: u16) -> Rect {
    let x = area.x.saturating_add(horizontal);
    let y = area.y.saturating_add(vertical);
    let width = area.width.saturating_sub(horizontal.saturating_mul(2));
    let height = area.height.saturating_sub(vertical.saturating_mul(2));
    Rect {
        x,
        y,
        width,
        height,
    }
}

fn usize_to_u16_saturating(value: usize) -> u16 {
    match u16::try_from(value) {
        Ok(v) => v,
        Err(_) => u16::MAX,
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AppearanceArg {
    Light,
    Dark,
}

impl From<AppearanceArg> for Appearance {
    fn from(arg: AppearanceArg) -> Self {
        match arg {
            AppearanceArg::Light => Appearance::Light,
            AppearanceArg::Dark => Appearance::Dark,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "livemd",
    version,
    about = "Render markdown incrementally as it is written"
)]
struct Cli {
    /// Markdown file path. Use '-' to read from stdin.
    input: Option<String>,

    /// Force interactive pager mode.
    #[arg(short, long)]
    interactive: bool,

    /// Force plain stdout rendering.
    #[arg(long)]
    plain: bool,

    /// Reload when the file changes (file input only).
    #[arg(long)]
    watch: bool,

    /// Color scheme for code and inline code.
    #[arg(long, value_enum, default_value = "dark")]
    appearance: AppearanceArg,

    /// Syntax theme used in light appearance.
    #[arg(long, default_value = livemd::config::DEFAULT_LIGHT_THEME)]
    light_theme: String,

    /// Syntax theme used in dark appearance.
    #[arg(long, default_value = livemd::config::DEFAULT_DARK_THEME)]
    dark_theme: String,

    /// Feed the input through the renderer N characters at a time, as a
    /// streaming source would, and report block reuse on stderr.
    #[arg(long, value_name = "N")]
    stream: Option<usize>,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            appearance: self.appearance.into(),
            light_theme: self.light_theme.clone(),
            dark_theme: self.dark_theme.clone(),
        }
    }
}

struct FileWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
}

#[derive(Clone)]
struct LoadResult {
    path: Option<PathBuf>,
    source: String,
}

enum InputSource {
    File(PathBuf),
    Stdin,
}

fn detect_input(cli: &Cli) -> Result<InputSource> {
    match cli.input.as_deref() {
        Some("-") => Ok(InputSource::Stdin),
        Some(path) => Ok(InputSource::File(PathBuf::from(path))),
        None => {
            if io::stdin().is_terminal() {
                Err(anyhow!(
                    "No input provided. Pass a markdown file or pipe markdown into stdin."
                ))
            } else {
                Ok(InputSource::Stdin)
            }
        }
    }
}

fn read_input(source: &InputSource) -> Result<LoadResult> {
    match source {
        InputSource::File(path) => {
            let source = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(LoadResult {
                path: Some(path.clone()),
                source,
            })
        }
        InputSource::Stdin => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read markdown from stdin")?;
            Ok(LoadResult {
                path: None,
                source: buf,
            })
        }
    }
}

fn is_tty_stdout() -> bool {
    io::stdout().is_terminal()
}

fn default_interactive(input: &InputSource) -> bool {
    matches!(input, InputSource::File(_)) && is_tty_stdout()
}

fn stream_offsets(source: &str, chunk: usize) -> Vec<usize> {
    let chunk = chunk.max(1);
    let mut offsets: Vec<usize> = source
        .char_indices()
        .map(|(idx, _)| idx)
        .skip(chunk)
        .step_by(chunk)
        .collect();
    offsets.push(source.len());
    offsets
}

#[derive(Debug, Default)]
struct StreamStats {
    updates: usize,
    created: usize,
    reused: usize,
    fast_path: usize,
}

impl StreamStats {
    fn record(&mut self, applied: &Applied) {
        self.updates += 1;
        self.created += applied.created;
        self.reused += applied.reused();
        if matches!(applied.strategy, Strategy::SafeBoundary { .. }) {
            self.fast_path += 1;
        }
    }
}

fn stream_into(
    live: &mut LiveDocument<BlockRenderer<'_>>,
    source: &str,
    chunk: usize,
) -> Result<StreamStats> {
    let mut stats = StreamStats::default();
    for end in stream_offsets(source, chunk) {
        let applied = live.update(&source[..end])?;
        tracing::debug!(
            revision = applied.revision,
            created = applied.created,
            reused = applied.reused(),
            "streamed chunk"
        );
        stats.record(&applied);
    }
    Ok(stats)
}

fn plain_render(blocks: &[Rc<RenderedBlock>]) -> String {
    blocks
        .iter()
        .map(|block| block.plain())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct LinkRef {
    label: String,
    target: String,
    line: usize,
}

/// Links in pager line coordinates, where blocks are separated by one blank line.
fn collect_links(blocks: &[Rc<RenderedBlock>]) -> Vec<LinkRef> {
    let mut links = Vec::new();
    let mut offset = 0;
    for (idx, block) in blocks.iter().enumerate() {
        if idx > 0 {
            offset += 1;
        }
        links.extend(block.links().map(|(line, link)| LinkRef {
            label: link.label.clone(),
            target: link.url.clone(),
            line: offset + line,
        }));
        offset += block.lines.len();
    }
    links
}

#[derive(Debug, PartialEq, Eq)]
enum LinkAction {
    Url(String),
    Path(PathBuf),
    Anchor(String),
}

fn classify_link(target: &str, current_doc: Option<&Path>) -> LinkAction {
    if target.starts_with('#') {
        return LinkAction::Anchor(target.to_string());
    }

    let has_scheme = target.split_once(':').is_some_and(|(scheme, _)| {
        scheme.len() > 1 && scheme.chars().all(|c| c.is_ascii_alphabetic())
    });
    if has_scheme {
        return LinkAction::Url(target.to_string());
    }

    let path_part = target.split_once('#').map_or(target, |(path, _)| path);
    let path = PathBuf::from(path_part);
    if path.is_absolute() {
        return LinkAction::Path(path);
    }
    match current_doc.and_then(Path::parent) {
        Some(parent) => LinkAction::Path(parent.join(path)),
        None => LinkAction::Path(path),
    }
}

struct Themes {
    light: SyntectTheme,
    dark: SyntectTheme,
}

impl Themes {
    fn load(catalog: &SyntaxCatalog, config: &Config) -> Result<Self> {
        let load = |appearance: Appearance| {
            let name = config.theme_for(appearance);
            catalog.theme(name).with_context(|| {
                let known: Vec<&str> = catalog.theme_names().collect();
                format!("Available themes: {}", known.join(", "))
            })
        };
        Ok(Self {
            light: load(Appearance::Light)?,
            dark: load(Appearance::Dark)?,
        })
    }

    fn get(&self, appearance: Appearance) -> &SyntectTheme {
        match appearance {
            Appearance::Light => &self.light,
            Appearance::Dark => &self.dark,
        }
    }
}

struct App<'a> {
    cli: Cli,
    themes: &'a Themes,
    live: LiveDocument<BlockRenderer<'a>>,
    path: Option<PathBuf>,
    source: String,

    scroll: u16,
    viewport_height: u16,
    links: Vec<LinkRef>,
    selected_link: Option<usize>,
    status: String,

    watcher: Option<FileWatcher>,
    watch_requested: bool,
}

impl<'a> App<'a> {
    fn new(
        cli: Cli,
        load: LoadResult,
        live: LiveDocument<BlockRenderer<'a>>,
        themes: &'a Themes,
    ) -> Self {
        let links = collect_links(live.nodes());
        let selected_link = if links.is_empty() { None } else { Some(0) };
        Self {
            cli,
            themes,
            live,
            path: load.path,
            source: load.source,
            scroll: 0,
            viewport_height: 1,
            links,
            selected_link,
            status: String::new(),
            watcher: None,
            watch_requested: false,
        }
    }

    fn lines(&self) -> Vec<Line<'static>> {
        let selected_link_line = self.selected_link_line();
        let mut lines = Vec::new();
        for (idx, block) in self.live.nodes().iter().enumerate() {
            if idx > 0 {
                lines.push(Line::raw(""));
            }
            for line in &block.lines {
                if selected_link_line != Some(lines.len()) || line.segments.is_empty() {
                    lines.push(line.to_line());
                    continue;
                }
                let spans: Vec<Span<'static>> = line
                    .segments
                    .iter()
                    .map(|segment| {
                        let style = segment.style.bg(Color::Blue).fg(Color::White);
                        Span::styled(segment.text.clone(), style)
                    })
                    .collect();
                lines.push(Line::from(spans));
            }
        }
        lines
    }

    fn selected_link_line(&self) -> Option<usize> {
        self.selected_link
            .and_then(|idx| self.links.get(idx))
            .map(|link| link.line)
    }

    fn cycle_link(&mut self, reverse: bool) {
        if self.links.is_empty() {
            self.selected_link = None;
            return;
        }

        let len = self.links.len();
        let idx = self.selected_link.unwrap_or(0);
        let next = if reverse {
            if idx == 0 {
                len - 1
            } else {
                idx - 1
            }
        } else {
            (idx + 1) % len
        };
        self.selected_link = Some(next);
        if let Some(line) = self.selected_link_line() {
            self.set_scroll(usize_to_u16_saturating(line));
        }
    }

    fn open_selected_link(&mut self) -> Result<()> {
        let Some(link) = self.selected_link.and_then(|idx| self.links.get(idx)).cloned() else {
            self.status = "No link selected".to_string();
            return Ok(());
        };

        match classify_link(&link.target, self.path.as_deref()) {
            LinkAction::Anchor(anchor) => {
                self.status = format!("Anchor links are not supported: {anchor}");
            }
            LinkAction::Url(url) => {
                system_open(&url).with_context(|| format!("Failed to open {url}"))?;
                self.status = format!("Opened {url}");
            }
            LinkAction::Path(path) => {
                system_open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
                self.status = format!("Opened {}", path.display());
            }
        }
        Ok(())
    }

    fn line_count(&self) -> usize {
        let blocks = self.live.nodes();
        let separators = blocks.len().saturating_sub(1);
        blocks.iter().map(|block| block.lines.len()).sum::<usize>() + separators
    }

    fn max_scroll(&self) -> u16 {
        let visible = self.viewport_height.max(1) as usize;
        usize_to_u16_saturating(self.line_count().saturating_sub(visible))
    }

    fn set_scroll(&mut self, scroll: u16) {
        self.scroll = scroll.min(self.max_scroll());
    }

    fn clamp_scroll(&mut self) {
        self.scroll = self.scroll.min(self.max_scroll());
    }

    fn apply_source(&mut self, source: String) -> Result<()> {
        let applied = self.live.update(source.as_str())?;
        self.source = source;
        self.links = collect_links(self.live.nodes());
        self.selected_link = match self.selected_link {
            _ if self.links.is_empty() => None,
            Some(idx) => Some(idx.min(self.links.len() - 1)),
            None => Some(0),
        };
        self.status = format!(
            "rev {} | built {} reused {}",
            applied.revision,
            applied.created,
            applied.reused()
        );
        self.clamp_scroll();
        Ok(())
    }

    fn reload_current(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };

        let source = fs::read_to_string(&path)
            .with_context(|| format!("Failed to reload {}", path.display()))?;
        self.apply_source(source)?;
        self.ensure_watcher()?;
        Ok(())
    }

    fn toggle_appearance(&mut self) -> Result<()> {
        let themes = self.themes;
        let appearance = self.live.materializer().appearance().toggled();
        let theme = themes.get(appearance);
        self.live.materializer_mut().set_theme(theme, appearance);
        self.live.invalidate();
        let source = std::mem::take(&mut self.source);
        self.apply_source(source)
    }

    fn ensure_watcher(&mut self) -> Result<()> {
        if !self.cli.watch {
            self.watcher = None;
            return Ok(());
        }

        let Some(path) = self.path.clone() else {
            self.watcher = None;
            return Ok(());
        };

        let (tx, rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            WatchConfig::default(),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;
        self.watcher = Some(FileWatcher {
            _watcher: watcher,
            rx,
        });
        Ok(())
    }

    fn poll_watch(&mut self) {
        if let Some(watcher) = self.watcher.as_mut() {
            while let Ok(event) = watcher.rx.try_recv() {
                if event.is_ok() {
                    self.watch_requested = true;
                }
            }
        }
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let root = inset_rect(frame.size(), 1, 0);
        let chunks = Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).split(root);
        let body = chunks[0];
        let status = inset_rect(chunks[1], 1, 0);

        self.viewport_height = body.height.saturating_sub(1).max(1);
        self.clamp_scroll();
        self.draw_content(frame, body);
        self.draw_status(frame, status);
    }

    fn draw_content(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let paragraph = Paragraph::new(Text::from(self.lines()))
            .block(
                Block::default()
                    .title(" livemd ")
                    .borders(Borders::TOP)
                    .border_style(Style::default().fg(Color::DarkGray))
                    .padding(Padding::new(1, 1, 0, 0)),
            )
            .scroll((self.scroll, 0))
            .wrap(Wrap { trim: false });

        frame.render_widget(paragraph, area);
    }

    fn draw_status(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let path = self
            .path
            .as_ref()
            .map_or_else(|| "<stdin>".to_string(), |p| p.display().to_string());

        let appearance = match self.live.materializer().appearance() {
            Appearance::Light => "light",
            Appearance::Dark => "dark",
        };
        let link_hint = self
            .selected_link
            .and_then(|idx| self.links.get(idx).map(|link| (idx, link)))
            .map_or_else(String::new, |(idx, link)| {
                format!(" | link[{}/{}]: {}", idx + 1, self.links.len(), link.label)
            });
        let watch_hint = if self.cli.watch { " watch:on" } else { "" };

        let status_text = if self.status.is_empty() {
            format!("{path} | {appearance}{watch_hint}{link_hint}")
        } else {
            format!("{path} | {appearance}{watch_hint}{link_hint} | {}", self.status)
        };

        frame.render_widget(
            Paragraph::new(format!(" {status_text}")).style(Style::default().fg(Color::Gray)),
            area,
        );
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('j') | KeyCode::Down => {
                self.set_scroll(self.scroll.saturating_add(1));
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.set_scroll(self.scroll.saturating_sub(1));
            }
            KeyCode::Char('g') => {
                self.set_scroll(0);
            }
            KeyCode::Char('G') => {
                self.set_scroll(self.max_scroll());
            }
            KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                let delta = self.viewport_height.saturating_div(2).max(1);
                self.set_scroll(self.scroll.saturating_add(delta));
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                let delta = self.viewport_height.saturating_div(2).max(1);
                self.set_scroll(self.scroll.saturating_sub(delta));
            }
            KeyCode::Tab => {
                self.cycle_link(false);
            }
            KeyCode::BackTab => {
                self.cycle_link(true);
            }
            KeyCode::Enter => {
                self.open_selected_link()?;
            }
            KeyCode::Char('a') => {
                self.toggle_appearance()?;
            }
            KeyCode::Char('r') => {
                self.reload_current()?;
            }
            _ => {}
        }

        Ok(false)
    }
}

struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        io::stdout().execute(EnterAlternateScreen)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

fn run_interactive(mut app: App<'_>) -> Result<()> {
    let _guard = TerminalGuard::enter()?;
    app.ensure_watcher()?;

    let stdout = io::stdout();
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    loop {
        terminal.draw(|frame| app.draw(frame))?;

        if app.watch_requested {
            if let Err(err) = app.reload_current() {
                app.status = format!("Reload failed: {err:#}");
            }
            app.watch_requested = false;
        }

        app.poll_watch();

        if event::poll(Duration::from_millis(120))? {
            match event::read()? {
                CEvent::Key(key) if key.kind == KeyEventKind::Press => {
                    if app.handle_key(key)? {
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if cli.interactive && cli.plain {
        return Err(anyhow!("--interactive and --plain cannot be used together"));
    }

    let input = detect_input(&cli)?;
    if cli.watch && matches!(input, InputSource::Stdin) {
        return Err(anyhow!("--watch requires file input"));
    }

    let interactive = if cli.interactive {
        true
    } else if cli.plain {
        false
    } else {
        default_interactive(&input)
    };

    let load = read_input(&input)?;
    let config = cli.config();

    let catalog = SyntaxCatalog::load_defaults();
    let themes = Themes::load(&catalog, &config)?;
    let renderer = BlockRenderer::new(&catalog, themes.get(config.appearance), config.appearance);
    let mut live = LiveDocument::new(renderer);

    match cli.stream {
        Some(chunk) => {
            let stats = stream_into(&mut live, &load.source, chunk)?;
            eprintln!(
                "{} updates, {} blocks built, {} reused, {} via safe boundary",
                stats.updates, stats.created, stats.reused, stats.fast_path
            );
        }
        None => {
            live.update(load.source.as_str())?;
        }
    }

    if !interactive {
        println!("{}", plain_render(live.nodes()));
        return Ok(());
    }

    let app = App::new(cli, load, live, &themes);
    run_interactive(app)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_offsets_respect_char_boundaries() {
        let source = "aé b";
        let offsets = stream_offsets(source, 2);
        assert_eq!(offsets, vec![3, source.len()]);
        for offset in offsets {
            assert!(source.is_char_boundary(offset));
        }
    }

    #[test]
    fn stream_offsets_end_with_full_text() {
        assert_eq!(stream_offsets("", 4), vec![0]);
        assert_eq!(stream_offsets("abc", 0), vec![1, 2, 3]);
    }

    #[test]
    fn links_are_placed_on_pager_lines() {
        let catalog = SyntaxCatalog::load_defaults();
        let themes = Themes::load(&catalog, &Config::default()).unwrap();
        let renderer = BlockRenderer::new(&catalog, themes.get(Appearance::Dark), Appearance::Dark);
        let mut live = LiveDocument::new(renderer);
        live.update("# [Top](#top)\n\n- a\n- [b](b.md)\n\ntext [c](https://c.example)\n")
            .unwrap();

        let links = collect_links(live.nodes());
        let found: Vec<(usize, &str, &str)> = links
            .iter()
            .map(|link| (link.line, link.label.as_str(), link.target.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![
                (0, "Top", "#top"),
                (3, "b", "b.md"),
                (5, "c", "https://c.example"),
            ]
        );
    }

    #[test]
    fn classifies_link_targets() {
        let doc = Path::new("/notes/readme.md");
        assert_eq!(
            classify_link("https://example.com", Some(doc)),
            LinkAction::Url("https://example.com".to_string())
        );
        assert_eq!(
            classify_link("mailto:a@b.c", None),
            LinkAction::Url("mailto:a@b.c".to_string())
        );
        assert_eq!(
            classify_link("#usage", Some(doc)),
            LinkAction::Anchor("#usage".to_string())
        );
        assert_eq!(
            classify_link("guide.md#setup", Some(doc)),
            LinkAction::Path(PathBuf::from("/notes/guide.md"))
        );
        assert_eq!(
            classify_link("guide.md", None),
            LinkAction::Path(PathBuf::from("guide.md"))
        );
    }

    #[test]
    fn streaming_reuses_settled_blocks() {
        let catalog = SyntaxCatalog::load_defaults();
        let themes = Themes::load(&catalog, &Config::default()).unwrap();
        let renderer = BlockRenderer::new(&catalog, themes.get(Appearance::Dark), Appearance::Dark);
        let mut live = LiveDocument::new(renderer);

        let source = "# Title\n\nSome text here.\n\n```rust\nfn main() {}\n```\n\n- done\n";
        let stats = stream_into(&mut live, source, 3).unwrap();
        assert!(stats.fast_path > 0);
        assert!(stats.reused > 0);
        assert_eq!(live.nodes().len(), 4);

        let expected = livemd::Document::parse(source);
        assert_eq!(live.document().unwrap().blocks().len(), expected.blocks().len());
    }
}

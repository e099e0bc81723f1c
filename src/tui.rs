use std::{
    collections::HashMap,
    io,
    time::{Duration, Instant},
};

use anyhow::Result;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::warn;
use ratatui::{
    backend::CrosstermBackend,
    prelude::*,
    widgets::{Block, BorderType, Borders, List, ListItem, ListState, Padding, Paragraph, Wrap},
};
use tokio::{runtime::Handle, sync::mpsc};

use crate::{
    commands,
    config::config_path,
    models::{RunningProcessInfo, TrackedApp, UsbDeviceIdentity},
    state::AppSession,
    usb_matcher::UsbLinkState,
};

struct TerminalRestore;

impl Drop for TerminalRestore {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = execute!(stdout, LeaveAlternateScreen, cursor::Show);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Dashboard,
    AddPath,
    Rename,
    ProcessSearch,
}

/// Results of background work, drained once per frame.
#[derive(Debug)]
enum UiUpdate {
    RunStates { paths: Vec<String>, states: Vec<bool> },
    /// Listing for the filter text it was queried with.
    Processes {
        query: String,
        processes: Vec<RunningProcessInfo>,
    },
    DialogPaths(Vec<String>),
    Status(String),
    PollNow,
}

struct TuiState {
    mode: Mode,
    input: String,
    cursor: usize,
    apps: Vec<TrackedApp>,
    running: HashMap<String, bool>,
    list_state: ListState,
    processes: Vec<RunningProcessInfo>,
    process_list: ListState,
    autostart_enabled: bool,
    next_poll: Instant,
    poll_in_flight: bool,
    should_quit: bool,
    status_message: Option<String>,
    status_deadline: Option<Instant>,
}

impl TuiState {
    fn new(apps: Vec<TrackedApp>, autostart_enabled: bool) -> Self {
        let mut state = Self {
            mode: Mode::Dashboard,
            input: String::new(),
            cursor: 0,
            apps,
            running: HashMap::new(),
            list_state: ListState::default(),
            processes: Vec::new(),
            process_list: ListState::default(),
            autostart_enabled,
            next_poll: Instant::now(),
            poll_in_flight: false,
            should_quit: false,
            status_message: None,
            status_deadline: None,
        };
        reset_selection(&mut state.list_state, state.apps.len());
        state
    }

    fn selected_app(&self) -> Option<&TrackedApp> {
        self.list_state
            .selected()
            .and_then(|index| self.apps.get(index))
    }

    fn clear_input(&mut self) {
        self.input.clear();
        self.cursor = 0;
    }
}

/// Handles shared by every key handler.
struct Context {
    session: AppSession,
    runtime: Handle,
    tx: mpsc::UnboundedSender<UiUpdate>,
}

impl Context {
    fn spawn<F>(&self, work: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.runtime.spawn(work);
    }
}

const STATUS_MESSAGE_TTL: Duration = Duration::from_secs(3);

/// Runs the dashboard until the user quits. Blocks the calling thread; async
/// work is spawned onto `runtime`.
pub(crate) fn run_tui(session: AppSession, runtime: Handle) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let _restore = TerminalRestore;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let ctx = Context {
        session,
        runtime,
        tx,
    };
    let mut ui_state = TuiState::new(
        commands::tracked_apps(&ctx.session),
        commands::is_auto_start_enabled(&ctx.session),
    );

    loop {
        while let Ok(update) = rx.try_recv() {
            apply_update(&mut ui_state, update, &ctx);
        }
        maybe_poll(&mut ui_state, &ctx);

        terminal.draw(|frame| render_ui(frame, &mut ui_state, &ctx.session))?;

        if ui_state.should_quit {
            break;
        }

        if event::poll(Duration::from_millis(16))? {
            if let Event::Key(key) = event::read()? {
                handle_key_event(key, &mut ui_state, &ctx);
            }
        }
    }

    terminal.show_cursor()?;
    Ok(())
}

fn apply_update(ui_state: &mut TuiState, update: UiUpdate, ctx: &Context) {
    match update {
        UiUpdate::RunStates { paths, states } => {
            ui_state.running = paths.into_iter().zip(states).collect();
            ui_state.poll_in_flight = false;
            ui_state.next_poll = Instant::now() + ctx.session.config_snapshot().poll_interval();
        }
        UiUpdate::Processes { query, processes } => {
            apply_process_listing(ui_state, &query, processes);
        }
        UiUpdate::DialogPaths(paths) => {
            if paths.is_empty() {
                return;
            }
            add_paths(ui_state, ctx, paths);
        }
        UiUpdate::Status(message) => set_status_message(ui_state, message),
        UiUpdate::PollNow => ui_state.next_poll = Instant::now(),
    }
}

/// Replies for an older filter can arrive after newer ones; keep only the
/// listing that matches what is in the input box.
fn apply_process_listing(
    ui_state: &mut TuiState,
    query: &str,
    processes: Vec<RunningProcessInfo>,
) -> bool {
    if ui_state.mode != Mode::ProcessSearch || ui_state.input.trim() != query {
        return false;
    }
    ui_state.processes = processes;
    reset_selection(&mut ui_state.process_list, ui_state.processes.len());
    true
}

fn maybe_poll(ui_state: &mut TuiState, ctx: &Context) {
    if ui_state.poll_in_flight || Instant::now() < ui_state.next_poll {
        return;
    }
    ui_state.poll_in_flight = true;
    let paths: Vec<String> = ui_state.apps.iter().map(|app| app.path.clone()).collect();
    let session = ctx.session.clone();
    let tx = ctx.tx.clone();
    ctx.spawn(async move {
        let states = session.engine.run_states(&paths).await;
        let _ = tx.send(UiUpdate::RunStates { paths, states });
    });
}

fn handle_key_event(key: KeyEvent, ui_state: &mut TuiState, ctx: &Context) {
    if key.kind == KeyEventKind::Release {
        return;
    }

    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        ui_state.should_quit = true;
        return;
    }

    match ui_state.mode {
        Mode::Dashboard => handle_dashboard_key_event(key, ui_state, ctx),
        Mode::AddPath | Mode::Rename | Mode::ProcessSearch => {
            handle_input_key_event(key, ui_state, ctx)
        }
    }
}

fn handle_dashboard_key_event(key: KeyEvent, ui_state: &mut TuiState, ctx: &Context) {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('o') => open_settings_in_editor(ui_state, &ctx.session),
            KeyCode::Char('n') => move_selection(&mut ui_state.list_state, ui_state.apps.len(), 1),
            KeyCode::Char('p') => move_selection(&mut ui_state.list_state, ui_state.apps.len(), -1),
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => ui_state.should_quit = true,
        KeyCode::Up | KeyCode::Char('k') => {
            move_selection(&mut ui_state.list_state, ui_state.apps.len(), -1)
        }
        KeyCode::Down | KeyCode::Char('j') => {
            move_selection(&mut ui_state.list_state, ui_state.apps.len(), 1)
        }
        KeyCode::Enter | KeyCode::Char('s') => start_selected(ui_state, ctx),
        KeyCode::Char('x') => stop_selected(ui_state, ctx),
        KeyCode::Char('S') => {
            let session = ctx.session.clone();
            let tx = ctx.tx.clone();
            ctx.spawn(async move {
                commands::start_all(&session).await;
                let _ = tx.send(UiUpdate::Status("Started all apps.".into()));
                let _ = tx.send(UiUpdate::PollNow);
            });
        }
        KeyCode::Char('X') => {
            let session = ctx.session.clone();
            let tx = ctx.tx.clone();
            ctx.spawn(async move {
                commands::stop_all(&session).await;
                let _ = tx.send(UiUpdate::Status("Stopped all apps.".into()));
                let _ = tx.send(UiUpdate::PollNow);
            });
        }
        KeyCode::Char('a') => {
            ui_state.clear_input();
            ui_state.mode = Mode::AddPath;
        }
        KeyCode::Char('o') => {
            let tx = ctx.tx.clone();
            ctx.spawn(async move {
                match commands::open_file_selection_dialog().await {
                    Ok(paths) => {
                        let _ = tx.send(UiUpdate::DialogPaths(paths));
                    }
                    Err(err) => {
                        let _ = tx.send(UiUpdate::Status(format!("{err:#}")));
                    }
                }
            });
        }
        KeyCode::Char('p') => {
            ui_state.clear_input();
            ui_state.processes.clear();
            ui_state.mode = Mode::ProcessSearch;
            refresh_processes(ui_state, ctx);
        }
        KeyCode::Char('r') => {
            let Some(name) = ui_state.selected_app().map(|app| app.name.clone()) else {
                set_status_message(ui_state, "No app selected.");
                return;
            };
            ui_state.cursor = name.chars().count();
            ui_state.input = name;
            ui_state.mode = Mode::Rename;
        }
        KeyCode::Char('d') | KeyCode::Delete => remove_selected(ui_state, ctx),
        KeyCode::Char('u') => cycle_usb_device(ui_state, &ctx.session),
        KeyCode::Char('t') => toggle_autostart(ui_state, &ctx.session),
        KeyCode::F(5) => ui_state.next_poll = Instant::now(),
        _ => {}
    }
}

fn handle_input_key_event(key: KeyEvent, ui_state: &mut TuiState, ctx: &Context) {
    let searching = ui_state.mode == Mode::ProcessSearch;

    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('w') => {
                delete_prev_word(ui_state);
                if searching {
                    refresh_processes(ui_state, ctx);
                }
            }
            KeyCode::Char('n') if searching => {
                move_selection(&mut ui_state.process_list, ui_state.processes.len(), 1)
            }
            KeyCode::Char('p') if searching => {
                move_selection(&mut ui_state.process_list, ui_state.processes.len(), -1)
            }
            KeyCode::Left => move_cursor(ui_state, -1),
            KeyCode::Right => move_cursor(ui_state, 1),
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Esc => {
            ui_state.clear_input();
            ui_state.mode = Mode::Dashboard;
        }
        KeyCode::Enter => submit_input(ui_state, ctx),
        KeyCode::Up if searching => {
            move_selection(&mut ui_state.process_list, ui_state.processes.len(), -1)
        }
        KeyCode::Down if searching => {
            move_selection(&mut ui_state.process_list, ui_state.processes.len(), 1)
        }
        KeyCode::Home => ui_state.cursor = 0,
        KeyCode::End => ui_state.cursor = ui_state.input.chars().count(),
        KeyCode::Left => move_cursor(ui_state, -1),
        KeyCode::Right => move_cursor(ui_state, 1),
        KeyCode::Backspace => {
            if delete_char_before_cursor(ui_state) && searching {
                refresh_processes(ui_state, ctx);
            }
        }
        KeyCode::Delete => {
            if delete_char_at_cursor(ui_state) && searching {
                refresh_processes(ui_state, ctx);
            }
        }
        KeyCode::Char(ch) => {
            if !key.modifiers.contains(KeyModifiers::ALT) {
                insert_char(ui_state, ch);
                if searching {
                    refresh_processes(ui_state, ctx);
                }
            }
        }
        _ => {}
    }
}

fn submit_input(ui_state: &mut TuiState, ctx: &Context) {
    match ui_state.mode {
        Mode::AddPath => {
            let path = ui_state.input.trim().to_string();
            if !path.is_empty() {
                add_paths(ui_state, ctx, vec![path]);
            }
        }
        Mode::Rename => {
            let Some(path) = ui_state.selected_app().map(|app| app.path.clone()) else {
                return;
            };
            match commands::rename_app(&ctx.session, &path, &ui_state.input) {
                Ok(true) => reload_apps(ui_state, &ctx.session),
                Ok(false) => set_status_message(ui_state, "Name cannot be empty."),
                Err(err) => set_status_message(ui_state, format!("Failed to save: {err:#}")),
            }
        }
        Mode::ProcessSearch => {
            let Some(process) = ui_state
                .process_list
                .selected()
                .and_then(|index| ui_state.processes.get(index))
                .cloned()
            else {
                set_status_message(ui_state, "No process selected.");
                return;
            };
            add_paths(ui_state, ctx, vec![process.path]);
        }
        Mode::Dashboard => return,
    }
    ui_state.clear_input();
    ui_state.mode = Mode::Dashboard;
}

fn refresh_processes(ui_state: &TuiState, ctx: &Context) {
    let query = ui_state.input.trim().to_string();
    let session = ctx.session.clone();
    let tx = ctx.tx.clone();
    ctx.spawn(async move {
        let search = (!query.is_empty()).then_some(query.as_str());
        let processes = commands::list_running_processes(&session, search).await;
        let _ = tx.send(UiUpdate::Processes { query, processes });
    });
}

fn add_paths(ui_state: &mut TuiState, ctx: &Context, paths: Vec<String>) {
    match commands::add_apps(&ctx.session, &paths) {
        Ok(0) => set_status_message(ui_state, "Already tracked."),
        Ok(added) => {
            reload_apps(ui_state, &ctx.session);
            ui_state.next_poll = Instant::now();
            set_status_message(ui_state, format!("Added {added} app(s)."));
        }
        Err(err) => set_status_message(ui_state, format!("Failed to save: {err:#}")),
    }
}

fn reload_apps(ui_state: &mut TuiState, session: &AppSession) {
    let selected_path = ui_state.selected_app().map(|app| app.path.clone());
    ui_state.apps = commands::tracked_apps(session);
    let index = selected_path
        .and_then(|path| ui_state.apps.iter().position(|app| app.path == path));
    match index {
        Some(index) => ui_state.list_state.select(Some(index)),
        None => reset_selection(&mut ui_state.list_state, ui_state.apps.len()),
    }
}

fn start_selected(ui_state: &mut TuiState, ctx: &Context) {
    let Some(app) = ui_state.selected_app().cloned() else {
        set_status_message(ui_state, "No app selected.");
        return;
    };
    let session = ctx.session.clone();
    let tx = ctx.tx.clone();
    ctx.spawn(async move {
        commands::launch_app(&session, &[app.path]).await;
        let _ = tx.send(UiUpdate::Status(format!("Start requested: {}", app.name)));
        let _ = tx.send(UiUpdate::PollNow);
    });
}

fn stop_selected(ui_state: &mut TuiState, ctx: &Context) {
    let Some(app) = ui_state.selected_app().cloned() else {
        set_status_message(ui_state, "No app selected.");
        return;
    };
    let session = ctx.session.clone();
    let tx = ctx.tx.clone();
    ctx.spawn(async move {
        commands::stop_app(&session, &[app.path]).await;
        let _ = tx.send(UiUpdate::Status(format!("Stop requested: {}", app.name)));
        let _ = tx.send(UiUpdate::PollNow);
    });
}

fn remove_selected(ui_state: &mut TuiState, ctx: &Context) {
    let Some(app) = ui_state.selected_app().cloned() else {
        set_status_message(ui_state, "No app selected.");
        return;
    };
    match commands::remove_app(&ctx.session, &app.path) {
        Ok(_) => {
            ui_state.running.remove(&app.path);
            reload_apps(ui_state, &ctx.session);
            set_status_message(ui_state, format!("Removed {}", app.name));
        }
        Err(err) => set_status_message(ui_state, format!("Failed to save: {err:#}")),
    }
}

fn cycle_usb_device(ui_state: &mut TuiState, session: &AppSession) {
    let matcher = session.matcher_snapshot();
    let next = next_device(matcher.available(), matcher.selected());
    let label = next
        .as_ref()
        .map_or_else(|| "none".to_string(), UsbDeviceIdentity::label);
    match commands::select_usb_device(session, next) {
        Ok(_) => set_status_message(ui_state, format!("Trigger device: {label}")),
        Err(err) => set_status_message(ui_state, format!("Failed to save: {err:#}")),
    }
}

/// The device after `selected` in `available`, wrapping through "none".
fn next_device(
    available: &[UsbDeviceIdentity],
    selected: Option<&UsbDeviceIdentity>,
) -> Option<UsbDeviceIdentity> {
    let position = selected.and_then(|selected| {
        available
            .iter()
            .position(|device| device.matches(selected))
    });
    match position {
        Some(index) => available.get(index + 1).cloned(),
        None => available.first().cloned(),
    }
}

fn toggle_autostart(ui_state: &mut TuiState, session: &AppSession) {
    let enable = !ui_state.autostart_enabled;
    match commands::set_auto_start(session, enable) {
        Ok(()) => {
            ui_state.autostart_enabled = enable;
            let label = if enable { "enabled" } else { "disabled" };
            set_status_message(ui_state, format!("Start at login {label}."));
        }
        Err(err) => {
            warn!("autostart toggle failed: {err:#}");
            set_status_message(ui_state, format!("Autostart failed: {err:#}"));
        }
    }
}

fn open_settings_in_editor(ui_state: &mut TuiState, session: &AppSession) {
    if let Err(err) = session.config_snapshot().save() {
        set_status_message(ui_state, format!("Failed to save settings: {err:#}"));
        return;
    }
    let Some(path) = config_path() else {
        return;
    };

    if open::that(&path).is_err() {
        #[cfg(windows)]
        {
            let _ = std::process::Command::new("notepad").arg(&path).spawn();
        }
        #[cfg(not(windows))]
        set_status_message(ui_state, format!("Settings: {}", path.display()));
    }
}

fn reset_selection(list_state: &mut ListState, len: usize) {
    if len == 0 {
        list_state.select(None);
    } else {
        list_state.select(Some(0));
    }
}

fn move_selection(list_state: &mut ListState, len: usize, delta: isize) {
    if len == 0 {
        list_state.select(None);
        return;
    }

    let current = list_state.selected().unwrap_or(0);
    let next = if delta < 0 {
        if current == 0 {
            len - 1
        } else {
            current - 1
        }
    } else if current + 1 >= len {
        0
    } else {
        current + 1
    };

    list_state.select(Some(next));
}

fn move_cursor(ui_state: &mut TuiState, delta: isize) {
    let len = ui_state.input.chars().count();
    if delta < 0 {
        ui_state.cursor = ui_state.cursor.saturating_sub(1);
    } else if ui_state.cursor < len {
        ui_state.cursor += 1;
    }
}

fn insert_char(ui_state: &mut TuiState, ch: char) {
    let byte_index = char_to_byte_index(&ui_state.input, ui_state.cursor);
    ui_state.input.insert(byte_index, ch);
    ui_state.cursor += 1;
}

fn delete_char_before_cursor(ui_state: &mut TuiState) -> bool {
    if ui_state.cursor == 0 {
        return false;
    }
    let start = char_to_byte_index(&ui_state.input, ui_state.cursor - 1);
    let end = char_to_byte_index(&ui_state.input, ui_state.cursor);
    ui_state.input.replace_range(start..end, "");
    ui_state.cursor -= 1;
    true
}

fn delete_char_at_cursor(ui_state: &mut TuiState) -> bool {
    let len = ui_state.input.chars().count();
    if ui_state.cursor >= len {
        return false;
    }
    let start = char_to_byte_index(&ui_state.input, ui_state.cursor);
    let end = char_to_byte_index(&ui_state.input, ui_state.cursor + 1);
    ui_state.input.replace_range(start..end, "");
    true
}

/// Deletes back to the previous path separator or whitespace.
fn delete_prev_word(ui_state: &mut TuiState) {
    if ui_state.cursor == 0 {
        return;
    }
    let is_break = |ch: &char| ch.is_whitespace() || *ch == '\\' || *ch == '/';
    let cutoff = char_to_byte_index(&ui_state.input, ui_state.cursor);
    let mut chars: Vec<char> = ui_state.input[..cutoff].chars().collect();

    while chars.last().is_some_and(is_break) {
        chars.pop();
    }
    while chars.last().is_some_and(|ch| !is_break(ch)) {
        chars.pop();
    }

    let new_len = chars.len();
    let start = char_to_byte_index(&ui_state.input, new_len);
    ui_state.input.replace_range(start..cutoff, "");
    ui_state.cursor = new_len;
}

fn char_to_byte_index(input: &str, char_index: usize) -> usize {
    input
        .char_indices()
        .nth(char_index)
        .map(|(idx, _)| idx)
        .unwrap_or_else(|| input.len())
}

fn set_status_message(ui_state: &mut TuiState, message: impl Into<String>) {
    ui_state.status_message = Some(message.into());
    ui_state.status_deadline = Some(Instant::now() + STATUS_MESSAGE_TTL);
}

fn update_status_message(ui_state: &mut TuiState) {
    if let Some(deadline) = ui_state.status_deadline {
        if Instant::now() >= deadline {
            ui_state.status_message = None;
            ui_state.status_deadline = None;
        }
    }
}

#[derive(Clone, Copy)]
struct Theme {
    background: Color,
    surface: Color,
    border: Color,
    accent: Color,
    text: Color,
    dim: Color,
    running: Color,
    stopped: Color,
    highlight_bg: Color,
    highlight_fg: Color,
}

impl Theme {
    fn new() -> Self {
        Self {
            background: Color::Rgb(18, 20, 23),
            surface: Color::Rgb(28, 31, 36),
            border: Color::Rgb(58, 62, 70),
            accent: Color::Rgb(242, 193, 78),
            text: Color::Rgb(232, 230, 227),
            dim: Color::Rgb(148, 153, 160),
            running: Color::Rgb(126, 211, 158),
            stopped: Color::Rgb(120, 124, 130),
            highlight_bg: Color::Rgb(45, 93, 124),
            highlight_fg: Color::Rgb(250, 250, 250),
        }
    }
}

fn render_ui(frame: &mut Frame, ui_state: &mut TuiState, session: &AppSession) {
    let theme = Theme::new();
    update_status_message(ui_state);
    let area = frame.size();
    frame.render_widget(
        Block::default().style(Style::default().bg(theme.background)),
        area,
    );

    let input_height = if ui_state.mode == Mode::Dashboard { 0 } else { 3 };
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(input_height),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(area);

    render_header(frame, layout[0], ui_state, session, theme);
    if ui_state.mode != Mode::Dashboard {
        render_input(frame, layout[1], ui_state, theme);
    }
    if ui_state.mode == Mode::ProcessSearch {
        render_processes(frame, layout[2], ui_state, theme);
    } else {
        render_apps(frame, layout[2], ui_state, theme);
    }
    render_footer(frame, layout[3], ui_state, theme);
}

fn render_header(
    frame: &mut Frame,
    area: Rect,
    ui_state: &TuiState,
    session: &AppSession,
    theme: Theme,
) {
    let layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    let running = ui_state.running.values().filter(|running| **running).count();
    let left = Line::from(vec![
        Span::styled(
            "usb-autostart",
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("  {running}/{} running", ui_state.apps.len()),
            Style::default().fg(theme.dim),
        ),
    ]);
    let left_widget = Paragraph::new(left).style(Style::default().bg(theme.background));
    frame.render_widget(left_widget, layout[0]);

    let matcher = session.matcher_snapshot();
    let (usb_label, usb_color) = match matcher.state() {
        UsbLinkState::NoSelection => ("no trigger device".to_string(), theme.dim),
        UsbLinkState::SelectedDisconnected => (
            format!("usb inactive: {}", device_label(matcher.selected())),
            theme.stopped,
        ),
        UsbLinkState::SelectedConnected => (
            format!("usb active: {}", device_label(matcher.selected())),
            theme.running,
        ),
    };
    let autostart = if ui_state.autostart_enabled {
        "  login: on"
    } else {
        "  login: off"
    };
    let right = Paragraph::new(Line::from(vec![
        Span::styled(usb_label, Style::default().fg(usb_color)),
        Span::styled(autostart, Style::default().fg(theme.dim)),
    ]))
    .alignment(Alignment::Right)
    .style(Style::default().bg(theme.background));
    frame.render_widget(right, layout[1]);
}

fn device_label(device: Option<&UsbDeviceIdentity>) -> String {
    device.map_or_else(String::new, UsbDeviceIdentity::label)
}

fn render_input(frame: &mut Frame, area: Rect, ui_state: &TuiState, theme: Theme) {
    let (title, placeholder) = match ui_state.mode {
        Mode::AddPath => (" Add executable ", "Path to an executable..."),
        Mode::Rename => (" Rename ", "Display name..."),
        _ => (" Running processes ", "Type to filter by name or path..."),
    };
    let input_padding = 1u16;
    let input_width = area
        .width
        .saturating_sub(2 + input_padding.saturating_mul(2)) as usize;
    let (visible_input, cursor_x) = slice_input(&ui_state.input, ui_state.cursor, input_width);
    let input_span = if ui_state.input.is_empty() {
        Span::styled(placeholder, Style::default().fg(theme.dim))
    } else {
        Span::styled(visible_input, Style::default().fg(theme.text))
    };

    let input = Paragraph::new(Line::from(input_span))
        .style(Style::default().bg(theme.surface))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(theme.accent))
                .style(Style::default().bg(theme.surface))
                .padding(Padding::horizontal(input_padding))
                .title(Span::styled(
                    title,
                    Style::default()
                        .fg(theme.accent)
                        .add_modifier(Modifier::BOLD),
                )),
        );
    frame.render_widget(input, area);

    let cursor_x = area.x + 1 + input_padding + cursor_x as u16;
    let cursor_y = area.y + 1;
    let max_cursor_x = area.x + area.width.saturating_sub(1 + input_padding);
    if cursor_x < max_cursor_x && area.height > 2 {
        frame.set_cursor(cursor_x, cursor_y);
    }
}

fn list_block(title: &str, theme: Theme) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.border))
        .style(Style::default().bg(theme.surface))
        .title(Span::styled(
            title,
            Style::default().fg(theme.text).add_modifier(Modifier::BOLD),
        ))
}

fn highlight_style(theme: Theme) -> Style {
    Style::default()
        .fg(theme.highlight_fg)
        .bg(theme.highlight_bg)
        .add_modifier(Modifier::BOLD)
}

fn render_apps(frame: &mut Frame, area: Rect, ui_state: &mut TuiState, theme: Theme) {
    let block = list_block(" Apps ", theme);

    if ui_state.apps.is_empty() {
        let empty = Paragraph::new("No tracked apps. Press a to add a path or p to pick a process.")
            .style(Style::default().fg(theme.dim).bg(theme.surface))
            .alignment(Alignment::Center)
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = ui_state
        .apps
        .iter()
        .map(|app| {
            let running = ui_state.running.get(&app.path).copied().unwrap_or(false);
            let (marker, color) = if running {
                ("● running ", theme.running)
            } else {
                ("○ stopped ", theme.stopped)
            };
            let title = Line::from(vec![
                Span::styled(marker, Style::default().fg(color)),
                Span::styled(
                    app.name.clone(),
                    Style::default().fg(theme.text).add_modifier(Modifier::BOLD),
                ),
            ]);
            let subtitle = Line::from(Span::styled(
                format!("          {}", app.path),
                Style::default().fg(theme.dim),
            ));
            ListItem::new(vec![title, subtitle])
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(highlight_style(theme))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut ui_state.list_state);
}

fn render_processes(frame: &mut Frame, area: Rect, ui_state: &mut TuiState, theme: Theme) {
    let block = list_block(" Processes ", theme);

    if ui_state.processes.is_empty() {
        let empty = Paragraph::new("No matching processes.")
            .style(Style::default().fg(theme.dim).bg(theme.surface))
            .alignment(Alignment::Center)
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = ui_state
        .processes
        .iter()
        .map(|process| {
            ListItem::new(vec![
                Line::from(Span::styled(
                    process.name.clone(),
                    Style::default().fg(theme.text).add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(
                    process.path.clone(),
                    Style::default().fg(theme.dim),
                )),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(highlight_style(theme))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut ui_state.process_list);
}

fn render_footer(frame: &mut Frame, area: Rect, ui_state: &TuiState, theme: Theme) {
    if let Some(message) = ui_state.status_message.as_deref() {
        let footer_widget = Paragraph::new(Line::from(Span::styled(
            message,
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        )))
        .wrap(Wrap { trim: true })
        .alignment(Alignment::Center)
        .style(Style::default().bg(theme.background));
        frame.render_widget(footer_widget, area);
        return;
    }

    let hints: &[(&str, &str)] = match ui_state.mode {
        Mode::Dashboard => &[
            ("s/x", ": start/stop  "),
            ("S/X", ": all  "),
            ("a/o/p", ": add  "),
            ("r", ": rename  "),
            ("d", ": delete  "),
            ("u", ": usb  "),
            ("t", ": login  "),
            ("Ctrl+O", ": settings  "),
            ("q", ": quit"),
        ],
        Mode::ProcessSearch => &[
            ("Enter", ": track  "),
            ("Up/Down", ": move  "),
            ("Esc", ": back"),
        ],
        Mode::AddPath | Mode::Rename => &[("Enter", ": save  "), ("Ctrl+W", ": delete word  "), ("Esc", ": back")],
    };

    let key_style = Style::default()
        .fg(theme.accent)
        .add_modifier(Modifier::BOLD);
    let hint_style = Style::default().fg(theme.dim);
    let spans: Vec<Span> = hints
        .iter()
        .flat_map(|(key, hint)| {
            [
                Span::styled(*key, key_style),
                Span::styled(*hint, hint_style),
            ]
        })
        .collect();
    let footer_widget = Paragraph::new(Line::from(spans))
        .wrap(Wrap { trim: true })
        .alignment(Alignment::Center)
        .style(Style::default().bg(theme.background));
    frame.render_widget(footer_widget, area);
}

fn slice_input(input: &str, cursor: usize, width: usize) -> (String, usize) {
    let len = input.chars().count();
    if width == 0 {
        return (String::new(), 0);
    }

    let start = if len <= width {
        0
    } else if cursor >= width {
        cursor - width + 1
    } else {
        0
    };
    let end = (start + width).min(len);
    let slice: String = input.chars().skip(start).take(end - start).collect();
    (slice, cursor.saturating_sub(start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn device(serial: &str) -> UsbDeviceIdentity {
        UsbDeviceIdentity::from_descriptor(1, 1, Some("Acme"), Some("Key"), Some(serial))
    }

    fn typed(input: &str) -> TuiState {
        let mut state = TuiState::new(Vec::new(), false);
        for ch in input.chars() {
            insert_char(&mut state, ch);
        }
        state
    }

    fn process(name: &str) -> RunningProcessInfo {
        RunningProcessInfo {
            name: name.to_string(),
            path: format!("C:\\Apps\\{name}.exe"),
        }
    }

    #[test]
    fn stale_process_listings_are_dropped() {
        let mut state = typed("ob");
        state.mode = Mode::ProcessSearch;

        assert!(apply_process_listing(&mut state, "ob", vec![process("obs")]));
        assert!(!apply_process_listing(
            &mut state,
            "o",
            vec![process("obs"), process("opera")]
        ));
        assert_eq!(state.processes, vec![process("obs")]);
        assert_eq!(state.process_list.selected(), Some(0));
    }

    #[test]
    fn process_listings_are_ignored_outside_the_picker() {
        let mut state = typed("");
        assert!(!apply_process_listing(&mut state, "", vec![process("obs")]));
        assert!(state.processes.is_empty());
    }

    #[test]
    fn usb_cycling_wraps_through_none() {
        let devices = vec![device("A"), device("B")];
        assert_eq!(next_device(&devices, None), Some(device("A")));
        assert_eq!(next_device(&devices, Some(&device("A"))), Some(device("B")));
        assert_eq!(next_device(&devices, Some(&device("B"))), None);
        assert_eq!(next_device(&devices, Some(&device("gone"))), Some(device("A")));
        assert_eq!(next_device(&[], None), None);
    }

    #[test]
    fn word_delete_stops_at_path_separators() {
        let mut state = typed("C:\\Games\\launcher.exe");
        delete_prev_word(&mut state);
        assert_eq!(state.input, "C:\\Games\\");
        delete_prev_word(&mut state);
        assert_eq!(state.input, "C:\\");
        assert_eq!(state.cursor, 3);
    }

    #[test]
    fn editing_respects_multibyte_characters() {
        let mut state = typed("åpp");
        move_cursor(&mut state, -1);
        assert!(delete_char_before_cursor(&mut state));
        assert_eq!(state.input, "åp");
        state.cursor = 0;
        assert!(delete_char_at_cursor(&mut state));
        assert_eq!(state.input, "p");
    }

    #[test]
    fn selection_wraps_both_ways() {
        let mut list = ListState::default();
        reset_selection(&mut list, 3);
        move_selection(&mut list, 3, -1);
        assert_eq!(list.selected(), Some(2));
        move_selection(&mut list, 3, 1);
        assert_eq!(list.selected(), Some(0));
        move_selection(&mut list, 0, 1);
        assert_eq!(list.selected(), None);
    }

    #[test]
    fn long_input_scrolls_to_keep_the_cursor_visible() {
        let (visible, cursor) = slice_input("abcdefgh", 8, 4);
        assert_eq!(visible, "fgh");
        assert_eq!(cursor, 3);
        assert_eq!(slice_input("abc", 1, 10), ("abc".to_string(), 1));
    }
}

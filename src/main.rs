mod autostart;
mod commands;
mod config;
mod dialog;
mod execute;
mod icons;
mod models;
mod process_core;
mod process_table;
mod state;
mod store;
mod tui;
mod usb_matcher;
mod usb_monitor;
#[cfg(windows)]
mod windows_utils;

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    sync::Arc,
};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::{
    config::{AppConfig, APP_DIR_NAME},
    icons::SystemIcons,
    models::{RunningProcessInfo, TrackedApp},
    process_table::SystemProcessTable,
    state::AppSession,
    store::AppStore,
    usb_matcher::UsbLinkState,
    usb_monitor::{spawn_device_monitor, NusbDeviceSource},
};

const LOG_FILE: &str = "usb-autostart.log";

#[tokio::main]
async fn main() -> Result<()> {
    let repl = std::env::args().skip(1).any(|arg| arg == "--repl");
    init_logging(repl);

    let config = AppConfig::load();
    debug!("Loaded configuration");

    let store = AppStore::default_location().context("no local data directory on this system")?;
    let session = AppSession::new(
        config.clone(),
        store,
        Arc::new(SystemProcessTable),
        Arc::new(SystemIcons),
        autostart::platform_autostart()?,
    );
    info!("Tracking {} apps", session.apps_snapshot().len());

    let (monitor, events) =
        spawn_device_monitor(Arc::new(NusbDeviceSource), config.usb_poll_interval());
    let dispatcher = commands::spawn_usb_dispatcher(session.clone(), events);

    let result = if repl {
        run_repl(session).await
    } else {
        let runtime = tokio::runtime::Handle::current();
        tokio::task::spawn_blocking(move || tui::run_tui(session, runtime))
            .await
            .context("ui task failed")?
    };

    monitor.abort();
    dispatcher.abort();
    result
}

/// The dashboard owns the terminal, so its logs go to a file instead of stderr.
fn init_logging(to_stderr: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();
    if !to_stderr {
        match open_log_file() {
            Some(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            None => {
                builder.filter_level(log::LevelFilter::Off);
            }
        }
    }
    builder.init();
}

fn open_log_file() -> Option<File> {
    let dir = dirs::data_local_dir()?.join(APP_DIR_NAME);
    fs::create_dir_all(&dir).ok()?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE))
        .ok()
}

async fn run_repl(session: AppSession) -> Result<()> {
    println!("usb-autostart v{} (repl)", env!("CARGO_PKG_VERSION"));
    println!("Type 'help' for commands.\n");

    let mut last_processes: Vec<RunningProcessInfo> = Vec::new();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }
        let (command, rest) = trimmed
            .split_once(char::is_whitespace)
            .map_or((trimmed, ""), |(command, rest)| (command, rest.trim()));

        match command.to_lowercase().as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye!");
                break;
            }
            "help" | "h" => print_help(),
            "list" | "ls" => print_apps(&session).await,
            "add" => {
                if rest.is_empty() {
                    println!("Usage: add <path>");
                    continue;
                }
                report_added(commands::add_apps(&session, [rest]));
            }
            "pick" => match commands::open_file_selection_dialog().await {
                Ok(paths) if paths.is_empty() => println!("Nothing selected."),
                Ok(paths) => report_added(commands::add_apps(&session, &paths)),
                Err(err) => println!("Error: {err:#}"),
            },
            "remove" | "rm" => {
                let Some(app) = app_by_index(&session, rest) else {
                    continue;
                };
                match commands::remove_app(&session, &app.path) {
                    Ok(_) => println!("Removed {}", app.name),
                    Err(err) => println!("Error: {err:#}"),
                }
            }
            "rename" => {
                let (index, name) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                let Some(app) = app_by_index(&session, index) else {
                    continue;
                };
                match commands::rename_app(&session, &app.path, name) {
                    Ok(true) => println!("Renamed to {}", name.trim()),
                    Ok(false) => println!("Usage: rename <number> <name>"),
                    Err(err) => println!("Error: {err:#}"),
                }
            }
            "start" => {
                if rest == "all" {
                    commands::start_all(&session).await;
                } else if let Some(app) = app_by_index(&session, rest) {
                    commands::launch_app(&session, &[app.path]).await;
                }
            }
            "stop" => {
                if rest == "all" {
                    commands::stop_all(&session).await;
                } else if let Some(app) = app_by_index(&session, rest) {
                    commands::stop_app(&session, &[app.path]).await;
                }
            }
            "status" => {
                if let Some(app) = app_by_index(&session, rest) {
                    let running = commands::is_app_running(&session, &app.path).await;
                    println!("{}: {}", app.name, if running { "running" } else { "stopped" });
                }
            }
            "icon" => {
                if let Some(app) = app_by_index(&session, rest) {
                    match commands::get_process_icon(&session, &app.path).await {
                        Some(icon) => println!("{icon}"),
                        None => println!("No icon for {}", app.name),
                    }
                }
            }
            "ps" => {
                let search = (!rest.is_empty()).then_some(rest);
                last_processes = commands::list_running_processes(&session, search).await;
                print_processes(&last_processes);
            }
            "track" => {
                let Some(process) = rest
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| index.checked_sub(1))
                    .and_then(|index| last_processes.get(index))
                else {
                    println!("Run 'ps' first, then 'track <number>'.");
                    continue;
                };
                report_added(commands::add_apps(&session, [process.path.as_str()]));
            }
            "usb" => handle_usb_command(&session, rest),
            "autostart" => match rest {
                "" => println!(
                    "Start at login: {}",
                    if commands::is_auto_start_enabled(&session) { "on" } else { "off" }
                ),
                "on" | "off" => match commands::set_auto_start(&session, rest == "on") {
                    Ok(()) => println!("Start at login: {rest}"),
                    Err(err) => println!("Error: {err:#}"),
                },
                _ => println!("Usage: autostart [on|off]"),
            },
            _ => println!("Unknown command: {command}. Type 'help' for commands."),
        }
    }

    Ok(())
}

async fn print_apps(session: &AppSession) {
    let apps = commands::tracked_apps(session);
    if apps.is_empty() {
        println!("No tracked apps.");
        return;
    }
    let paths: Vec<String> = apps.iter().map(|app| app.path.clone()).collect();
    let details = commands::get_app_list_details(session, &paths).await;

    println!();
    for (index, (app, detail)) in apps.iter().zip(details).enumerate() {
        println!(
            "[{}] {} {} - {}{}",
            index + 1,
            if detail.is_running { "●" } else { "○" },
            app.name,
            app.path,
            if detail.icon.is_some() { "" } else { " (no icon)" }
        );
    }
    println!();
}

fn print_processes(processes: &[RunningProcessInfo]) {
    if processes.is_empty() {
        println!("No matching processes.");
        return;
    }
    println!();
    for (index, process) in processes.iter().enumerate() {
        println!("[{}] {} - {}", index + 1, process.name, process.path);
    }
    println!();
    println!("Type 'track <number>' to add one.");
}

fn handle_usb_command(session: &AppSession, args: &str) {
    let matcher = session.matcher_snapshot();
    match args.split_whitespace().collect::<Vec<_>>().as_slice() {
        [] => {
            let state = match matcher.state() {
                UsbLinkState::NoSelection => "no trigger device",
                UsbLinkState::SelectedDisconnected => "trigger device disconnected",
                UsbLinkState::SelectedConnected => "trigger device connected",
            };
            println!("State: {state}");
            if let Some(selected) = matcher.selected() {
                println!("Selected: {}", selected.label());
            }
            for (index, device) in matcher.available().iter().enumerate() {
                println!("[{}] {}", index + 1, device.label());
            }
        }
        ["select", index] => {
            let Some(device) = index
                .parse::<usize>()
                .ok()
                .and_then(|index| index.checked_sub(1))
                .and_then(|index| matcher.available().get(index))
                .cloned()
            else {
                println!("Invalid device number: {index}");
                return;
            };
            let label = device.label();
            match commands::select_usb_device(session, Some(device)) {
                Ok(_) => println!("Trigger device: {label}"),
                Err(err) => println!("Error: {err:#}"),
            }
        }
        ["clear"] => match commands::select_usb_device(session, None) {
            Ok(_) => println!("Trigger device cleared."),
            Err(err) => println!("Error: {err:#}"),
        },
        _ => println!("Usage: usb [select <number> | clear]"),
    }
}

fn app_by_index(session: &AppSession, input: &str) -> Option<TrackedApp> {
    let apps = commands::tracked_apps(session);
    let app = input
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|index| index.checked_sub(1))
        .and_then(|index| apps.get(index))
        .cloned();
    if app.is_none() {
        println!("Invalid app number: {input}");
    }
    app
}

fn report_added(result: Result<usize>) {
    match result {
        Ok(0) => println!("Already tracked."),
        Ok(added) => println!("Added {added} app(s)."),
        Err(err) => println!("Error: {err:#}"),
    }
}

fn print_help() {
    println!();
    println!("usb-autostart commands:");
    println!("  list                 - Show tracked apps and whether they are running");
    println!("  add <path>           - Track an executable");
    println!("  pick                 - Choose executables with the file dialog");
    println!("  ps [filter]          - List running processes that could be tracked");
    println!("  track <number>       - Track a process from the last 'ps' listing");
    println!("  rename <n> <name>    - Change an app's display name");
    println!("  remove <number>      - Stop tracking an app");
    println!("  status <number>      - Check whether one app is running");
    println!("  icon <number>        - Print an app's icon as a data URL");
    println!("  start <number|all>   - Start apps that are not running");
    println!("  stop <number|all>    - Stop apps");
    println!("  usb [select <n>|clear] - Show devices or choose the trigger device");
    println!("  autostart [on|off]   - Show or change start at login");
    println!("  help, h              - Show this help message");
    println!("  quit, q              - Exit");
    println!();
}

mod config;
mod counters;
mod discovery;
mod error;
mod history;
mod metrics;
mod sampler;
mod sysfs;
mod types;
mod ui;

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{parse_options, SeriesConfig, DEFAULT_OPTIONS};
use crate::counters::perfquery::{Perfquery, PerfqueryOptions, DEFAULT_PROGRAM};
use crate::counters::CounterSource;
use crate::discovery::fake::FakeFabric;
use crate::error::Error;
use crate::metrics::MetricsCollector;
use crate::sampler::Sampler;
use crate::sysfs::{Sysfs, DEFAULT_SYSFS_ROOT};

const UI_REFRESH_INTERVAL_MS: u64 = 33;

#[derive(Parser, Debug)]
#[command(version, about = "Per-port InfiniBand send/receive traffic monitor")]
struct Cli {
    /// Series options, e.g. "-i total,ib,ib0"
    #[arg(long, env = "IBTRAFFIC_OPTS", default_value = DEFAULT_OPTIONS, allow_hyphen_values = true)]
    opts: String,

    /// Print one sample as JSON and exit
    #[arg(long)]
    json: bool,

    /// Sampling interval of the interactive view
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Upper bound on a single perfquery run
    #[arg(long, env = "IBTRAFFIC_TIMEOUT_MS", default_value_t = 5000)]
    timeout_ms: u64,

    #[arg(long, env = "IBTRAFFIC_SYSFS_ROOT", default_value = DEFAULT_SYSFS_ROOT)]
    sysfs_root: PathBuf,

    /// perfquery command, optionally behind a wrapper such as "sudo -n perfquery"
    #[arg(long, env = "IBTRAFFIC_PERFQUERY", default_value = DEFAULT_PROGRAM)]
    perfquery: String,

    /// Reset port counters after every read (perfquery -r)
    #[arg(long)]
    reset_after_read: bool,

    /// Read 64-bit extended counters (perfquery -x)
    #[arg(long)]
    extended: bool,

    /// Write logs to this file in interactive mode
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let tokens = parse_options(&cli.opts)?;

    if std::env::var("IBTRAFFIC_FAKE_DATA").is_ok() {
        let fabric = FakeFabric::new();
        let config = SeriesConfig::resolve(&tokens, &fabric);
        info!(series = ?config.series, "using fake fabric");
        return run(&cli, &Sampler::new(config, fabric));
    }

    let sysfs = Sysfs::new(&cli.sysfs_root);
    sysfs.check()?;

    let config = SeriesConfig::resolve(&tokens, &sysfs);
    info!(series = ?config.series, total_ports = ?config.total_ports, "resolved series");

    let source = Perfquery::new(
        sysfs,
        PerfqueryOptions {
            program: cli.perfquery.clone(),
            timeout: Duration::from_millis(cli.timeout_ms),
            reset_after_read: cli.reset_after_read,
            extended: cli.extended,
        },
    );
    run(&cli, &Sampler::new(config, source))
}

fn init_logging(cli: &Cli) -> Result<(), Error> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    if cli.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(io::stderr)
            .init();
    } else if let Some(path) = &cli.log_file {
        // the terminal belongs to the UI, so logs only go to a file
        let file = File::create(path)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }

    Ok(())
}

fn run<S: CounterSource>(cli: &Cli, sampler: &Sampler<S>) -> Result<(), Error> {
    if cli.json {
        run_json_mode(sampler)
    } else {
        run_interactive_mode(cli, sampler)
    }
}

fn run_json_mode<S: CounterSource>(sampler: &Sampler<S>) -> Result<(), Error> {
    let json_output = serde_json::to_string_pretty(&sampler.sample())?;
    println!("{json_output}");

    Ok(())
}

fn run_interactive_mode<S: CounterSource>(cli: &Cli, sampler: &Sampler<S>) -> Result<(), Error> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, cli, sampler);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("{err}");
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend, S: CounterSource>(
    terminal: &mut Terminal<B>,
    cli: &Cli,
    sampler: &Sampler<S>,
) -> io::Result<()> {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string());

    let mut metrics = MetricsCollector::new(cli.reset_after_read);
    let mut state = ui::AppState::new();

    let ui_refresh_duration = Duration::from_millis(UI_REFRESH_INTERVAL_MS);
    let sample_interval = Duration::from_millis(cli.interval_ms.max(1));
    #[allow(clippy::cast_precision_loss)]
    let interval_secs = cli.interval_ms.max(1) as f64 / 1000.0;

    let mut last_sample: Option<Instant> = None;

    loop {
        let now = Instant::now();

        if last_sample.is_none_or(|last| now.duration_since(last) >= sample_interval) {
            metrics.update(&sampler.sample());
            last_sample = Some(now);
        }

        terminal.draw(|f| {
            ui::draw(
                f,
                &sampler.config().series,
                &metrics,
                &hostname,
                interval_secs,
                &mut state,
            );
        })?;

        let timeout = ui_refresh_duration.saturating_sub(now.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        return Ok(())
                    }
                    KeyCode::Up | KeyCode::Char('k') => state.select_prev(),
                    KeyCode::Down | KeyCode::Char('j') => state.select_next(),
                    KeyCode::Enter => state.toggle_detail(),
                    KeyCode::Char('r') => last_sample = None,
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["ibtraffic"]).unwrap();
        assert_eq!(cli.interval_ms, 1000);
        assert!(!cli.json);
        assert!(!cli.reset_after_read);
        assert_eq!(cli.sysfs_root, PathBuf::from("/sys"));
    }

    #[test]
    fn test_cli_accepts_hyphenated_opts() {
        let cli = Cli::try_parse_from(["ibtraffic", "--opts", "-i total,ib0", "--json"]).unwrap();
        assert_eq!(cli.opts, "-i total,ib0");
        assert!(cli.json);
    }
}

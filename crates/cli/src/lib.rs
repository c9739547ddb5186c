use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdf_render_scheduler::{
    compute_window, Clock, FeatureGate, HostEnvironment, HostServices, ManualHost, PageSource,
    RenderPriority, SchedulerConfig, ViewerSession, WindowConfig,
};
use pdf_render_storage::Storage;
use serde::Serialize;
use std::cell::RefCell;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "pdf-render-cli")]
#[command(about = "Render scheduling and windowing tools")]
pub struct Cli {
    /// Scheduler settings file (TOML); environment variables are used otherwise.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the render window for one scroll position as JSON.
    Window {
        #[arg(long)]
        scroll_offset: f64,
        #[arg(long)]
        total_items: usize,
        #[arg(long)]
        item_extent: f64,
        #[arg(long)]
        container_extent: f64,
        #[arg(long)]
        overscan: Option<usize>,
    },
    /// Replay a scroll trace and print the renders it triggers as JSON lines.
    Simulate {
        #[arg(long)]
        total_items: usize,
        #[arg(long)]
        item_extent: f64,
        #[arg(long)]
        container_extent: f64,
        /// Scroll offsets, comma separated.
        #[arg(long, value_delimiter = ',', num_args = 1..)]
        scroll: Vec<f64>,
        /// Virtual time between scroll events.
        #[arg(long, default_value_t = 4)]
        interval_ms: u64,
        #[arg(long)]
        overscan: Option<usize>,
        /// Make rendering this item fail.
        #[arg(long)]
        fail_item: Option<usize>,
        /// Also build thumbnails for every item afterwards.
        #[arg(long)]
        thumbnails: bool,
    },
    /// Read or change an optional feature switch.
    Feature {
        #[command(subcommand)]
        action: FeatureAction,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Subcommand)]
enum FeatureAction {
    Get {
        name: String,
        #[arg(long, value_name = "DIR")]
        data_dir: Option<PathBuf>,
    },
    Set {
        name: String,
        #[arg(long, action = clap::ArgAction::Set)]
        enabled: bool,
        #[arg(long, value_name = "DIR")]
        data_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Serialize)]
struct WindowOutput {
    start: Option<usize>,
    end: Option<usize>,
    count: usize,
    offset: f64,
    total_extent: f64,
}

#[derive(Debug, Serialize)]
struct FeatureOutput<'a> {
    feature: &'a str,
    enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum SimulationEvent {
    Scroll { offset: f64, at_ms: f64 },
    Render { index: usize, priority: String, at_ms: f64 },
    Failure { priority: String, pass: u64, error: String },
    Thumbnails { count: usize },
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Window {
            scroll_offset,
            total_items,
            item_extent,
            container_extent,
            overscan,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let overscan = overscan.unwrap_or(config.overscan);
            run_window(scroll_offset, total_items, item_extent, container_extent, overscan)
        }
        Commands::Simulate {
            total_items,
            item_extent,
            container_extent,
            scroll,
            interval_ms,
            overscan,
            fail_item,
            thumbnails,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(overscan) = overscan {
                config = config.with_overscan(overscan);
            }
            let document = Rc::new(SimulatedDocument::new(total_items, fail_item));
            let trace = ScrollTrace {
                item_extent,
                container_extent,
                offsets: scroll,
                interval: Duration::from_millis(interval_ms),
                thumbnails,
            };
            run_simulate(&config, document, &trace)
        }
        Commands::Feature { action } => run_feature(action),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<SchedulerConfig> {
    match path {
        Some(path) => SchedulerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => SchedulerConfig::from_env().context("invalid scheduler environment"),
    }
}

fn run_window(
    scroll_offset: f64,
    total_items: usize,
    item_extent: f64,
    container_extent: f64,
    overscan: usize,
) -> Result<()> {
    let config = WindowConfig::new(item_extent, container_extent).with_overscan(overscan);
    let window = compute_window(scroll_offset, total_items, &config)?;

    let payload = WindowOutput {
        start: window.start_index(),
        end: window.end_index(),
        count: window.len(),
        offset: window.offset,
        total_extent: window.total_extent,
    };

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

#[derive(Debug, thiserror::Error)]
#[error("item {0} failed to render")]
struct SimulatedRenderError(usize);

/// Document whose renders only record what was asked of them
struct SimulatedDocument {
    items: usize,
    fail_item: Option<usize>,
    clock: RefCell<Option<ManualHost>>,
    events: RefCell<Vec<SimulationEvent>>,
}

impl SimulatedDocument {
    fn new(items: usize, fail_item: Option<usize>) -> Self {
        Self { items, fail_item, clock: RefCell::new(None), events: RefCell::new(Vec::new()) }
    }

    fn now_ms(&self) -> f64 {
        self.clock.borrow().as_ref().map_or(0.0, |host| millis(host))
    }

    fn record(&self, event: SimulationEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl PageSource for SimulatedDocument {
    type Thumbnail = usize;
    type Error = SimulatedRenderError;

    fn item_count(&self) -> usize {
        self.items
    }

    fn render_item(&self, index: usize, priority: RenderPriority) -> Result<(), Self::Error> {
        if self.fail_item == Some(index) {
            return Err(SimulatedRenderError(index));
        }
        self.record(SimulationEvent::Render {
            index,
            priority: priority.to_string(),
            at_ms: self.now_ms(),
        });
        Ok(())
    }

    fn render_thumbnail(&self, index: usize) -> Result<usize, Self::Error> {
        if self.fail_item == Some(index) {
            return Err(SimulatedRenderError(index));
        }
        Ok(index)
    }
}

struct ScrollTrace {
    item_extent: f64,
    container_extent: f64,
    offsets: Vec<f64>,
    interval: Duration,
    thumbnails: bool,
}

fn millis(host: &ManualHost) -> f64 {
    host.now().as_secs_f64() * 1000.0
}

fn run_simulate(
    config: &SchedulerConfig,
    document: Rc<SimulatedDocument>,
    trace: &ScrollTrace,
) -> Result<()> {
    let host = ManualHost::new();
    *document.clock.borrow_mut() = Some(host.clone());

    let session = ViewerSession::new(
        document.clone(),
        &HostServices::manual(&host),
        config,
        trace.item_extent,
        trace.container_extent,
    )?;
    let failures = session.failures();
    let collect_failures = || {
        for failure in failures.try_iter() {
            document.record(SimulationEvent::Failure {
                priority: failure.priority.to_string(),
                pass: failure.pass,
                error: failure.error.to_string(),
            });
        }
    };

    session.refresh();
    host.run_until_idle();
    collect_failures();

    for &offset in &trace.offsets {
        document.record(SimulationEvent::Scroll { offset, at_ms: millis(&host) });
        session.on_scroll(offset)?;
        host.run_until_idle();
        collect_failures();
        host.advance(trace.interval);
        host.run_until_idle();
        collect_failures();
    }

    // Let any owed trailing recompute fire.
    host.advance(config.throttle_limit.max(config.debounce_delay));
    host.run_until_idle();
    collect_failures();

    if trace.thumbnails {
        let thumbnails = host
            .run_to_completion(session.build_thumbnails())
            .context("thumbnail batch stalled")?
            .context("thumbnail batch failed")?;
        document.record(SimulationEvent::Thumbnails { count: thumbnails.len() });
    }

    session.teardown();
    tracing::debug!(stats = ?session.queue().stats(), "simulation finished");

    for event in document.events.borrow().iter() {
        println!("{}", serde_json::to_string(event)?);
    }
    Ok(())
}

fn run_feature(action: FeatureAction) -> Result<()> {
    let (name, data_dir, enabled) = match action {
        FeatureAction::Get { name, data_dir } => (name, data_dir, None),
        FeatureAction::Set { name, enabled, data_dir } => (name, data_dir, Some(enabled)),
    };

    let storage = match data_dir {
        Some(dir) => Storage::with_root(dir),
        None => Storage::from_default_project()?,
    };
    let gate = FeatureGate::new(Rc::new(storage), HostEnvironment::Interactive);

    if let Some(enabled) = enabled {
        gate.set_feature_enabled(&name, enabled)
            .with_context(|| format!("failed to update feature {name}"))?;
    }

    let payload = FeatureOutput { feature: &name, enabled: gate.should_load_feature(&name) };
    println!("{}", serde_json::to_string(&payload)?);
    Ok(())
}

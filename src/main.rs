mod app;
mod config;
mod data;
mod gui;
mod portfolio;
mod report;
mod tui;
mod ui;
mod webui;

use anyhow::{Context, Result};
use app::App;
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use config::{Overrides, Settings};
use data::WeightTable;
use portfolio::SnapshotAnalysis;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, ValueEnum)]
enum GuiRendererChoice {
    Auto,
    Wgpu,
    Glow,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "DriftDash: portfolio allocation, drift and rebalancing dashboard",
    after_help = "EXAMPLES:
    # Terminal dashboard on the default weight file
    cargo run --release

    # Desktop dashboard for a specific file
    cargo run --release -- --gui --file weights.csv

    # Print every section for one date
    cargo run --release -- --report --date 2024-03-01 --band 0.03

    # Write trade_suggestions.txt for the latest date
    cargo run --release -- --export trade_suggestions.txt --value 120000"
)]
struct Args {
    /// Weight table to load (time column plus one weight column per ticker)
    #[arg(long)]
    file: Option<PathBuf>,

    /// Launch in GUI mode
    #[arg(long)]
    gui: bool,

    /// Launch in WebUI mode
    #[arg(long)]
    webui: bool,

    /// WebUI server port
    #[arg(long, default_value_t = 8080)]
    webui_port: u16,

    /// GUI renderer backend (auto|wgpu|glow). Useful for RDP compatibility.
    #[arg(long, value_enum, default_value_t = GuiRendererChoice::Wgpu)]
    gui_renderer: GuiRendererChoice,

    /// Enable GUI safe mode for remote desktop (disables vsync/MSAA and hardware acceleration).
    #[arg(long)]
    gui_safe_mode: bool,

    /// Print summary, allocation, drift and trades for one date and exit
    #[arg(long)]
    report: bool,

    /// Date (YYYY-MM-DD) for --report / --export (default: latest)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Drift band for the drift monitor and trade suggestions (default: 0.02)
    #[arg(long)]
    band: Option<f64>,

    /// Portfolio value in dollars (default: 50000)
    #[arg(long)]
    value: Option<f64>,

    /// Absolute drift above which a rebalance is flagged (default: 0.02)
    #[arg(long)]
    rebalance_threshold: Option<f64>,

    /// Write the trade suggestion file for the selected date and exit
    #[arg(long)]
    export: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("driftdash=info,wgpu_core=error,wgpu_hal=error")
    });
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let settings = Settings::resolve(Overrides {
        data_file: args.file.clone(),
        portfolio_value: args.value,
        drift_band: args.band,
        rebalance_threshold: args.rebalance_threshold,
    });

    let table = WeightTable::load(&settings.data_file)
        .with_context(|| format!("Could not load weight table {}", settings.data_file.display()))?;
    let table = Arc::new(table);

    if args.report || args.export.is_some() {
        let date = match args.date {
            Some(d) => d,
            None => table.latest_date().context("Weight table has no dates")?,
        };
        if args.report {
            report::print_report(&table, date, &settings)?;
        }
        if let Some(path) = &args.export {
            export_for_date(&table, date, &settings, path)?;
        }
        return Ok(());
    }

    if args.gui {
        let mut options = eframe::NativeOptions::default();
        options.renderer = match args.gui_renderer {
            GuiRendererChoice::Auto => eframe::Renderer::Wgpu,
            GuiRendererChoice::Wgpu => eframe::Renderer::Wgpu,
            GuiRendererChoice::Glow => eframe::Renderer::Glow,
        };

        if args.gui_safe_mode {
            options.vsync = false;
            options.multisampling = 0;
            options.depth_buffer = 0;
            options.stencil_buffer = 0;
            options.hardware_acceleration = eframe::HardwareAcceleration::Off;
        }

        info!(
            "Launching GUI with renderer: {:?}, safe_mode={}",
            args.gui_renderer,
            args.gui_safe_mode
        );
        let app = App::new(table, settings);
        eframe::run_native(
            "Portfolio Dashboard",
            options,
            Box::new(|_cc| Ok(Box::new(gui::GuiApp::new(app)))),
        )
        .map_err(|e| anyhow::anyhow!("GUI failed: {}", e))?;
        return Ok(());
    }

    if args.webui {
        webui::run_webui_server(args.webui_port, table, settings).await?;
        info!("WebUI exited.");
        return Ok(());
    }

    let mut terminal = tui::init()?;
    let mut app = App::new(table, settings);
    let res = app.run(&mut terminal);

    tui::restore()?;

    res.context("Terminal dashboard failed")
}

fn export_for_date(
    table: &WeightTable,
    date: NaiveDate,
    settings: &Settings,
    path: &std::path::Path,
) -> Result<()> {
    let snapshot = table
        .snapshot_on(date)
        .with_context(|| format!("No snapshot for {}", report::format_date(date)))?;
    let plan = SnapshotAnalysis::new(snapshot).trades(settings.drift_band, settings.portfolio_value);
    match report::trade_file_text(&plan) {
        Some(text) => report::export_trades_to(&text, path),
        None => {
            info!("No trade suggestions for {}; nothing written", date);
            Ok(())
        }
    }
}

mod app;
mod chart;
mod config;
mod data;
mod error;
mod forecast;
mod gui;
mod live;
mod portfolio;

use app::App;
use clap::{Parser, ValueEnum};
use config::{AppConfig, DataProviderMode, WINDOW_SIZE, WINDOW_TITLE};
use data::DataProvider;
use std::io;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, ValueEnum)]
enum GuiRendererChoice {
    Wgpu,
    Glow,
}

#[derive(Clone, Debug, ValueEnum)]
enum ProviderChoice {
    Yahoo,
    Mock,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "StockScope: stock price charts, portfolio overview and trend forecasts",
    after_help = "EXAMPLES:
    # Launch with Yahoo Finance data
    cargo run --release

    # Work offline with generated prices
    cargo run --release -- --provider mock

    # Stream live prices from a websocket feed
    cargo run --release -- --live-url 'wss://feed.example.com/ws/stocks/{symbol}'"
)]
struct Args {
    /// Market data provider (overrides STOCKSCOPE_DATA_PROVIDER)
    #[arg(long, value_enum)]
    provider: Option<ProviderChoice>,

    /// Websocket URL template for live prices; `{symbol}` is replaced by the analyzed symbol
    #[arg(long)]
    live_url: Option<String>,

    /// GUI renderer backend (wgpu|glow). Useful for RDP compatibility.
    #[arg(long, value_enum, default_value_t = GuiRendererChoice::Wgpu)]
    gui_renderer: GuiRendererChoice,

    /// Enable GUI safe mode for remote desktop (disables vsync/MSAA and hardware acceleration).
    #[arg(long)]
    gui_safe_mode: bool,
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let _ = dotenvy::dotenv();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("stockscope=info,wgpu_core=error,wgpu_hal=error")
    });
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();
    let args = Args::parse();

    let mut config = AppConfig::from_env();
    if let Some(provider) = args.provider {
        config.provider = match provider {
            ProviderChoice::Yahoo => DataProviderMode::Yahoo,
            ProviderChoice::Mock => DataProviderMode::Mock,
        };
    }
    if let Some(url) = args.live_url {
        config.live_url_template = Some(url);
    }

    let provider = match DataProvider::from_config(&config) {
        Ok(provider) => provider,
        Err(e) => {
            error!("Failed to initialize data provider: {:#}", e);
            return Err(io::Error::other(e.to_string()));
        }
    };

    let mut options = eframe::NativeOptions::default();
    options.viewport = egui::ViewportBuilder::default()
        .with_title(WINDOW_TITLE)
        .with_inner_size(WINDOW_SIZE);
    options.renderer = match args.gui_renderer {
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
        "Launching GUI with renderer: {:?}, safe_mode={}, live_feed={}",
        args.gui_renderer,
        args.gui_safe_mode,
        config.live_url_template.is_some()
    );

    let runtime = tokio::runtime::Handle::current();
    eframe::run_native(
        WINDOW_TITLE,
        options,
        Box::new(move |cc| {
            let ctx = cc.egui_ctx.clone();
            let session = app::spawn_session(
                App::new(provider, config.forecast_horizon_days),
                &runtime,
                move || ctx.request_repaint(),
            );
            Ok(Box::new(gui::GuiApp::new(config, runtime, session)))
        }),
    )
    .map_err(|e| io::Error::other(e.to_string()))?;

    Ok(())
}

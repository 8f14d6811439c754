//! ChamberView headless viewer
//!
//! Connects to a ball-machine server, plays its chambers back at display
//! rate, and accepts admin commands on stdin.

mod commands;

use anyhow::{Context, Result};
use chamberview_core::{ChamberViewer, Filter, RerunSink, ViewerConfig, ViewerHandle, WasmEngine};
use chamberview_env::{HttpService, TokioContext};
use clap::Parser;
use commands::{Command, HELP};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "chamberview")]
#[command(about = "Plays back a ball-machine server's chambers")]
struct Args {
    /// Server base URL
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,
    
    /// Width of one chamber in pixels
    #[arg(short = 'w', long, default_value = "600")]
    chamber_width: u32,
    
    /// Color filter for chamber pixels (none, grayscale, invert, sepia)
    #[arg(short, long, default_value = "none")]
    filter: Filter,
    
    /// Delay between state fetches in milliseconds
    #[arg(long, default_value = "300")]
    fetch_interval_ms: u64,
    
    /// Instruction budget per chamber frame (0 = unmetered)
    #[arg(long, default_value = "50000000")]
    fuel: u64,
    
    /// Stream the composited canvas to Rerun, one frame in N
    #[arg(long)]
    rerun_every: Option<u64>,
    
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn viewer_config(&self) -> ViewerConfig {
        let mut config = ViewerConfig {
            fetch_interval: Duration::from_millis(self.fetch_interval_ms.max(1)),
            chamber_width: self.chamber_width.max(1),
            fuel_per_frame: (self.fuel > 0).then_some(self.fuel),
            ..Default::default()
        };
        config.style.filter = self.filter;
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("setting tracing subscriber")?;
    
    let config = args.viewer_config();
    let service = HttpService::new(&args.url).with_context(|| format!("invalid server URL {}", args.url))?;
    let engine = WasmEngine::new(config.fuel_per_frame).context("creating wasm engine")?;
    
    let (viewer, handle) = ChamberViewer::connect(
        TokioContext::shared(),
        Arc::new(service),
        Arc::new(engine),
        config,
    )
    .await
    .context("connecting to server")?;
    let viewer = match args.rerun_every {
        Some(every) => viewer.with_sink(Box::new(RerunSink::new("chamberview", every))),
        None => viewer,
    };
    
    if handle.is_admin() {
        info!("Admin controls enabled. {}", HELP);
    }
    
    tokio::select! {
        result = viewer.run() => result.context("render loop stopped")?,
        _ = console(handle) => info!("Quit"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }
    Ok(())
}

/// Reads commands from stdin until `quit`. At end of input the console goes
/// quiet and the viewer keeps running.
async fn console(handle: ViewerHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Console read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(Command::Quit) => return,
            Ok(command) => execute(&handle, command).await,
            Err(e) => warn!("{}. {}", e, HELP),
        }
    }
    debug!("Console closed");
    std::future::pending::<()>().await
}

async fn execute(handle: &ViewerHandle, command: Command) {
    if command.needs_admin() && !handle.is_admin() {
        warn!(user = %handle.user().name, "{:?} needs admin rights", command);
        return;
    }
    let outcome = match command {
        Command::Balls(n) => handle.set_num_balls(n).await,
        Command::Row(n) => handle.set_chambers_per_row(n).await.map(|summary| {
            match serde_json::to_string(&summary) {
                Ok(json) => info!("Layout: {}", json),
                Err(_) => info!(slots = summary.slots, "Layout rebuilt"),
            }
        }),
        Command::Reset => handle.reset().await,
        Command::Help => {
            info!("{}", HELP);
            Ok(())
        }
        Command::Quit => Ok(()),
    };
    if let Err(e) = outcome {
        warn!(error = %e, "{:?} failed", command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_args_map_onto_viewer_config() {
        let args = Args::parse_from(["chamberview", "--filter", "grayscale", "--fuel", "0", "-w", "300"]);
        let config = args.viewer_config();
        assert_eq!(config.style.filter, Filter::Grayscale);
        assert_eq!(config.fuel_per_frame, None);
        assert_eq!(config.chamber_width, 300);
        assert_eq!(config.fetch_interval, Duration::from_millis(300));
    }
    
    #[test]
    fn test_bad_filter_is_rejected() {
        assert!(Args::try_parse_from(["chamberview", "--filter", "blur(3px)"]).is_err());
    }
}

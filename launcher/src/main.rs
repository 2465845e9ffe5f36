/// streamboot - bootstrapper for a hosted application.
///
/// Routes all log output into a bounded live log, downloads the application
/// bundle once per environment, then hands off to the application entry.
mod app;
mod startup;
mod viewer;

use streamboot_downloader::BundleDownloader;
use streamboot_shared::config::{self, BootConfig};
use streamboot_shared::log_sink::{FanoutSurface, FileSurface, LogSink};
use streamboot_shared::secrets::{EnvSecrets, LayeredSecrets, TomlSecrets};
use tracing::{error, info};

use startup::StartupReport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenvy::dotenv().ok();

    let (config, config_warnings) = BootConfig::from_env();

    // Log sink replaces stdout as the destination of every log line
    let mut surface = FanoutSurface::new();
    if let Some(path) = &config.log_view_path {
        surface = surface.with(FileSurface::new(path));
    }
    let sink = LogSink::new(config.log_capacity, surface).mirror_stderr(config.mirror_stderr);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "streamboot=info,streamboot_downloader=info,streamboot_shared=info".into()
            }),
        )
        .with_ansi(false)
        .with_writer(sink.clone())
        .init();

    info!("=== streamboot ===");
    config::log_warnings(&config_warnings);

    let viewer = match config.view_addr {
        Some(addr) => Some(viewer::serve(addr, sink.clone()).await?),
        None => None,
    };

    let file_secrets = match TomlSecrets::load(&config.secrets_file) {
        Ok(secrets) => secrets,
        Err(e) => {
            error!("Ignoring secrets file {}: {}", config.secrets_file.display(), e);
            TomlSecrets::default()
        }
    };
    let secrets = LayeredSecrets::new().layer(file_secrets).layer(EnvSecrets);

    let downloader = BundleDownloader::new(config.clone(), secrets);
    let report = startup::start_app(&downloader, || app::resolve_application(&config)).await;

    match &report {
        StartupReport::AppFinished => info!("Bootstrap complete"),
        other => info!("Bootstrap ended: {:?}", other),
    }

    if let Some((addr, handle)) = viewer {
        info!("Log viewer still serving on http://{} (Ctrl-C to exit)", addr);
        tokio::signal::ctrl_c().await?;
        handle.abort();
    }

    Ok(())
}

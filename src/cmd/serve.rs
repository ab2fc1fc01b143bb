//! Web server command: `blj-web serve`.

use anyhow::Result;
use blj_web::settings::ServerSettings;

pub struct ServeArgs {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub open: bool,
    pub dev: bool,
}

pub async fn cmd_serve(mut settings: ServerSettings, args: ServeArgs) -> Result<()> {
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(host) = args.host {
        settings.host = host;
    }
    settings.dev |= args.dev;

    tracing::info!(
        config_dir = %settings.config_dir.display(),
        pipelines_dir = %settings.pipelines_dir.display(),
        program = %settings.launcher.program,
        "Starting blj-web"
    );

    // No browser inside a dev container.
    if args.open && !args.dev {
        let url = format!("http://localhost:{}", settings.port);
        tokio::spawn(async move {
            // Give the listener a moment to bind.
            tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
            if let Err(e) = open::that(&url) {
                tracing::warn!(error = %e, "Failed to open browser");
            }
        });
    }

    blj_web::server::start_server(settings).await
}


use anyhow::{Context, Result, anyhow};
use clap::Parser;
use psegli::cli::{Cli, Command};
use psegli::config::Config;
use psegli::cookies::Credential;
use psegli::coordinator::SyncCoordinator;
use psegli::gateway::{AcquireOutcome, CookieGateway};
use psegli::logging::init_logging;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from(cli.config.as_deref())
        .map_err(|e| anyhow!("Failed to load configuration: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    init_logging(&config.logging).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    info!("psegli {} starting", env!("APP_VERSION"));

    match cli.command {
        Command::Gateway => psegli::web::serve(&config.gateway, &config.utility.url_root).await,
        Command::Sync { days_back } => {
            let coordinator = start_coordinator(&config).await?;
            let days_back = days_back.unwrap_or(config.utility.days_back);
            let report = coordinator
                .run_sync(days_back)
                .await
                .context("Sync failed")?;
            info!(
                "Imported {} records into {:?}",
                report.records, report.statistics
            );
            Ok(())
        }
        Command::Run => {
            if !config.sync.enabled {
                return Err(anyhow!("Scheduled sync is disabled (sync.enabled = false)"));
            }
            let coordinator = start_coordinator(&config).await?;
            let interval = Duration::from_secs(config.sync.interval_minutes * 60);
            tokio::select! {
                _ = coordinator.run_scheduler(interval) => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    info!("Shutdown requested");
                    Ok(())
                }
            }
        }
        Command::RefreshCookie => {
            config.require_credentials()?;
            let coordinator = SyncCoordinator::from_config(&config)?;
            let bundle = coordinator
                .refresh_cookie()
                .await
                .context("Cookie refresh failed")?;
            info!("Cookie refreshed ({} values)", bundle.len());
            Ok(())
        }
        Command::Acquire => {
            config.require_credentials()?;
            let gateway = CookieGateway::from_config(&config.gateway)?;
            let credential = Credential::new(
                config.account.username.as_str(),
                config.account.password.as_str(),
            );
            match gateway.acquire(&credential).await {
                AcquireOutcome::Cookies(bundle) => {
                    println!("{}", bundle.to_header_string());
                    Ok(())
                }
                other => {
                    error!("No cookies obtained: {:?}", other);
                    Err(anyhow!("Login did not produce cookies"))
                }
            }
        }
    }
}

async fn start_coordinator(config: &Config) -> Result<SyncCoordinator> {
    config.require_credentials()?;
    let coordinator = SyncCoordinator::from_config(config)?;
    let initial = coordinator
        .initial_cookie(config.account.cookie.as_deref())
        .await;
    coordinator
        .startup(initial)
        .await
        .context("Startup failed")?;
    Ok(coordinator)
}

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use notebook_launcher::app;
use notebook_launcher::app::Application;
use notebook_launcher::config::Cli;
use notebook_launcher::config::Commands;
use notebook_launcher::config::LaunchArgs;
use notebook_launcher::config::ServeArgs;
use notebook_launcher::orchestrator::LaunchOutcome;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();
    utils::logging::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(serve_args) => run_serve(serve_args).await,
        Commands::Launch(launch_args) => run_launch(launch_args).await,
    }
}

async fn run_serve(serve_args: ServeArgs) -> Result<()> {
    tracing::info!("Starting notebook launcher {}", &**version::VERSION);

    let app = Application::build(&serve_args)
        .await
        .context("failed to build launch service")?;
    app.run().await
}

async fn run_launch(launch_args: LaunchArgs) -> Result<()> {
    let coordinator = app::build_coordinator(&launch_args.orchestrator)
        .await
        .context("failed to prepare launch")?;

    tracing::info!(requester = %launch_args.requester, "Launching notebook");
    let report = coordinator.launch().await;

    match (report.outcome, report.url) {
        (LaunchOutcome::Ready, Some(url)) => {
            println!("{url}");
            Ok(())
        }
        (LaunchOutcome::NoCapacity, _) => anyhow::bail!("No GPU is free on any node"),
        (LaunchOutcome::CredentialTimeout, _) => anyhow::bail!(
            "Notebook {} is running but its token was not found in time",
            report.workload.unwrap_or_default()
        ),
        (LaunchOutcome::Failed(failure), _) => anyhow::bail!("Launch failed: {failure}"),
        (LaunchOutcome::Ready, None) => anyhow::bail!("Launch finished without a URL"),
    }
}

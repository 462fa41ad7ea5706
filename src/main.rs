#[macro_use]
extern crate tracing;

use std::{future::Future, path::PathBuf, sync::Arc};

use structopt::StructOpt;
use tokio::runtime::Builder;

use lumen::{
    artnet::{self, Transmitter},
    controller::Controller,
    engine::Engine,
    models::Config,
    programs::{CsvSource, ProgramRegistry, RetryPolicy},
    settings::SettingsStore,
};

#[derive(Debug, StructOpt)]
struct Opts {
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u32,
    #[structopt(short, long = "config")]
    config_path: Option<PathBuf>,
    /// Program table, overrides the configuration
    #[structopt(long)]
    programs: Option<PathBuf>,
    /// Settings document, overrides the configuration
    #[structopt(long)]
    settings: Option<PathBuf>,
    #[structopt(long)]
    dump_config: bool,
}

async fn run(opts: Opts) -> color_eyre::eyre::Result<()> {
    // Load configuration
    let mut config = match opts.config_path.as_deref() {
        Some(config_path) => Config::load_file(config_path).await?,
        None => Config::default(),
    };

    if let Some(programs) = opts.programs {
        config.programs = programs;
    }
    if let Some(settings) = opts.settings {
        config.settings = settings;
    }

    // Dump configuration if this was asked
    if opts.dump_config {
        print!("{}", config.to_string()?);
        return Ok(());
    }

    // Registered before anything is started so SIGTERM never takes the default exit path
    let shutdown = shutdown_signal()?;

    info!(
        version = option_env!("LUMEN_VERSION_ID").unwrap_or(env!("CARGO_PKG_VERSION")),
        "starting lumend"
    );

    // Program table and settings document
    let programs = Arc::new(
        ProgramRegistry::load(&CsvSource::new(&config.programs), RetryPolicy::default()).await?,
    );
    let settings = Arc::new(SettingsStore::load(config.settings.clone()).await);

    // Lighting controller
    let transmitter = Transmitter::new(artnet::from_config(&config.artnet.output), &config.artnet);
    let (controller, controller_task) = Controller::spawn(transmitter, config.artnet.heartbeat());

    let engine = Engine::new(
        controller.clone(),
        programs,
        settings,
        Arc::new(config.screensaver.clone()),
    );

    if config.blackout_on_start {
        if let Err(error) = engine.blackout().await {
            warn!(error = %error, "initial blackout failed");
        }
    }

    let watchdog = engine.spawn_watchdog();

    // Start the control server
    let _control_server = if config.control.enable {
        Some(
            lumen::servers::bind(
                "Control",
                config.control.clone(),
                engine.clone(),
                lumen::servers::control::handle_client,
            )
            .await?,
        )
    } else {
        None
    };

    let signal = shutdown.await;
    info!(signal, "shutting down");

    watchdog.abort();
    engine.stop_screensaver().await;

    if config.blackout_on_exit {
        if let Err(error) = engine.blackout().await {
            warn!(error = %error, "final blackout failed");
        }
    }

    controller.stop().await.ok();
    controller_task.await?;

    Ok(())
}

/// Resolves with the name of the first termination signal received
#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> std::io::Result<impl Future<Output = &'static str>> {
    Ok(async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(error = %error, "cannot listen for Ctrl-C");
        }

        "Ctrl-C"
    })
}

fn install_tracing(opts: &Opts) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let fmt_layer = fmt::layer();

    let filter_layer = EnvFilter::try_from_env("LUMEN_LOG").unwrap_or_else(|_| {
        EnvFilter::new(match opts.verbose {
            0 => "lumen=warn,lumend=warn",
            1 => "lumen=info,lumend=info",
            2 => "lumen=debug,lumend=debug",
            _ => "lumen=trace,lumend=trace",
        })
    });

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .try_init()
}

#[paw::main]
fn main(opts: Opts) -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    install_tracing(&opts)?;

    // Create tokio runtime
    let thd_count = match num_cpus::get() {
        1 => 2,
        other => other.min(4),
    };

    let rt = Builder::new_multi_thread()
        .worker_threads(thd_count)
        .enable_all()
        .build()?;
    rt.block_on(run(opts))
}

//! Daemon lifecycle: load config, wire the state engine and its
//! collaborators, bind the control server, and run until shutdown.

use std::sync::Arc;

use tokio::sync::Notify;

use crate::config::DaemonConfig;
use crate::engine::{RetryEvent, RetryScheduler, StateEngine};
use crate::error::DaemonError;
use crate::probe::{NullProbeRunner, ProbeRunner, SweepOptions};
use crate::resolver::{NoopPlatformHooks, PlatformHooks, ResolverHookArbiter, UnixPlatformHooks};
use crate::server::state::DaemonState;
use crate::server::{listener, tls};
use crate::update::NoopUpdateNotifier;

/// Sets up `tracing-subscriber` with an `EnvFilter` sourced from
/// `RUST_LOG` (falling back to the config's `log_level`) and a
/// non-blocking stdout writer, matching the layered-subscriber style
/// used elsewhere in the ambient stack.
pub fn init_tracing(default_level: &str) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    guard
}

pub struct BootstrapArgs {
    pub config_path: std::path::PathBuf,
    pub control_port_override: Option<u16>,
}

pub async fn run(args: BootstrapArgs) -> Result<(), DaemonError> {
    let mut config = DaemonConfig::load(&args.config_path)
        .map_err(|e| DaemonError::Config(e.to_string()))?;
    if let Some(port) = args.control_port_override {
        config.control_port = port;
    }

    let hooks: Box<dyn PlatformHooks> = if config.noaction {
        Box::new(NoopPlatformHooks)
    } else {
        Box::new(UnixPlatformHooks)
    };
    let arbiter = ResolverHookArbiter::new(&config, hooks);

    let shutdown = Arc::new(Notify::new());
    let retry = Arc::new(RetryScheduler::new(config.retry.clone(), shutdown.clone()));

    let updater: Box<dyn crate::update::UpdateNotifier> = Box::new(NoopUpdateNotifier);
    let engine = Arc::new(StateEngine::new(
        arbiter,
        retry.clone(),
        updater,
        config.check_updates,
    ));

    let prober: Arc<dyn ProbeRunner> = Arc::new(NullProbeRunner);

    let state = DaemonState::new(config.clone(), engine.clone(), shutdown.clone());

    let acceptor = tls::build_acceptor(&config)?;

    let reprobe_task = {
        let retry = retry.clone();
        let engine = engine.clone();
        let prober = prober.clone();
        tokio::spawn(async move {
            retry
                .run_reprobe_loop(|event| dispatch_retry_event(event, &engine, &prober))
                .await;
        })
    };
    let tcp_task = {
        let retry = retry.clone();
        let engine = engine.clone();
        let prober = prober.clone();
        tokio::spawn(async move {
            retry
                .run_tcp_loop(|event| dispatch_retry_event(event, &engine, &prober))
                .await;
        })
    };

    let serve_task = {
        let state = state.clone();
        let acceptor = acceptor.clone();
        let prober = prober.clone();
        tokio::spawn(async move {
            if let Err(e) = listener::serve(state, acceptor, prober).await {
                tracing::error!(error = %e, "control server exited with error");
            }
        })
    };

    wait_for_shutdown(shutdown.clone()).await;
    state.request_shutdown();

    // teardown: best-effort farewell to connected panels, then release
    // the resolver hooks back to whatever owned them before us
    tokio::time::timeout(std::time::Duration::from_secs(2), async {
        state.registry.stop_all();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    })
    .await
    .ok();

    engine.uninstall_hooks();

    serve_task.abort();
    reprobe_task.abort();
    tcp_task.abort();

    Ok(())
}

fn dispatch_retry_event(event: RetryEvent, engine: &Arc<StateEngine>, prober: &Arc<dyn ProbeRunner>) {
    match event {
        RetryEvent::Reprobe | RetryEvent::TcpRecheck => {
            let candidates: Vec<String> = engine.probes().into_iter().map(|p| p.name).collect();
            let opts = SweepOptions {
                skip_http: engine.skip_http(),
                forced_insecure: false,
            };
            prober.start_sweep(candidates, opts);
        }
    }
}

/// Races SIGINT against SIGTERM (UNIX) so either a Ctrl-C or a service
/// manager's stop signal triggers the same graceful-shutdown path.
async fn wait_for_shutdown(shutdown: Arc<Notify>) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
            _ = term.recv() => tracing::info!("received SIGTERM, shutting down"),
            _ = shutdown.notified() => tracing::info!("shutdown requested via control channel"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
            _ = shutdown.notified() => tracing::info!("shutdown requested via control channel"),
        }
    }
}

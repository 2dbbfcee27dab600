//! Per-connection task: one spawned task per accepted panel connection.
//!
//! The handshake want-read/want-write cross-states from the original
//! state table collapse entirely here — `tokio_rustls::TlsAcceptor::accept`
//! drives the whole handshake internally and simply fails the future if
//! verification doesn't pass, so by the time this task has a `TlsStream`
//! the connection is already past `hs_read`/`hs_write`/`hs_want_*`. The
//! remaining states (`command_read`, `persist_read`, `persist_write`,
//! `persist_write_checkclose`) are modeled explicitly below.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

use crate::probe::ProbeRunner;
use crate::server::broadcast::{next_connection_id, StopRequest};
use crate::server::protocol::{
    parse_one_shot, parse_persistent, strip_version_prefix, OneShotCommand, PersistentCommand,
};
use crate::server::state::DaemonState;

const STOP_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

pub async fn handle_connection(
    tcp: TcpStream,
    acceptor: TlsAcceptor,
    state: DaemonState,
    prober: Arc<dyn ProbeRunner>,
) {
    let _permit = match state.active_slots.clone().try_acquire_owned() {
        Ok(p) => p,
        Err(_) => {
            tracing::warn!("max_active reached, dropping connection");
            return;
        }
    };

    let tls = match acceptor.accept(tcp).await {
        Ok(t) => t,
        Err(e) => {
            tracing::debug!(error = %e, "tls handshake failed");
            return;
        }
    };

    let mut reader = BufReader::new(tls);
    let mut line = String::new();
    line.clear();
    if read_line(&mut reader, &mut line).await.is_none() {
        return;
    }

    let rest = match strip_version_prefix(line.trim_end()) {
        Ok(rest) => rest.to_string(),
        Err(e) => {
            tracing::debug!(?e, "rejecting connection: bad version prefix");
            return;
        }
    };

    match parse_one_shot(&rest) {
        Ok(cmd) => run_one_shot(cmd, reader, state, prober).await,
        Err(e) => {
            tracing::debug!(?e, "unknown one-shot command");
            let _ = write_line(&mut reader, "error unknown command\n").await;
        }
    }
}

async fn read_line<S: tokio::io::AsyncRead + Unpin>(
    reader: &mut BufReader<S>,
    buf: &mut String,
) -> Option<()> {
    buf.clear();
    match reader.read_line(buf).await {
        Ok(0) => None,
        Ok(_) => Some(()),
        Err(_) => None,
    }
}

async fn write_line<S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin>(
    reader: &mut BufReader<S>,
    line: &str,
) -> std::io::Result<()> {
    reader.get_mut().write_all(line.as_bytes()).await
}

async fn run_one_shot(
    cmd: OneShotCommand,
    mut reader: BufReader<TlsStream<TcpStream>>,
    state: DaemonState,
    prober: Arc<dyn ProbeRunner>,
) {
    use crate::probe::SweepOptions;

    match cmd {
        OneShotCommand::Submit(ips) => {
            let opts = SweepOptions {
                skip_http: state.engine.skip_http(),
                forced_insecure: false,
            };
            prober.start_sweep(ips, opts);
        }
        OneShotCommand::Reprobe => {
            state.engine.begin_reprobe();
            let candidates: Vec<String> = state
                .engine
                .probes()
                .into_iter()
                .map(|p| p.name)
                .collect();
            let opts = SweepOptions {
                skip_http: state.engine.skip_http(),
                forced_insecure: false,
            };
            prober.start_sweep(candidates, opts);
        }
        OneShotCommand::SkipHttp => {
            state.engine.set_skip_http();
            let candidates: Vec<String> = state
                .engine
                .probes()
                .into_iter()
                .map(|p| p.name)
                .collect();
            prober.start_sweep(
                candidates,
                SweepOptions {
                    skip_http: true,
                    forced_insecure: false,
                },
            );
        }
        OneShotCommand::HotspotSignon => {
            state.engine.hotspot_signon();
        }
        OneShotCommand::Results => {
            let block = state.engine.render_results_block();
            let _ = write_line(&mut reader, &block).await;
            upgrade_to_persistent(reader, state, prober, false).await;
            return;
        }
        OneShotCommand::Status => {
            let block = state.engine.render_results_block();
            let _ = write_line(&mut reader, &block).await;
            let _ = reader.get_mut().shutdown().await;
            return;
        }
        OneShotCommand::CmdTray => {
            upgrade_to_persistent(reader, state, prober, true).await;
            return;
        }
        OneShotCommand::Unsafe
        | OneShotCommand::TestTcp
        | OneShotCommand::TestSsl
        | OneShotCommand::TestHttp
        | OneShotCommand::TestUpdate => {
            // Probe-collaborator test entries: out of scope for the core
            // state machine, delegated entirely to the probe collaborator.
            tracing::debug!(?cmd, "test command received");
        }
        OneShotCommand::StopPanels => {
            state.registry.stop_all();
        }
        OneShotCommand::Stop => {
            state.request_shutdown();
        }
    }

    let _ = reader.get_mut().shutdown().await;
}

/// `results`/`status` both render once; `cmdtray` subscribes without an
/// initial push. All three end up parked on the persistent read/write
/// loop below, registered with the panel registry so `stoppanels` can
/// reach them.
async fn upgrade_to_persistent(
    mut reader: BufReader<TlsStream<TcpStream>>,
    state: DaemonState,
    prober: Arc<dyn ProbeRunner>,
    is_cmdtray: bool,
) {
    let conn_id = next_connection_id();
    let (stop_tx, mut stop_rx) = mpsc::unbounded_channel();
    state.registry.register(conn_id, stop_tx);

    let mut updates = state.engine.subscribe();
    let mut line_buf = String::new();

    loop {
        tokio::select! {
            biased;

            _ = stop_rx.recv() => {
                let _ = tokio::time::timeout(
                    STOP_WRITE_TIMEOUT,
                    write_line(&mut reader, "stop\n"),
                ).await;
                break;
            }
            update = updates.recv() => {
                match update {
                    Ok(block) => {
                        if write_line(&mut reader, &block).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            got = read_line(&mut reader, &mut line_buf) => {
                match got {
                    None => break,
                    Some(()) => {
                        if is_cmdtray {
                            if let Some(cmd) = parse_persistent(&line_buf) {
                                dispatch_persistent(cmd, &state, &prober);
                            } else if !line_buf.trim().is_empty() {
                                tracing::debug!(line = %line_buf.trim(), "unknown persistent command ignored");
                            }
                        }
                    }
                }
            }
        }
    }

    state.registry.unregister(conn_id);
    let _ = reader.get_mut().shutdown().await;
}

fn dispatch_persistent(cmd: PersistentCommand, state: &DaemonState, prober: &Arc<dyn ProbeRunner>) {
    use crate::probe::SweepOptions;

    match cmd {
        PersistentCommand::InsecureYes => state.engine.set_insecure(true),
        PersistentCommand::InsecureNo => state.engine.set_insecure(false),
        PersistentCommand::Reprobe => {
            state.engine.begin_reprobe();
            let candidates: Vec<String> = state
                .engine
                .probes()
                .into_iter()
                .map(|p| p.name)
                .collect();
            let opts = SweepOptions {
                skip_http: state.engine.skip_http(),
                forced_insecure: false,
            };
            prober.start_sweep(candidates, opts);
        }
        PersistentCommand::SkipHttp => {
            state.engine.set_skip_http();
            let candidates: Vec<String> = state
                .engine
                .probes()
                .into_iter()
                .map(|p| p.name)
                .collect();
            prober.start_sweep(
                candidates,
                SweepOptions {
                    skip_http: true,
                    forced_insecure: false,
                },
            );
        }
        PersistentCommand::HotspotSignon => state.engine.hotspot_signon(),
        PersistentCommand::UpdateOk => state.engine.user_replied_update(true),
        PersistentCommand::UpdateCancel => state.engine.user_replied_update(false),
    }
}

//! Control server transport: binds loopback-only listeners (v4 and v6
//! when available) and spawns one task per accepted connection.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use crate::probe::ProbeRunner;
use crate::server::connection::handle_connection;
use crate::server::state::DaemonState;

pub async fn serve(
    state: DaemonState,
    acceptor: TlsAcceptor,
    prober: Arc<dyn ProbeRunner>,
) -> std::io::Result<()> {
    let port = state.config().control_port;
    let v4 = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port))).await?;
    let v6 = TcpListener::bind(SocketAddr::from((Ipv6Addr::LOCALHOST, port))).await;

    tracing::info!(port, "control server listening on loopback");

    let shutdown = state.shutdown.clone();
    let v6_task = v6.ok().map(|listener| {
        tokio::spawn(accept_loop(
            listener,
            state.clone(),
            acceptor.clone(),
            prober.clone(),
            state.shutdown.clone(),
        ))
    });

    accept_loop(v4, state, acceptor, prober, shutdown).await;
    if let Some(task) = v6_task {
        let _ = task.await;
    }
    Ok(())
}

async fn accept_loop(
    listener: TcpListener,
    state: DaemonState,
    acceptor: TlsAcceptor,
    prober: Arc<dyn ProbeRunner>,
    shutdown: Arc<tokio::sync::Notify>,
) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => return,
            accepted = listener.accept() => {
                match accepted {
                    Ok((tcp, peer)) => {
                        tracing::trace!(%peer, "accepted control connection");
                        let state = state.clone();
                        let acceptor = acceptor.clone();
                        let prober = prober.clone();
                        tokio::spawn(async move {
                            handle_connection(tcp, acceptor, state, prober).await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    }
}

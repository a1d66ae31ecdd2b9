use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{InboundOptions, Options};
use crate::engine::{EngineFactory, EngineFuture, RoutingEngine};
use crate::error::EngineError;

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Factory for the built-in `direct` engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectFactory;

impl EngineFactory for DirectFactory {
    fn name(&self) -> &str {
        "direct"
    }

    fn build(
        &self,
        options: Options,
        cancel: CancellationToken,
    ) -> Result<Box<dyn RoutingEngine>, EngineError> {
        Ok(Box::new(DirectEngine::new(&options, &cancel)?))
    }
}

/// One `direct` inbound: a listen address and the fixed target it forwards to.
#[derive(Debug, Clone)]
struct Route {
    tag: String,
    listen: SocketAddr,
    target_host: String,
    target_port: u16,
}

impl Route {
    fn from_inbound(index: usize, inbound: &InboundOptions) -> Result<Self, EngineError> {
        let tag = if inbound.tag.is_empty() {
            format!("inbound[{index}]")
        } else {
            inbound.tag.clone()
        };

        if inbound.kind != "direct" {
            return Err(EngineError::InvalidConfig(format!(
                "{tag}: unsupported inbound type '{}'",
                inbound.kind
            )));
        }

        let ip: IpAddr = inbound.listen.parse().map_err(|e| {
            EngineError::InvalidConfig(format!("{tag}: invalid listen address '{}': {e}", inbound.listen))
        })?;

        let target_host = inbound
            .override_address
            .clone()
            .filter(|addr| !addr.is_empty())
            .ok_or_else(|| EngineError::InvalidConfig(format!("{tag}: missing override_address")))?;
        let target_port = inbound
            .override_port
            .filter(|port| *port != 0)
            .ok_or_else(|| EngineError::InvalidConfig(format!("{tag}: missing override_port")))?;

        Ok(Self {
            tag,
            listen: SocketAddr::new(ip, inbound.listen_port),
            target_host,
            target_port,
        })
    }
}

/// TCP port forwarder: every `direct` inbound relays accepted connections
/// byte-for-byte to its `override_address:override_port`.
///
/// All tasks hang off a child of the instance token, so cancelling the
/// instance or calling [`close`](RoutingEngine::close) stops them.
pub struct DirectEngine {
    routes: Vec<Route>,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    local_addrs: Vec<SocketAddr>,
    started: bool,
}

impl DirectEngine {
    pub fn new(options: &Options, cancel: &CancellationToken) -> Result<Self, EngineError> {
        let routes = options
            .inbounds
            .iter()
            .enumerate()
            .map(|(index, inbound)| Route::from_inbound(index, inbound))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(inbounds = routes.len(), "Direct engine constructed");

        Ok(Self {
            routes,
            cancel: cancel.child_token(),
            tasks: JoinSet::new(),
            local_addrs: Vec::new(),
            started: false,
        })
    }

    /// Addresses actually bound by `start`, in inbound order.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    async fn bind_all(&mut self) -> Result<(), EngineError> {
        if self.started {
            return Err(EngineError::Task("engine already started".into()));
        }

        // Bind everything first; a failure drops the listeners bound so far.
        let mut listeners = Vec::with_capacity(self.routes.len());
        for route in &self.routes {
            let listener = TcpListener::bind(route.listen)
                .await
                .map_err(|source| EngineError::Bind {
                    addr: route.listen.to_string(),
                    source,
                })?;
            listeners.push(listener);
        }

        for (route, listener) in self.routes.iter().zip(listeners) {
            let local = listener.local_addr()?;
            tracing::info!(
                tag = %route.tag,
                address = %local,
                forward_to = %format!("{}:{}", route.target_host, route.target_port),
                "Inbound listening"
            );
            self.local_addrs.push(local);
            self.tasks
                .spawn(serve(listener, route.clone(), self.cancel.clone()));
        }

        self.started = true;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), EngineError> {
        self.cancel.cancel();

        let mut failure = None;
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined
                && e.is_panic()
            {
                failure = Some(e.to_string());
            }
        }

        tracing::debug!(inbounds = self.local_addrs.len(), "Direct engine closed");

        match failure {
            Some(reason) => Err(EngineError::Task(reason)),
            None => Ok(()),
        }
    }
}

impl RoutingEngine for DirectEngine {
    fn start(&mut self) -> EngineFuture<'_> {
        Box::pin(self.bind_all())
    }

    fn close(&mut self) -> EngineFuture<'_> {
        Box::pin(self.shutdown())
    }
}

async fn serve(listener: TcpListener, route: Route, cancel: CancellationToken) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(relay(stream, peer, route.clone(), cancel.clone()));
                }
                Err(e) => {
                    tracing::warn!(tag = %route.tag, "Accept failed: {e}");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    connections.shutdown().await;
}

async fn relay(mut inbound: TcpStream, peer: SocketAddr, route: Route, cancel: CancellationToken) {
    let mut outbound =
        match TcpStream::connect((route.target_host.as_str(), route.target_port)).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(
                    tag = %route.tag,
                    peer = %peer,
                    "Failed to connect to {}:{}: {e}",
                    route.target_host,
                    route.target_port
                );
                return;
            }
        };

    tokio::select! {
        _ = cancel.cancelled() => {}
        copied = tokio::io::copy_bidirectional(&mut inbound, &mut outbound) => match copied {
            Ok((up, down)) => tracing::debug!(tag = %route.tag, peer = %peer, up, down, "Connection finished"),
            Err(e) => tracing::debug!(tag = %route.tag, peer = %peer, "Connection error: {e}"),
        },
    }
}

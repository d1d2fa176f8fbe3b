//! HTTPS server: accept loop in front of the TLS layer.
//!
//! # Responsibilities
//! - Accept connections under the listener's connection limit
//! - Spawn one binding task per connection with its own handler
//! - Stop accepting on shutdown and drain open connections
//!
//! # Design Decisions
//! - The server is generic over the session factory so it runs unchanged
//!   on any engine
//! - Each connection task carries a span with its ID and peer address

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use crate::config::TimeoutConfig;
use crate::http::handler::HttpHandler;
use crate::lifecycle::Shutdown;
use crate::net::binding::serve_connection;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Listener, ListenerError};
use crate::tls::{SessionFactory, TlsContext};

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

pub struct HttpsServer<F = TlsContext> {
    factory: Arc<F>,
    timeouts: TimeoutConfig,
    tracker: ConnectionTracker,
}

impl<F> HttpsServer<F>
where
    F: SessionFactory + 'static,
    F::Session: 'static,
{
    pub fn new(factory: Arc<F>, timeouts: TimeoutConfig) -> Self {
        Self {
            factory,
            timeouts,
            tracker: ConnectionTracker::new(),
        }
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Run until `shutdown` fires, then wait for open connections to drain.
    pub async fn run<H, M>(
        &self,
        listener: Listener,
        make_handler: M,
        shutdown: Shutdown,
    ) -> Result<(), ListenerError>
    where
        M: Fn() -> H,
        H: HttpHandler + 'static,
    {
        let mut stop = shutdown.subscribe();
        if let Ok(address) = listener.local_addr() {
            tracing::info!(address = %address, "HTTPS server starting");
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr, permit)) => {
                        let guard = self.tracker.track();
                        let id = guard.id();
                        let span = tracing::info_span!("connection", connection_id = %id, peer_addr = %peer_addr);
                        let factory = Arc::clone(&self.factory);
                        let handler = make_handler();
                        let timeouts = self.timeouts.clone();
                        let stop = shutdown.subscribe();

                        tokio::spawn(
                            async move {
                                let _permit = permit;
                                let _guard = guard;
                                if let Err(e) = serve_connection(
                                    stream, id, peer_addr, factory, handler, timeouts, stop,
                                )
                                .await
                                {
                                    tracing::warn!(error = %e, "Connection not served");
                                }
                            }
                            .instrument(span),
                        );
                    }
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                    Err(e) => return Err(e),
                },
                _ = stop.recv() => break,
            }
        }

        tracing::info!(
            active_connections = self.tracker.active_count(),
            "Stopped accepting; draining connections"
        );
        if !self
            .tracker
            .wait_for_shutdown(self.timeouts.drain())
            .await
        {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain timeout elapsed with connections still open"
            );
        }
        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

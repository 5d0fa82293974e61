use anyhow::Context;
use axum::Router;
use axum_server::Handle;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::io;
use std::net::SocketAddr;
use std::net::TcpListener;
use std::time::Duration;
use tracing::info;

/// The HTTP server of the event router, bound but not yet awaited.
pub struct RouterServer {
    local_addr: SocketAddr,
    handle: Handle,
    fut: BoxFuture<'static, io::Result<()>>,
}

impl RouterServer {
    pub fn try_bind(app: Router, address: SocketAddr) -> anyhow::Result<Self> {
        let listener =
            TcpListener::bind(address).with_context(|| format!("binding to {address}"))?;
        listener
            .set_nonblocking(true)
            .with_context(|| format!("configuring listener on {address}"))?;
        let local_addr = listener
            .local_addr()
            .context("retrieving the listener address")?;
        info!("Launching on {local_addr} with HTTP");

        let handle = Handle::new();
        let fut = axum_server::from_tcp(listener)
            .handle(handle.clone())
            .serve(app.into_make_service())
            .boxed();

        Ok(RouterServer {
            local_addr,
            handle,
            fut,
        })
    }

    /// The address actually bound, which differs from the requested one when binding port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Stop accepting connections, letting in-flight requests complete within the given timeout
    pub fn graceful_shutdown(&self, timeout: Duration) {
        self.handle.graceful_shutdown(Some(timeout))
    }

    pub fn wait(self) -> BoxFuture<'static, io::Result<()>> {
        self.fut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    #[tokio::test]
    async fn binding_port_zero_reports_the_actual_port() {
        let app = Router::new().route("/", get(|| async { "ok" }));
        let server = RouterServer::try_bind(app, "127.0.0.1:0".parse().unwrap()).unwrap();

        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn binding_a_used_port_is_an_error() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = taken.local_addr().unwrap();

        let err = RouterServer::try_bind(Router::new(), address)
            .err()
            .expect("address in use");

        assert_eq!(err.to_string(), format!("binding to {address}"));
    }

    #[tokio::test]
    async fn graceful_shutdown_completes_the_server_future() {
        let app = Router::new().route("/", get(|| async { "ok" }));
        let server = RouterServer::try_bind(app, "127.0.0.1:0".parse().unwrap()).unwrap();
        let handle = server.handle();
        let running = tokio::spawn(server.wait());

        handle.graceful_shutdown(Some(Duration::from_secs(1)));

        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("server stopped")
            .unwrap()
            .unwrap();
    }
}

use axum::handler::Handler;
use axum::routing::get;
use axum::Router;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::routes;
use crate::RelayAxumState;

#[derive(Clone)]
pub struct RelayAxum {
    pub state: RelayAxumState,
    pub router: Router<()>,
}

impl RelayAxum {
    pub fn new(state: RelayAxumState) -> Self {
        let router = routes::router().with_state(state.clone());
        Self { state, router }
    }

    pub fn use_router(mut self, path: &str, router: Router<()>) -> Self {
        self.router = self.router.nest(path, router);
        self
    }

    pub fn service<H, T>(mut self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()> + Clone + Send + 'static,
        T: 'static,
    {
        self.router = self.router.route(path, get(handler));
        self
    }

    /// The finished router. Every response carries an `x-request-id`,
    /// generated unless the caller sent one.
    pub fn into_router(self) -> Router<()> {
        self.router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "relay listening");
        axum::serve(listener, self.into_router()).await?;
        Ok(())
    }
}

pub fn axum(state: RelayAxumState) -> RelayAxum {
    RelayAxum::new(state)
}

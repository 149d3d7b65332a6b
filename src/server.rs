use std::convert::Infallible;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use log::{debug, error, info};
use tokio::net::{TcpListener, TcpStream};

use crate::handler::{Application, Authenticator, NtlmHandler, empty_response};
use crate::state::{ConnectionAuthState, ConnectionId};


/// Serves HTTP/1.1 with one [`ConnectionId`] per accepted socket.
pub struct Server<A, D> {
    listener: TcpListener,
    handler: Arc<NtlmHandler<A, D>>,
    next_connection: AtomicU64,
}
impl<A, D> Server<A, D>
where
    A: Authenticator + 'static,
    D: Application + 'static,
{
    pub async fn bind(address: SocketAddr, handler: NtlmHandler<A, D>) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self {
            listener,
            handler: Arc::new(handler),
            next_connection: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> Arc<ConnectionAuthState> {
        Arc::clone(self.handler.state())
    }

    pub async fn run(self) -> io::Result<()> {
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(v) => v,
                Err(e) => {
                    error!("accept failed: {}", e);
                    continue;
                },
            };

            let conn_id = ConnectionId::new(self.next_connection.fetch_add(1, Ordering::Relaxed));
            debug!("{}: accepted from {}", conn_id, addr);

            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                serve_connection(stream, conn_id, handler).await;
                debug!("{}: closed ({})", conn_id, addr);
            });
        }
    }
}

async fn serve_connection<A, D>(stream: TcpStream, conn_id: ConnectionId, handler: Arc<NtlmHandler<A, D>>)
where
    A: Authenticator + 'static,
    D: Application + 'static,
{
    let io = TokioIo::new(stream);
    let service_handler = Arc::clone(&handler);
    let service = service_fn(move |request| {
        let handler = Arc::clone(&service_handler);
        async move { handle_request(request, conn_id, &handler).await }
    });

    let result = http1::Builder::new()
        .keep_alive(true)
        .serve_connection(io, service)
        .await;
    if let Err(e) = result {
        debug!("{}: connection error: {}", conn_id, e);
    }

    // the identity dies with the socket
    if let Some(principal) = handler.state().forget(conn_id) {
        info!("{}: {:?} logged off", conn_id, principal);
    }
}

async fn handle_request<A, D, B>(request: Request<B>, conn_id: ConnectionId, handler: &NtlmHandler<A, D>) -> Result<Response<Full<Bytes>>, Infallible>
where
    A: Authenticator,
    D: Application,
    B: Body,
    B::Error: fmt::Display,
{
    let (parts, body) = request.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!("{}: failed to read request body: {}", conn_id, e);
            return Ok(empty_response(StatusCode::BAD_REQUEST));
        },
    };
    debug!("{}: {} {}", conn_id, parts.method, parts.uri);
    Ok(handler.handle(Request::from_parts(parts, body), conn_id))
}

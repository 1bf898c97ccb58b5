// Server builder and connection listener

use crate::interceptor::default_response;
use crate::{
    ConnectionTracker, Engine, Error, ErrorInterceptor, HttpMethod, HttpRequest, HttpStatus,
    IntoHandler, MethodFilter, ParseStatus, RequestSummary, Router, ServerOptions, parse_request,
};
use bytes::{Buf, BytesMut};
use futures_util::future::Either;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

macro_rules! verb_methods {
    ($($name:ident => $method:ident),+ $(,)?) => {
        $(
            #[doc = concat!("Register a `", stringify!($method), "` route.")]
            pub fn $name<H, Args>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, Error>
            where
                H: IntoHandler<Args>,
            {
                self.route(HttpMethod::$method, pattern, handler)
            }
        )+
    };
}

/// Collects routes and options, then starts listening.
///
/// ```no_run
/// use aou_core::{Error, HttpRequest, Server};
///
/// async fn hello(_req: HttpRequest) -> Result<&'static str, Error> {
///     Ok("hello")
/// }
///
/// # async fn run() -> Result<(), Error> {
/// let mut server = Server::new();
/// server.get("/", hello)?;
/// let instance = server.listen("127.0.0.1", 3000).await?;
/// println!("listening on {}:{}", instance.ip(), instance.port());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct Server {
    router: Router,
    options: ServerOptions,
    interceptor: ErrorInterceptor,
}

impl Server {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ServerOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &ServerOptions {
        &self.options
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Register `handler` for `method` and `pattern`.
    ///
    /// Invalid patterns fail here, never at request time.
    pub fn route<H, Args>(
        &mut self,
        method: impl Into<MethodFilter>,
        pattern: &str,
        handler: H,
    ) -> Result<&mut Self, Error>
    where
        H: IntoHandler<Args>,
    {
        self.router.add(method, pattern, handler)?;
        Ok(self)
    }

    verb_methods! {
        get => GET,
        head => HEAD,
        post => POST,
        put => PUT,
        delete => DELETE,
        connect => CONNECT,
        options => OPTIONS,
        trace => TRACE,
        patch => PATCH,
    }

    /// Register a route matched on path alone, for every method.
    pub fn all<H, Args>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, Error>
    where
        H: IntoHandler<Args>,
    {
        self.route(MethodFilter::All, pattern, handler)
    }

    /// Handler for requests no route matches, replacing the default 404.
    pub fn fallback<H, Args>(&mut self, handler: H) -> &mut Self
    where
        H: IntoHandler<Args>,
    {
        self.router.set_fallback(handler);
        self
    }

    /// Observe every error the interceptor handles.
    pub fn on_error<F>(&mut self, observer: F) -> &mut Self
    where
        F: Fn(&Error, &RequestSummary) + Send + Sync + 'static,
    {
        self.interceptor.add_observer(observer);
        self
    }

    /// Freeze the configuration into a socket-free pipeline.
    pub fn into_engine(self) -> Engine {
        Engine::new(self.router, self.options, self.interceptor)
    }

    /// Bind `host:port` and start accepting connections in the background.
    ///
    /// Port `0` picks a free port; the bound address is available on the
    /// returned instance.
    pub async fn listen(self, host: &str, port: u16) -> Result<ServerInstance, Error> {
        let addr = format!("{host}:{port}");
        let bind_error = |source| Error::Bind {
            addr: addr.clone(),
            source,
        };

        let listener = TcpListener::bind((host, port)).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let engine = self.into_engine();
        let grace = engine.options().shutdown_grace();
        let tracker = ConnectionTracker::new();
        let running = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            address = %local_addr,
            routes = engine.router().len(),
            "Server listening"
        );

        let accept_task = tokio::spawn(accept_loop(
            listener,
            engine,
            tracker.clone(),
            running.clone(),
            shutdown_rx,
        ));

        Ok(ServerInstance {
            local_addr,
            running,
            shutdown: shutdown_tx,
            tracker,
            accept_task,
            grace,
        })
    }
}

/// Handle to a listening server.
///
/// Dropping the handle leaves the server running for the life of the
/// runtime; call [`ServerInstance::shutdown`] to stop it.
#[derive(Debug)]
pub struct ServerInstance {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    tracker: ConnectionTracker,
    accept_task: JoinHandle<()>,
    grace: Duration,
}

impl ServerInstance {
    pub fn ip(&self) -> IpAddr {
        self.local_addr.ip()
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Stop accepting, close idle connections and wait for in-flight ones.
    ///
    /// Returns true if every connection finished within the grace period.
    pub async fn shutdown(&self) -> bool {
        info!(address = %self.local_addr, "Shutting down server");
        self.tracker.stop_accepting();
        self.shutdown.send_replace(true);
        self.accept_task.abort();
        self.running.store(false, Ordering::Release);
        self.tracker.drain(self.grace).await
    }
}

/// Resolves once shutdown is signalled. Never resolves if the instance
/// handle was dropped without shutting down.
async fn shutdown_signal(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    engine: Engine,
    tracker: ConnectionTracker,
    running: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_signal(&mut shutdown) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let Some(guard) = tracker.track() else {
                        break;
                    };
                    let engine = engine.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        let _guard = guard;
                        if let Err(err) = serve_connection(stream, peer, engine, shutdown).await {
                            debug!(peer = %peer, error = %err, "Connection ended with error");
                        }
                    });
                }
                Err(err) => {
                    warn!(error = %err, "Failed to accept connection");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            },
        }
    }

    running.store(false, Ordering::Release);
    info!("Stopped accepting connections");
}

/// Serve requests on one connection until it closes, errors, or the
/// client opts out of keep-alive.
async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    engine: Engine,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Error> {
    let _ = stream.set_nodelay(true);
    let limits = engine.options().parse_limits();
    let read_timeout = engine.options().read_timeout();
    let read_cap = limits.max_head_bytes.saturating_add(limits.max_body_bytes);
    let mut buf = BytesMut::with_capacity(4096);
    let mut out = BytesMut::with_capacity(4096);

    loop {
        // Serve everything already buffered before reading again.
        match parse_request(&buf, &limits) {
            Ok(ParseStatus::Complete { request, consumed }) => {
                buf.advance(consumed);
                let responded = respond_while_connected(
                    &engine, request, &mut stream, &mut buf, &mut out, read_cap,
                )
                .await;
                let Some(keep_alive) = responded else {
                    debug!(peer = %peer, "Client disconnected, abandoning request");
                    break;
                };
                stream.write_all(&out).await?;
                out.clear();
                if !keep_alive || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            Ok(ParseStatus::Partial) => {}
            Err(err) => {
                debug!(peer = %peer, error = %err, "Rejecting malformed request");
                engine.reject(err, &mut out);
                stream.write_all(&out).await?;
                break;
            }
        }

        let idle = buf.is_empty();
        let read = tokio::select! {
            read = timeout(read_timeout, stream.read_buf(&mut buf)) => read,
            _ = shutdown_signal(&mut shutdown), if idle => break,
        };

        match read {
            Ok(Ok(0)) => {
                if !idle {
                    debug!(peer = %peer, "Client closed connection mid-request");
                }
                break;
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => {
                debug!(peer = %peer, idle, "Read timed out");
                if !idle {
                    default_response(HttpStatus::RequestTimeout).write_wire(&mut out, false, false);
                    stream.write_all(&out).await?;
                }
                break;
            }
        }
    }

    let _ = stream.shutdown().await;
    Ok(())
}

/// Run the pipeline for `request` while watching the socket.
///
/// Bytes the client pipelines in the meantime are appended to `buf` (up to
/// `read_cap`). Returns `None`, dropping the pipeline future, if the peer
/// closes or the read fails before the response is ready.
async fn respond_while_connected(
    engine: &Engine,
    request: HttpRequest,
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    out: &mut BytesMut,
    read_cap: usize,
) -> Option<bool> {
    let respond = engine.respond(request, out);
    tokio::pin!(respond);

    loop {
        let step = tokio::select! {
            keep_alive = &mut respond => Either::Left(keep_alive),
            read = stream.read_buf(buf), if buf.len() < read_cap => Either::Right(read),
        };
        match step {
            Either::Left(keep_alive) => return Some(keep_alive),
            Either::Right(Ok(0)) | Either::Right(Err(_)) => return None,
            Either::Right(Ok(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    async fn hello(_req: HttpRequest) -> Result<&'static str, Error> {
        Ok("hello")
    }

    async fn roundtrip(instance: &ServerInstance, raw: &[u8]) -> String {
        let mut stream = TcpStream::connect(instance.local_addr()).await.unwrap();
        stream.write_all(raw).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8(response).unwrap()
    }

    #[test]
    fn test_verb_registration() {
        let mut server = Server::new();
        server
            .get("/a", hello)
            .unwrap()
            .post("/a", hello)
            .unwrap()
            .all("/{*rest}", hello)
            .unwrap();
        let methods: Vec<_> = server.router().routes().iter().map(|r| r.method).collect();
        assert_eq!(
            methods,
            [
                MethodFilter::Only(HttpMethod::GET),
                MethodFilter::Only(HttpMethod::POST),
                MethodFilter::All
            ]
        );
    }

    #[test]
    fn test_invalid_pattern_is_a_configuration_error() {
        let mut server = Server::new();
        assert!(matches!(
            server.get("/{id}/{id}", hello),
            Err(Error::InvalidPattern(_))
        ));
    }

    #[tokio::test]
    async fn test_listen_reports_bound_address() {
        let mut server = Server::new();
        server.get("/", hello).unwrap();
        let instance = server.listen("127.0.0.1", 0).await.unwrap();

        assert_eq!(instance.ip(), IpAddr::from([127, 0, 0, 1]));
        assert_ne!(instance.port(), 0);
        assert!(instance.is_running());

        let response = roundtrip(
            &instance,
            b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("hello"));

        assert!(instance.shutdown().await);
        assert!(!instance.is_running());
    }

    #[tokio::test]
    async fn test_bind_error() {
        let first = Server::new().listen("127.0.0.1", 0).await.unwrap();
        let err = Server::new()
            .listen("127.0.0.1", first.port())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Bind { .. }));
        first.shutdown().await;
    }

    #[tokio::test]
    async fn test_pipelined_requests_on_one_connection() {
        let mut server = Server::new();
        server.get("/", hello).unwrap();
        let instance = server.listen("127.0.0.1", 0).await.unwrap();

        let response = roundtrip(
            &instance,
            b"GET / HTTP/1.1\r\nHost: x\r\n\r\nGET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert_eq!(response.matches("HTTP/1.1 200 OK").count(), 2);
        instance.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_request_gets_400_and_close() {
        let instance = Server::new().listen("127.0.0.1", 0).await.unwrap();
        let response = roundtrip(&instance, b"NOT A REQUEST\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.contains("Connection: close\r\n"));
        instance.shutdown().await;
    }

    #[tokio::test]
    async fn test_client_disconnect_abandons_handler() {
        let started = Arc::new(Notify::new());
        let finished = Arc::new(AtomicUsize::new(0));
        let mut server = Server::new();
        {
            let started = started.clone();
            let finished = finished.clone();
            server
                .get("/slow", move |_req: HttpRequest| {
                    let started = started.clone();
                    let finished = finished.clone();
                    async move {
                        started.notify_one();
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, Error>("done")
                    }
                })
                .unwrap();
        }
        let instance = server.listen("127.0.0.1", 0).await.unwrap();

        let mut stream = TcpStream::connect(instance.local_addr()).await.unwrap();
        stream
            .write_all(b"GET /slow HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        started.notified().await;
        drop(stream);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert_eq!(instance.active_connections(), 0);
        instance.shutdown().await;
    }

    #[tokio::test]
    async fn test_read_timeout_on_partial_request() {
        let options = ServerOptions::new().read_timeout_ms(50);
        let instance = Server::with_options(options)
            .listen("127.0.0.1", 0)
            .await
            .unwrap();
        let response = roundtrip(&instance, b"GET / HTTP/1.1\r\nHost: x\r\n").await;
        assert!(response.starts_with("HTTP/1.1 408 Request Timeout\r\n"));
        instance.shutdown().await;
    }
}

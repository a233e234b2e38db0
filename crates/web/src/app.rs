//! The top-level application instance.
//!
//! [`Ember`] ties the pieces together: it owns the application-level
//! [`Injector`] shared by all requests, the [`Router`], the global
//! middleware chain and the before-hooks. It dereferences to its router, so
//! route registration happens directly on the instance:
//!
//! ```ignore
//! let mut app = Ember::new();
//! app.map_to::<dyn Database>(Arc::new(Postgres::connect(url).await?));
//! app.use_handler(logger);
//! app.get("/hello/{name}", hello);
//! app.run().await;
//! ```
//!
//! Registration (routes, middleware, injector mappings) is expected to
//! complete before serving starts; the shared state is read-only per
//! request afterwards.

use crate::context::Context;
use crate::env::EnvType;
use crate::handler::{BoxedHandler, IntoHandler};
use crate::inject::Injector;
use crate::request::Request;
use crate::response_writer::{ResponseSink, ResponseWriter};
use crate::return_handler::ReturnHandler;
use crate::router::{ContextCreator, Router};
use http::Uri;
use std::net::SocketAddr;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, RwLock};
use tokio::net::TcpListener;
use tracing::{error, info};

/// Environment variable overriding the listen address, as `host:port`.
pub const ADDR_VARIABLE: &str = "EMBER_ADDR";

const DEFAULT_ADDR: &str = "0.0.0.0:4000";

/// A hook run before route dispatch. Returning true short-circuits the
/// request; the hook is then responsible for the response.
pub type BeforeHandler = Box<dyn Fn(&ResponseWriter, &Request) -> bool + Send + Sync>;

#[derive(Default)]
struct AppChain {
    handlers: Vec<BoxedHandler>,
    action: Option<BoxedHandler>,
}

/// The web application: injector, router, global middleware and serving.
pub struct Ember {
    injector: Arc<Injector>,
    chain: Arc<RwLock<AppChain>>,
    befores: Vec<BeforeHandler>,
    url_prefix: String,
    router: Router,
}

impl Default for Ember {
    fn default() -> Self {
        Self::new()
    }
}

impl Ember {
    /// Creates a bare instance with the default return-value dispatcher
    /// mapped and no middleware.
    pub fn new() -> Self {
        let injector = Arc::new(Injector::new());
        injector.map(ReturnHandler::default());

        let chain = Arc::new(RwLock::new(AppChain::default()));

        let creator: ContextCreator = {
            let injector = injector.clone();
            let chain = chain.clone();
            Arc::new(move |response, request, params, route_handlers, url_pather| {
                // The merged chain is freshly allocated per request so that
                // concurrent requests sharing middleware never alias.
                let app = chain.read().unwrap();
                let mut handlers = Vec::with_capacity(app.handlers.len() + route_handlers.len());
                handlers.extend(app.handlers.iter().cloned());
                handlers.extend(route_handlers);
                Context::new(
                    response,
                    request,
                    params,
                    handlers,
                    app.action.clone(),
                    url_pather,
                    Some(injector.clone()),
                )
            })
        };

        Self {
            injector,
            chain,
            befores: Vec::new(),
            url_prefix: String::new(),
            router: Router::new(creator),
        }
    }

    /// The application injector shared by all requests.
    pub fn injector(&self) -> &Arc<Injector> {
        &self.injector
    }

    /// Stores an application-scoped value (see [`Injector::map`]).
    pub fn map<T: Send + Sync + 'static>(&self, value: T) -> &Self {
        self.injector.map(value);
        self
    }

    /// Stores an application-scoped trait object (see [`Injector::map_to`]).
    pub fn map_to<T: ?Sized + Send + Sync + 'static>(&self, value: Arc<T>) -> &Self {
        self.injector.map_to(value);
        self
    }

    /// Appends a middleware handler run before route handlers on every
    /// request, in registration order.
    pub fn use_handler<H, Args>(&mut self, handler: H)
    where
        H: IntoHandler<Args>,
    {
        self.chain.write().unwrap().handlers.push(handler.into_handler());
    }

    /// Replaces the whole middleware chain.
    pub fn set_handlers(&mut self, handlers: Vec<BoxedHandler>) {
        self.chain.write().unwrap().handlers = handlers;
    }

    /// Sets the action: the final handler invoked after the chain.
    pub fn action<H, Args>(&mut self, handler: H)
    where
        H: IntoHandler<Args>,
    {
        self.chain.write().unwrap().action = Some(handler.into_handler());
    }

    /// Registers a before-hook, run in registration order at the start of
    /// every request. A hook returning true stops all further processing.
    pub fn before(&mut self, hook: impl Fn(&ResponseWriter, &Request) -> bool + Send + Sync + 'static) {
        self.befores.push(Box::new(hook));
    }

    /// Sets a URL prefix trimmed from every request path before dispatch.
    pub fn url_prefix(&mut self, prefix: &str) {
        self.url_prefix = prefix.to_owned();
    }

    /// Handles one request against the given sink: the in-process entry
    /// point used by the serving adapter and by tests.
    pub async fn handle(&self, request: http::Request<()>, sink: Box<dyn ResponseSink>) {
        let (parts, ()) = request.into_parts();
        self.handle_parts(parts, None, tokio_util::sync::CancellationToken::new(), sink)
            .await;
    }

    pub(crate) async fn handle_parts(
        &self,
        mut parts: http::request::Parts,
        remote_addr: Option<SocketAddr>,
        cancellation: tokio_util::sync::CancellationToken,
        sink: Box<dyn ResponseSink>,
    ) {
        parts.uri = self.strip_prefix(parts.uri);
        let response = ResponseWriter::new(parts.method.clone(), sink);
        let request = Request::with_connection(parts, remote_addr, cancellation);

        for before in &self.befores {
            if before(&response, &request) {
                return;
            }
        }
        self.router.dispatch(response, request).await;
    }

    fn strip_prefix(&self, uri: Uri) -> Uri {
        if self.url_prefix.is_empty() {
            return uri;
        }
        let Some(stripped) = uri.path().strip_prefix(&self.url_prefix) else {
            return uri;
        };
        let stripped = if stripped.is_empty() { "/" } else { stripped };

        let path_and_query = match uri.query() {
            Some(query) => format!("{stripped}?{query}"),
            None => stripped.to_owned(),
        };
        let mut parts = uri.clone().into_parts();
        parts.path_and_query = path_and_query.parse().ok();
        Uri::from_parts(parts).unwrap_or(uri)
    }

    /// Starts serving on `EMBER_ADDR`, or 0.0.0.0:4000 when unset.
    pub async fn run(self) {
        let addr = std::env::var(ADDR_VARIABLE).unwrap_or_else(|_| DEFAULT_ADDR.to_owned());
        self.run_on(&addr).await;
    }

    /// Starts serving on the given address.
    pub async fn run_on(self, addr: &str) {
        // Keeps an already installed subscriber when embedded in a larger
        // program.
        let _ = tracing_subscriber::fmt().try_init();

        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(cause = %e, %addr, "failed to bind listen address");
                return;
            }
        };
        info!("listening on {addr} ({})", EnvType::current());

        if let Err(e) = crate::serve::serve(Arc::new(self), listener).await {
            error!(cause = %e, "server terminated");
        }
    }
}

impl Deref for Ember {
    type Target = Router;

    fn deref(&self) -> &Router {
        &self.router
    }
}

impl DerefMut for Ember {
    fn deref_mut(&mut self) -> &mut Router {
        &mut self.router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response_writer::ResponseRecorder;
    use http::{Method, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    async fn send(app: &Ember, method: Method, path: &str) -> ResponseRecorder {
        let recorder = ResponseRecorder::new();
        let request = http::Request::builder().method(method).uri(path).body(()).unwrap();
        app.handle(request, Box::new(recorder.clone())).await;
        recorder
    }

    #[tokio::test]
    async fn test_hello_world() {
        let mut app = Ember::new();
        app.get("/hello/{name}", |ctx: Context| async move {
            format!("hello, {}", ctx.param("name"))
        });

        let recorder = send(&app, Method::GET, "/hello/world").await;
        assert_eq!(recorder.status(), Some(StatusCode::OK));
        assert_eq!(recorder.body_string(), "hello, world");
    }

    #[tokio::test]
    async fn test_global_middleware_runs_before_route_handlers() {
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::default();

        let mut app = Ember::new();
        let entry = log.clone();
        app.use_handler(move |ctx: Context| {
            let log = entry.clone();
            async move {
                log.lock().unwrap().push("middleware");
                ctx.next().await;
                log.lock().unwrap().push("middleware-post");
            }
        });
        let entry = log.clone();
        app.action(move || {
            let log = entry.clone();
            async move {
                log.lock().unwrap().push("action");
            }
        });
        let entry = log.clone();
        app.get("/", move || {
            let log = entry.clone();
            async move {
                log.lock().unwrap().push("route");
            }
        });

        send(&app, Method::GET, "/").await;
        assert_eq!(
            *log.lock().unwrap(),
            vec!["middleware", "route", "action", "middleware-post"]
        );
    }

    #[tokio::test]
    async fn test_injected_services_reach_handlers() {
        trait Counter: Send + Sync {
            fn next(&self) -> usize;
        }
        struct AtomicCounter(AtomicUsize);
        impl Counter for AtomicCounter {
            fn next(&self) -> usize {
                self.0.fetch_add(1, Ordering::SeqCst)
            }
        }

        let mut app = Ember::new();
        app.map_to::<dyn Counter>(Arc::new(AtomicCounter(AtomicUsize::new(1))));
        app.get("/uid", |counter: Arc<dyn Counter>| async move {
            counter.next().to_string()
        });

        assert_eq!(send(&app, Method::GET, "/uid").await.body_string(), "1");
        assert_eq!(send(&app, Method::GET, "/uid").await.body_string(), "2");
    }

    #[tokio::test]
    async fn test_before_hooks_short_circuit_in_fifo_order() {
        let mut app = Ember::new();
        app.get("/", || async { "should not run" });

        app.before(|_, req| req.header("x-block") == "first");
        app.before(|w, req| {
            if req.header("x-block") == "second" {
                w.write_head(StatusCode::FORBIDDEN);
                return true;
            }
            false
        });

        let recorder = ResponseRecorder::new();
        let request = http::Request::builder()
            .uri("/")
            .header("x-block", "first")
            .body(())
            .unwrap();
        app.handle(request, Box::new(recorder.clone())).await;
        // The first hook returned true without writing anything.
        assert_eq!(recorder.status(), None);

        let recorder = ResponseRecorder::new();
        let request = http::Request::builder()
            .uri("/")
            .header("x-block", "second")
            .body(())
            .unwrap();
        app.handle(request, Box::new(recorder.clone())).await;
        assert_eq!(recorder.status(), Some(StatusCode::FORBIDDEN));

        let recorder = send(&app, Method::GET, "/").await;
        assert_eq!(recorder.body_string(), "should not run");
    }

    #[tokio::test]
    async fn test_url_prefix_is_stripped() {
        let mut app = Ember::new();
        app.url_prefix("/mount");
        app.get("/hello", || async { "hi" });

        assert_eq!(send(&app, Method::GET, "/mount/hello").await.body_string(), "hi");
        assert_eq!(
            send(&app, Method::GET, "/hello").await.status(),
            Some(StatusCode::NOT_FOUND)
        );
    }

    #[tokio::test]
    async fn test_error_returns_become_500() {
        let mut app = Ember::new();
        app.get("/fail", || async {
            Err::<(), std::io::Error>(std::io::Error::other("database is down"))
        });

        let recorder = send(&app, Method::GET, "/fail").await;
        assert_eq!(recorder.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(recorder.body_string(), "database is down");
    }

    #[tokio::test]
    async fn test_status_body_returns() {
        let mut app = Ember::new();
        app.get("/teapot", || async { (StatusCode::IM_A_TEAPOT, "short and stout") });

        let recorder = send(&app, Method::GET, "/teapot").await;
        assert_eq!(recorder.status(), Some(StatusCode::IM_A_TEAPOT));
        assert_eq!(recorder.body_string(), "short and stout");
    }

    #[tokio::test]
    async fn test_context_url_path() {
        let mut app = Ember::new();
        app.get("/users/{name}", || async { "profile" }).name("profile");
        app.get("/whereis", |ctx: Context| async move {
            ctx.url_path("profile", &[("name", "alice")])
        });

        let recorder = send(&app, Method::GET, "/whereis").await;
        assert_eq!(recorder.body_string(), "/users/alice");
    }

    #[tokio::test]
    async fn test_redirect() {
        let mut app = Ember::new();
        app.get("/old", |ctx: Context| async move {
            ctx.redirect("/new");
        });

        let recorder = send(&app, Method::GET, "/old").await;
        assert_eq!(recorder.status(), Some(StatusCode::FOUND));
        assert_eq!(recorder.headers().get("location").unwrap(), "/new");
    }
}

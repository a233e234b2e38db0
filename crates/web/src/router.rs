//! The router: registration, grouping, fast-path dispatch and reverse URLs.
//!
//! A router keeps one matching tree per HTTP method. Registration parses the
//! route string, installs a leaf carrying the handler chain, and remembers
//! purely static routes in a direct `(method, path)` map consulted before
//! any tree descent. Routes can be named for reverse URL building, and
//! groups nest prefixes and middleware over a scope of registrations.
//!
//! # Examples
//!
//! ```ignore
//! router.get("/hello/{name}", hello).name("hello");
//! router.group("/api", handlers![auth], |r| {
//!     r.get("/users", list_users);
//!     r.combo("/settings").get(show).post(update);
//! });
//! ```

use crate::context::{Context, UrlPather};
use crate::handler::{BoxFuture, BoxedHandler, IntoHandlers};
use crate::request::Request;
use crate::response_writer::ResponseWriter;
use ember_route::{parse, HeaderMatcher, Leaf, Params, Tree};
use http::{Method, StatusCode};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// The erased per-route entry stored in tree leaves: builds a context for
/// the request and drives its chain.
pub(crate) type ChainHandler = Arc<dyn Fn(ResponseWriter, Request, Params) -> BoxFuture<'static, ()> + Send + Sync>;

/// Builds a [`Context`] from the per-request pieces. Supplied by the
/// application so the router stays unaware of the application injector and
/// global middleware.
pub(crate) type ContextCreator =
    Arc<dyn Fn(ResponseWriter, Request, Params, Vec<BoxedHandler>, Option<UrlPather>) -> Context + Send + Sync>;

/// Wraps every registered handler; the hook point for custom invokers.
pub type HandlerWrapper = Arc<dyn Fn(BoxedHandler) -> BoxedHandler + Send + Sync>;

/// HTTP methods a route can be registered under, as defined in IETF RFC 7231
/// and RFC 5789.
const METHODS: [Method; 9] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::OPTIONS,
    Method::HEAD,
    Method::CONNECT,
    Method::TRACE,
];

struct Group {
    path: String,
    handlers: Vec<BoxedHandler>,
}

/// Registers routes and dispatches requests to them.
pub struct Router {
    auto_head: bool,
    /// The living stack of nested groups.
    groups: Vec<Group>,
    /// One matching tree per HTTP method.
    trees: HashMap<Method, Tree<ChainHandler>>,
    named_routes: Arc<RwLock<HashMap<String, Arc<Leaf<ChainHandler>>>>>,
    /// Purely static leaves, keyed by method and full path.
    static_routes: HashMap<(Method, String), Arc<Leaf<ChainHandler>>>,
    not_found: ChainHandler,
    context_creator: ContextCreator,
    handler_wrapper: Option<HandlerWrapper>,
}

impl Router {
    pub(crate) fn new(context_creator: ContextCreator) -> Self {
        let mut router = Self {
            auto_head: false,
            groups: Vec::new(),
            trees: METHODS.iter().map(|m| (m.clone(), Tree::new())).collect(),
            named_routes: Arc::default(),
            static_routes: HashMap::new(),
            not_found: Arc::new(|_, _, _| -> BoxFuture<'static, ()> { Box::pin(async {}) }),
            context_creator,
            handler_wrapper: None,
        };
        router.not_found(default_not_found);
        router
    }

    /// When enabled, a matching HEAD route is registered alongside every
    /// subsequent GET. Existing routes are unaffected.
    pub fn auto_head(&mut self, enabled: bool) {
        self.auto_head = enabled;
    }

    /// Installs a hook wrapping every handler registered from now on.
    pub fn handler_wrapper(&mut self, wrapper: impl Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static) {
        self.handler_wrapper = Some(Arc::new(wrapper));
    }

    /// Registers a route for one HTTP method.
    ///
    /// # Panics
    ///
    /// Panics when the route string cannot be parsed or conflicts with an
    /// existing route; registration errors are programming errors and
    /// surface at startup.
    pub fn route<H, M>(&mut self, method: Method, path: &str, handlers: H) -> Route<'_>
    where
        H: IntoHandlers<M>,
    {
        self.add_route(vec![method], path, handlers.into_handlers())
    }

    /// Registers the same handlers under every HTTP method.
    pub fn any<H, M>(&mut self, path: &str, handlers: H) -> Route<'_>
    where
        H: IntoHandlers<M>,
    {
        self.add_route(METHODS.to_vec(), path, handlers.into_handlers())
    }

    /// Registers the same handlers for a comma-separated list of methods:
    ///
    /// ```ignore
    /// router.routes("/", "GET,POST", handler);
    /// ```
    pub fn routes<H, M>(&mut self, path: &str, methods: &str, handlers: H) -> Route<'_>
    where
        H: IntoHandlers<M>,
    {
        if methods.is_empty() {
            panic!("empty methods");
        }
        let methods: Vec<Method> = methods
            .split(',')
            .map(|m| parse_method(m.trim()))
            .collect();
        self.add_route(methods, path, handlers.into_handlers())
    }

    /// Shortcut for registering a GET route; also registers HEAD when
    /// [`auto_head`](Self::auto_head) is enabled.
    pub fn get<H, M>(&mut self, path: &str, handlers: H) -> Route<'_>
    where
        H: IntoHandlers<M>,
    {
        let handlers = handlers.into_handlers();
        if self.auto_head {
            self.add_route(vec![Method::HEAD], path, handlers.clone());
        }
        self.add_route(vec![Method::GET], path, handlers)
    }

    /// Pushes a group with the given prefix and middleware, registers the
    /// routes added inside `f` under it, then pops the group.
    pub fn group<H, M>(&mut self, path: &str, handlers: H, f: impl FnOnce(&mut Router))
    where
        H: IntoHandlers<M>,
    {
        self.groups.push(Group { path: path.to_owned(), handlers: handlers.into_handlers() });
        f(self);
        self.groups.pop();
    }

    /// Returns a builder attaching handlers of several methods to one path.
    pub fn combo(&mut self, path: &str) -> ComboRoute<'_> {
        ComboRoute {
            router: self,
            path: path.to_owned(),
            handlers: Vec::new(),
            added: HashSet::new(),
            last_leaves: Vec::new(),
        }
    }

    /// Like [`combo`](Self::combo), with common handlers prepended to every
    /// method bound through the builder:
    ///
    /// ```ignore
    /// router.combo_with("/settings", auth).get(show).post(update);
    /// ```
    pub fn combo_with<H, M>(&mut self, path: &str, handlers: H) -> ComboRoute<'_>
    where
        H: IntoHandlers<M>,
    {
        ComboRoute {
            router: self,
            path: path.to_owned(),
            handlers: handlers.into_handlers(),
            added: HashSet::new(),
            last_leaves: Vec::new(),
        }
    }

    /// Configures the handler chain invoked when no route matches. The
    /// default writes a plain 404.
    pub fn not_found<H, M>(&mut self, handlers: H)
    where
        H: IntoHandlers<M>,
    {
        let handlers = self.wrap_handlers(handlers.into_handlers());
        self.not_found = self.chain(handlers);
    }

    /// Builds the path portion of the URL of a named route. The reserved
    /// pair `("withOptional", "true")` includes a trailing optional segment.
    ///
    /// # Panics
    ///
    /// Panics when no route carries the given name.
    pub fn url_path(&self, name: &str, pairs: &[(&str, &str)]) -> String {
        (self.url_pather())(name, pairs)
    }

    pub(crate) fn url_pather(&self) -> UrlPather {
        let named_routes = self.named_routes.clone();
        Arc::new(move |name, pairs| {
            let named_routes = named_routes.read().unwrap();
            let Some(leaf) = named_routes.get(name) else {
                panic!("route with given name does not exist: {name}");
            };

            let mut with_optional = false;
            let mut values = Params::new();
            for (key, value) in pairs {
                if *key == "withOptional" {
                    with_optional = *value == "true";
                    continue;
                }
                values.insert((*key).to_owned(), (*value).to_owned());
            }
            leaf.url_path(&values, with_optional)
        })
    }

    /// Dispatches a request: static fast path first, then tree descent,
    /// then the not-found chain.
    pub(crate) async fn dispatch(&self, response: ResponseWriter, request: Request) {
        let method = request.method().clone();
        let path = request.path().to_owned();

        if let Some(leaf) = self.static_routes.get(&(method.clone(), path.clone())) {
            let mut params = Params::new();
            params.insert("route".to_owned(), leaf.route_string());
            (leaf.handler())(response, request, params).await;
            return;
        }

        // An unrecognized method has no tree and falls through to the
        // not-found chain.
        let matched = self
            .trees
            .get(&method)
            .and_then(|tree| tree.match_route(&path, request.headers()));
        match matched {
            Some((leaf, mut params)) => {
                params.insert("route".to_owned(), leaf.route_string());
                (leaf.handler())(response, request, params).await;
            }
            None => (self.not_found)(response, request, Params::new()).await,
        }
    }

    fn add_route(&mut self, methods: Vec<Method>, path: &str, handlers: Vec<BoxedHandler>) -> Route<'_> {
        let (path, handlers) = self.apply_groups(path, handlers);
        let handlers = self.wrap_handlers(handlers);

        let ast = parse(&path).unwrap_or_else(|e| panic!("unable to parse route {path:?}: {e}"));
        let chain = self.chain(handlers);

        let mut leaves = Vec::with_capacity(methods.len());
        for method in methods {
            let tree = self
                .trees
                .get_mut(&method)
                .unwrap_or_else(|| panic!("unknown HTTP method: {method}"));
            let leaf = tree
                .add_route(&ast, chain.clone())
                .unwrap_or_else(|e| panic!("unable to add route {path:?} with method {method}: {e}"));

            if leaf.is_static() {
                self.static_routes.insert((method.clone(), leaf.route_string()), leaf.clone());
            }
            debug!(%method, route = %leaf.route_string(), "route registered");
            leaves.push((method, leaf));
        }

        Route { router: self, leaves }
    }

    fn apply_groups(&self, path: &str, handlers: Vec<BoxedHandler>) -> (String, Vec<BoxedHandler>) {
        if self.groups.is_empty() {
            return (path.to_owned(), handlers);
        }

        let mut full_path = String::new();
        let mut merged = Vec::new();
        for group in &self.groups {
            full_path.push_str(&group.path);
            merged.extend(group.handlers.iter().cloned());
        }
        full_path.push_str(path);
        merged.extend(handlers);
        (full_path, merged)
    }

    fn wrap_handlers(&self, handlers: Vec<BoxedHandler>) -> Vec<BoxedHandler> {
        let Some(wrapper) = &self.handler_wrapper else {
            return handlers;
        };
        handlers.into_iter().map(|h| wrapper(h)).collect()
    }

    /// Erases a handler chain into the closure stored on tree leaves. The
    /// context creator merges in the application middleware per request.
    fn chain(&self, handlers: Vec<BoxedHandler>) -> ChainHandler {
        let creator = self.context_creator.clone();
        let url_pather = self.url_pather();
        Arc::new(move |response, request, params| -> BoxFuture<'static, ()> {
            let ctx = creator(response, request, params, handlers.clone(), Some(url_pather.clone()));
            Box::pin(ctx.run())
        })
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("static_routes", &self.static_routes.len())
            .field("named_routes", &self.named_routes.read().unwrap().len())
            .finish()
    }
}

macro_rules! method_shortcut {
    ($name:ident, $method:ident) => {
        #[doc = concat!("Shortcut for registering a ", stringify!($method), " route.")]
        pub fn $name<H, M>(&mut self, path: &str, handlers: H) -> Route<'_>
        where
            H: IntoHandlers<M>,
        {
            self.route(Method::$method, path, handlers)
        }
    };
}

impl Router {
    method_shortcut!(post, POST);
    method_shortcut!(put, PUT);
    method_shortcut!(delete, DELETE);
    method_shortcut!(patch, PATCH);
    method_shortcut!(options, OPTIONS);
    method_shortcut!(head, HEAD);
    method_shortcut!(connect, CONNECT);
    method_shortcut!(trace, TRACE);
}

fn parse_method(method: &str) -> Method {
    let upper = method.to_uppercase();
    METHODS
        .iter()
        .find(|m| m.as_str() == upper)
        .cloned()
        .unwrap_or_else(|| panic!("unknown HTTP method: {method}"))
}

async fn default_not_found(ctx: Context) {
    let w = ctx.response_writer();
    w.write_head(StatusCode::NOT_FOUND);
    let _ = w.write(b"404 page not found");
}

/// A registered route, for attaching a name or header constraints.
pub struct Route<'r> {
    router: &'r mut Router,
    leaves: Vec<(Method, Arc<Leaf<ChainHandler>>)>,
}

impl Route<'_> {
    /// Names the route for reverse URL building.
    ///
    /// # Panics
    ///
    /// Panics on an empty or already used name.
    pub fn name(self, name: &str) {
        name_route(self.router, &self.leaves, name);
    }

    /// Constrains the route to requests whose headers match the given
    /// `(header name, regex)` pairs. All pairs must match; an empty pattern
    /// asserts presence. Replaces previously set constraints.
    ///
    /// Header-constrained routes cannot be answered from the static fast
    /// path, so their fast-path entries are dropped.
    pub fn headers(self, pairs: &[(&str, &str)]) -> Self {
        let matches: Vec<(String, Regex)> = pairs
            .iter()
            .map(|(name, pattern)| {
                let regex = Regex::new(pattern)
                    .unwrap_or_else(|e| panic!("invalid header pattern {pattern:?}: {e}"));
                ((*name).to_owned(), regex)
            })
            .collect();

        for (method, leaf) in &self.leaves {
            leaf.set_header_matcher(HeaderMatcher::new(matches.clone()));
            if leaf.is_static() {
                self.router.static_routes.remove(&(method.clone(), leaf.route_string()));
            }
        }
        self
    }
}

fn name_route(router: &Router, leaves: &[(Method, Arc<Leaf<ChainHandler>>)], name: &str) {
    if name.is_empty() {
        panic!("empty route name");
    }
    let mut named_routes = router.named_routes.write().unwrap();
    if named_routes.contains_key(name) {
        panic!("duplicated route name: {name}");
    }
    if let Some((_, leaf)) = leaves.first() {
        named_routes.insert(name.to_owned(), leaf.clone());
    }
}

/// A builder attaching handlers of different HTTP methods to one path,
/// preventing accidental double binding of a method.
pub struct ComboRoute<'r> {
    router: &'r mut Router,
    path: String,
    /// Common handlers prepended to every bound method.
    handlers: Vec<BoxedHandler>,
    added: HashSet<Method>,
    last_leaves: Vec<(Method, Arc<Leaf<ChainHandler>>)>,
}

macro_rules! combo_method {
    ($name:ident, $method:ident) => {
        #[doc = concat!("Adds handlers of the ", stringify!($method), " method to the route.")]
        pub fn $name<H, M>(self, handlers: H) -> Self
        where
            H: IntoHandlers<M>,
        {
            self.add(Method::$method, handlers.into_handlers())
        }
    };
}

impl ComboRoute<'_> {
    combo_method!(get, GET);
    combo_method!(post, POST);
    combo_method!(put, PUT);
    combo_method!(delete, DELETE);
    combo_method!(patch, PATCH);
    combo_method!(options, OPTIONS);
    combo_method!(head, HEAD);
    combo_method!(connect, CONNECT);
    combo_method!(trace, TRACE);

    /// Names the most recently added route.
    ///
    /// # Panics
    ///
    /// Panics when no route has been added yet.
    pub fn name(self, name: &str) {
        if self.last_leaves.is_empty() {
            panic!("no route has been added");
        }
        name_route(self.router, &self.last_leaves, name);
    }

    fn add(mut self, method: Method, extra: Vec<BoxedHandler>) -> Self {
        if !self.added.insert(method.clone()) {
            panic!("duplicated method {:?} for route {:?}", method.as_str(), self.path);
        }

        let mut handlers = self.handlers.clone();
        handlers.extend(extra);

        let path = self.path.clone();
        let route = if method == Method::GET {
            // Goes through the shortcut so auto-head applies.
            self.router.get(&path, handlers)
        } else {
            self.router.route(method, &path, handlers)
        };
        self.last_leaves = route.leaves.clone();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers;
    use crate::inject::Injector;
    use crate::response_writer::ResponseRecorder;
    use crate::return_handler::ReturnHandler;

    fn test_router() -> Router {
        let injector = Arc::new(Injector::new());
        injector.map(ReturnHandler::default());
        let creator: ContextCreator = Arc::new(move |response, request, params, handlers, url_pather| {
            Context::new(response, request, params, handlers, None, url_pather, Some(injector.clone()))
        });
        Router::new(creator)
    }

    async fn send(router: &Router, method: Method, path: &str) -> ResponseRecorder {
        send_with(router, method, path, &[]).await
    }

    async fn send_with(router: &Router, method: Method, path: &str, headers: &[(&str, &str)]) -> ResponseRecorder {
        let recorder = ResponseRecorder::new();
        let writer = ResponseWriter::new(method.clone(), Box::new(recorder.clone()));
        let mut builder = http::Request::builder().method(method).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request: Request = builder.body(()).unwrap().into();
        router.dispatch(writer, request).await;
        recorder
    }

    async fn hello(ctx: Context) -> String {
        format!("hello, {}", ctx.param("name"))
    }

    #[tokio::test]
    async fn test_placeholder_route() {
        let mut router = test_router();
        router.get("/hello/{name}", hello);

        let recorder = send(&router, Method::GET, "/hello/world").await;
        assert_eq!(recorder.status(), Some(StatusCode::OK));
        assert_eq!(recorder.body_string(), "hello, world");
    }

    #[tokio::test]
    async fn test_route_param_carries_the_route_string() {
        let mut router = test_router();
        router.get("/hello/{name}", |ctx: Context| async move { ctx.param("route").to_owned() });

        let recorder = send(&router, Method::GET, "/hello/world").await;
        assert_eq!(recorder.body_string(), "/hello/{name}");

        // The static fast path seeds the same parameter.
        router.get("/ping", |ctx: Context| async move { ctx.param("route").to_owned() });
        let recorder = send(&router, Method::GET, "/ping").await;
        assert_eq!(recorder.body_string(), "/ping");
    }

    #[tokio::test]
    async fn test_not_found_defaults_to_404() {
        let router = test_router();
        let recorder = send(&router, Method::GET, "/nothing").await;
        assert_eq!(recorder.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(recorder.body_string(), "404 page not found");
    }

    #[tokio::test]
    async fn test_not_found_is_configurable() {
        let mut router = test_router();
        router.not_found(|| async { (StatusCode::NOT_FOUND, "gone fishing") });

        let recorder = send(&router, Method::GET, "/nothing").await;
        assert_eq!(recorder.body_string(), "gone fishing");
    }

    #[tokio::test]
    async fn test_unknown_request_method_hits_not_found() {
        let mut router = test_router();
        router.get("/", || async { "root" });

        let method = Method::from_bytes(b"PURGE").unwrap();
        let recorder = send(&router, method, "/").await;
        assert_eq!(recorder.status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_static_fast_path_matches_tree() {
        let mut router = test_router();
        router.get("/fast/path", || async { "ok" });

        let key = (Method::GET, "/fast/path".to_string());
        let fast = router.static_routes.get(&key).expect("static route in fast map");
        let (via_tree, _) = router.trees[&Method::GET]
            .match_route("/fast/path", &http::HeaderMap::new())
            .expect("tree match");
        assert!(Arc::ptr_eq(fast, &via_tree));

        // Dynamic routes stay out of the fast map.
        router.get("/slow/{name}", || async { "ok" });
        assert!(!router.static_routes.keys().any(|(_, p)| p.contains("slow")));
    }

    #[tokio::test]
    async fn test_header_constraints_demote_from_fast_path() {
        let mut router = test_router();
        router
            .get("/feed", || async { "chrome only" })
            .headers(&[("user-agent", "Chrome")]);

        assert!(router.static_routes.is_empty());

        let recorder = send_with(&router, Method::GET, "/feed", &[("user-agent", "Chrome/104")]).await;
        assert_eq!(recorder.body_string(), "chrome only");

        let recorder = send(&router, Method::GET, "/feed").await;
        assert_eq!(recorder.status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_auto_head() {
        let mut router = test_router();
        router.get("/before", || async { "no head" });
        router.auto_head(true);
        router.get("/after", || async { "head too" });

        let recorder = send(&router, Method::HEAD, "/before").await;
        assert_eq!(recorder.status(), Some(StatusCode::NOT_FOUND));

        let recorder = send(&router, Method::HEAD, "/after").await;
        assert_eq!(recorder.status(), Some(StatusCode::OK));
        // The body is suppressed for HEAD.
        assert_eq!(recorder.body_string(), "");
    }

    #[tokio::test]
    async fn test_any_and_routes() {
        let mut router = test_router();
        router.any("/everything", || async { "any" });
        router.routes("/pair", "GET,POST", || async { "pair" });

        for method in [Method::GET, Method::DELETE, Method::TRACE] {
            let recorder = send(&router, method, "/everything").await;
            assert_eq!(recorder.body_string(), "any");
        }

        assert_eq!(send(&router, Method::GET, "/pair").await.body_string(), "pair");
        assert_eq!(send(&router, Method::POST, "/pair").await.body_string(), "pair");
        assert_eq!(send(&router, Method::PUT, "/pair").await.status(), Some(StatusCode::NOT_FOUND));
    }

    #[test]
    #[should_panic(expected = "unknown HTTP method")]
    fn test_routes_rejects_unknown_method() {
        let mut router = test_router();
        router.routes("/x", "GET,FETCH", || async { "x" });
    }

    #[tokio::test]
    async fn test_groups_nest_prefixes_and_middleware() {
        let mut router = test_router();
        let tag = |value: &'static str| {
            move |ctx: Context| async move {
                ctx.response_writer().write(value.as_bytes()).unwrap();
                ctx.next().await;
            }
        };

        router.group("/api", handlers![tag("api:")], |r| {
            r.group("/v1", handlers![tag("v1:")], |r| {
                r.get("/users", || async { "users" });
            });
        });

        let recorder = send(&router, Method::GET, "/api/v1/users").await;
        assert_eq!(recorder.body_string(), "api:v1:users");

        assert_eq!(send(&router, Method::GET, "/users").await.status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_combo_route() {
        let mut router = test_router();
        router
            .combo("/resource")
            .get(|| async { "get" })
            .post(|| async { "post" })
            .name("resource");

        assert_eq!(send(&router, Method::GET, "/resource").await.body_string(), "get");
        assert_eq!(send(&router, Method::POST, "/resource").await.body_string(), "post");
        assert_eq!(router.url_path("resource", &[]), "/resource");
    }

    #[tokio::test]
    async fn test_combo_with_shared_handlers() {
        let mut router = test_router();
        let audit = |ctx: Context| async move {
            ctx.response_writer().write(b"audit:").unwrap();
            ctx.next().await;
        };
        router
            .combo_with("/settings", audit)
            .get(|| async { "show" })
            .post(|| async { "update" });

        assert_eq!(send(&router, Method::GET, "/settings").await.body_string(), "audit:show");
        assert_eq!(send(&router, Method::POST, "/settings").await.body_string(), "audit:update");
    }

    #[test]
    #[should_panic(expected = "duplicated method")]
    fn test_combo_rejects_duplicate_method() {
        let mut router = test_router();
        router
            .combo("/resource")
            .get(|| async { "first" })
            .get(|| async { "second" });
    }

    #[test]
    #[should_panic(expected = "duplicated route")]
    fn test_duplicate_route_panics() {
        let mut router = test_router();
        router.get("/twice", || async { "a" });
        router.get("/twice", || async { "b" });
    }

    #[test]
    fn test_url_path() {
        let mut router = test_router();
        router.get("/users/{name}/?{tab}", || async { "ok" }).name("user");

        assert_eq!(router.url_path("user", &[("name", "alice")]), "/users/alice");
        assert_eq!(
            router.url_path("user", &[("name", "alice"), ("tab", "repos"), ("withOptional", "true")]),
            "/users/alice/repos"
        );
        // A missing value keeps its placeholder form.
        assert_eq!(router.url_path("user", &[]), "/users/{name}");
    }

    #[test]
    #[should_panic(expected = "duplicated route name")]
    fn test_duplicate_name_panics() {
        let mut router = test_router();
        router.get("/a", || async { "a" }).name("same");
        router.get("/b", || async { "b" }).name("same");
    }

    #[test]
    #[should_panic(expected = "empty route name")]
    fn test_empty_name_panics() {
        let mut router = test_router();
        router.get("/a", || async { "a" }).name("");
    }

    #[test]
    #[should_panic(expected = "unable to parse route")]
    fn test_unparsable_route_panics() {
        let mut router = test_router();
        router.get("no-leading-slash", || async { "x" });
    }

    #[tokio::test]
    async fn test_handler_wrapper_sees_every_handler() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let wrapped = Arc::new(AtomicUsize::new(0));
        let counter = wrapped.clone();

        let mut router = test_router();
        router.handler_wrapper(move |h| {
            counter.fetch_add(1, Ordering::SeqCst);
            h
        });
        router.get("/a", || async { "a" });
        router.get("/b", || async { "b" });

        assert_eq!(wrapped.load(Ordering::SeqCst), 2);
    }
}

//! The per-request context and the handler chain runtime.
//!
//! A [`Context`] is created once a route matches. It owns a child
//! [`Injector`] parented to the application injector, the
//! [`ResponseWriter`], the [`Request`], the captured [`Params`] and the
//! merged handler chain (application middleware first, then route handlers,
//! then the action slot).
//!
//! Handlers run strictly sequentially. A middleware can call
//! [`next`](Context::next) to run the rest of the chain in the middle of its
//! own body, giving it "around" semantics:
//!
//! ```ignore
//! async fn timer(ctx: Context) {
//!     let started = Instant::now();
//!     ctx.next().await;
//!     info!("handled in {:?}", started.elapsed());
//! }
//! ```
//!
//! The loop stops as soon as the response head has been written or the
//! request is cancelled. Handler return values are dispatched through the
//! [`ReturnHandler`] service resolved from the injector.

use crate::handler::{BoxFuture, BoxedHandler};
use crate::inject::Injector;
use crate::request::Request;
use crate::response_writer::ResponseWriter;
use crate::return_handler::ReturnHandler;
use ember_route::Params;
use http::header::LOCATION;
use http::{HeaderValue, StatusCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Builds the path portion of a URL for a named route from `(bind, value)`
/// pairs.
pub type UrlPather = Arc<dyn Fn(&str, &[(&str, &str)]) -> String + Send + Sync>;

/// The runtime context of one request. Clones share the same state.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    injector: Injector,
    handlers: Vec<BoxedHandler>,
    action: Option<BoxedHandler>,
    /// Index of the handler currently being (or about to be) invoked.
    index: AtomicUsize,
    response: ResponseWriter,
    request: Request,
    params: Params,
    url_pather: Option<UrlPather>,
}

impl Context {
    pub(crate) fn new(
        response: ResponseWriter,
        request: Request,
        params: Params,
        handlers: Vec<BoxedHandler>,
        action: Option<BoxedHandler>,
        url_pather: Option<UrlPather>,
        parent: Option<Arc<Injector>>,
    ) -> Self {
        let injector = Injector::new();
        if let Some(parent) = parent {
            injector.set_parent(parent);
        }
        injector.map(response.clone());
        injector.map(request.clone());

        Self {
            inner: Arc::new(Inner {
                injector,
                handlers,
                action,
                index: AtomicUsize::new(0),
                response,
                request,
                params,
                url_pather,
            }),
        }
    }

    /// The response writer of the current request.
    pub fn response_writer(&self) -> &ResponseWriter {
        &self.inner.response
    }

    /// The current request.
    pub fn request(&self) -> &Request {
        &self.inner.request
    }

    /// All bind parameters captured by the route match.
    pub fn params(&self) -> &Params {
        &self.inner.params
    }

    /// The value of the given bind parameter, or empty when absent.
    pub fn param(&self, name: &str) -> &str {
        self.inner.params.get(name).map(String::as_str).unwrap_or("")
    }

    /// The bind parameter parsed as an integer; absent or unparsable is 0.
    pub fn param_int(&self, name: &str) -> i64 {
        self.param(name).parse().unwrap_or_default()
    }

    /// Stores a request-scoped value in the context injector.
    pub fn map<T: Send + Sync + 'static>(&self, value: T) -> &Self {
        self.inner.injector.map(value);
        self
    }

    /// Stores a request-scoped trait object, keyed by the trait object type.
    pub fn map_to<T: ?Sized + Send + Sync + 'static>(&self, value: Arc<T>) -> &Self {
        self.inner.injector.map_to(value);
        self
    }

    /// Resolves a value from the context injector, falling back to the
    /// application injector.
    pub fn value<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner.injector.value::<T>()
    }

    /// Builds the path portion of the URL of the named route. Pass the pair
    /// `("withOptional", "true")` to include a trailing optional segment.
    ///
    /// # Panics
    ///
    /// Panics when no route carries the given name.
    pub fn url_path(&self, name: &str, pairs: &[(&str, &str)]) -> String {
        let Some(pather) = &self.inner.url_pather else {
            panic!("context has no URL path builder");
        };
        pather(name, pairs)
    }

    /// Sends a `302 Found` redirect to the given location.
    pub fn redirect(&self, location: &str) {
        self.redirect_with(location, StatusCode::FOUND);
    }

    /// Sends a redirect with an explicit status code.
    pub fn redirect_with(&self, location: &str, status: StatusCode) {
        if let Ok(value) = HeaderValue::from_str(location) {
            self.inner.response.headers_mut().insert(LOCATION, value);
        }
        self.inner.response.write_head(status);
    }

    /// The remote address of the request (see [`Request::remote_addr`]).
    pub fn remote_addr(&self) -> String {
        self.inner.request.remote_addr()
    }

    fn index(&self) -> usize {
        self.inner.index.load(Ordering::SeqCst)
    }

    fn advance(&self) {
        self.inner.index.fetch_add(1, Ordering::SeqCst);
    }

    /// Runs the next handler in the chain, then keeps running until the
    /// chain finishes or the response is written. Awaiting this inside a
    /// handler gives it "around" semantics: everything after the await runs
    /// once the inner handlers are done.
    pub fn next(&self) -> BoxFuture<'_, ()> {
        self.advance();
        Box::pin(self.run_loop())
    }

    /// Drives the whole chain. Called once per request by the router.
    pub(crate) async fn run(self) {
        self.run_loop().await;
    }

    async fn run_loop(&self) {
        while self.index() <= self.inner.handlers.len() {
            // Stop early when the peer has gone away.
            if self.inner.request.cancellation().is_cancelled() {
                return;
            }

            let index = self.index();
            let handler = if index == self.inner.handlers.len() {
                // The trailing slot holds the action handler.
                self.inner.action.as_ref()
            } else {
                Some(&self.inner.handlers[index])
            };
            let Some(handler) = handler else {
                self.advance();
                return;
            };

            let value = match handler.invoke(self.clone()).await {
                Ok(value) => value,
                Err(e) => panic!(
                    "unable to invoke the {} handler [{}]: {e}",
                    ordinalize(index + 1),
                    handler.type_name(),
                ),
            };
            self.advance();

            if !value.is_unit() {
                let Some(return_handler) = self.value::<ReturnHandler>() else {
                    panic!("return handler is not mapped");
                };
                return_handler.handle(self, value);
            }

            if self.inner.response.written() {
                return;
            }
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("request", &self.inner.request)
            .field("index", &self.index())
            .field("handlers", &self.inner.handlers.len())
            .finish()
    }
}

/// Renders a 1-based position as its ordinal form ("1st", "2nd", ...).
fn ordinalize(number: usize) -> String {
    if matches!(number % 100, 11 | 12 | 13) {
        return format!("{number}th");
    }
    let suffix = match number % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    };
    format!("{number}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::IntoHandler;
    use crate::response_writer::ResponseRecorder;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    fn recorded_context(
        handlers: Vec<BoxedHandler>,
        action: Option<BoxedHandler>,
    ) -> (Context, ResponseRecorder) {
        let recorder = ResponseRecorder::new();
        let writer = ResponseWriter::new(http::Method::GET, Box::new(recorder.clone()));
        let request: Request = http::Request::builder().uri("/").body(()).unwrap().into();

        let parent = Arc::new(Injector::new());
        parent.map(ReturnHandler::default());

        let ctx = Context::new(writer, request, Params::new(), handlers, action, None, Some(parent));
        (ctx, recorder)
    }

    type Log = Arc<Mutex<Vec<&'static str>>>;

    #[tokio::test]
    async fn test_around_semantics() {
        let log: Log = Arc::default();

        let (a_log, b_log, c_log) = (log.clone(), log.clone(), log.clone());
        let a = move |ctx: Context| {
            let log = a_log.clone();
            async move {
                log.lock().unwrap().push("A-pre");
                ctx.next().await;
                log.lock().unwrap().push("A-post");
            }
        };
        let b = move || {
            let log = b_log.clone();
            async move {
                log.lock().unwrap().push("B");
            }
        };
        let c = move || {
            let log = c_log.clone();
            async move {
                log.lock().unwrap().push("C");
            }
        };

        let (ctx, _) = recorded_context(
            vec![a.into_handler(), b.into_handler()],
            Some(c.into_handler()),
        );
        ctx.run().await;

        assert_eq!(*log.lock().unwrap(), vec!["A-pre", "B", "C", "A-post"]);
    }

    #[tokio::test]
    async fn test_return_value_written_through_dispatch() {
        let hello = |ctx: Context| async move { format!("hello, {}", ctx.param("name")) };

        let recorder = ResponseRecorder::new();
        let writer = ResponseWriter::new(http::Method::GET, Box::new(recorder.clone()));
        let request: Request = http::Request::builder().uri("/hello/world").body(()).unwrap().into();
        let parent = Arc::new(Injector::new());
        parent.map(ReturnHandler::default());

        let mut params = Params::new();
        params.insert("name".to_owned(), "world".to_owned());

        let ctx = Context::new(writer, request, params, vec![hello.into_handler()], None, None, Some(parent));
        ctx.run().await;

        assert_eq!(recorder.status(), Some(StatusCode::OK));
        assert_eq!(recorder.body_string(), "hello, world");
    }

    #[tokio::test]
    async fn test_written_response_stops_the_chain() {
        let log: Log = Arc::default();

        let first = |ctx: Context| async move {
            ctx.response_writer().write(b"done").unwrap();
        };
        let observed = log.clone();
        let second = move || {
            let log = observed.clone();
            async move {
                log.lock().unwrap().push("second");
            }
        };

        let (ctx, recorder) = recorded_context(vec![first.into_handler(), second.into_handler()], None);
        ctx.run().await;

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(recorder.body_string(), "done");
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_chain() {
        let log: Log = Arc::default();
        let observed = log.clone();
        let handler = move || {
            let log = observed.clone();
            async move {
                log.lock().unwrap().push("ran");
            }
        };

        let recorder = ResponseRecorder::new();
        let writer = ResponseWriter::new(http::Method::GET, Box::new(recorder.clone()));
        let token = CancellationToken::new();
        token.cancel();
        let parts = http::Request::builder().uri("/").body(()).unwrap().into_parts().0;
        let request = Request::with_connection(parts, None, token);

        let ctx = Context::new(
            writer,
            request,
            Params::new(),
            vec![handler.into_handler()],
            None,
            None,
            None,
        );
        ctx.run().await;

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(recorder.status(), None);
    }

    #[tokio::test]
    #[should_panic(expected = "unable to invoke the 1st handler")]
    async fn test_missing_dependency_panics_with_ordinal() {
        let needs_service = |_svc: Arc<String>| async {};
        let (ctx, _) = recorded_context(vec![needs_service.into_handler()], None);
        ctx.run().await;
    }

    #[tokio::test]
    async fn test_request_scoped_values_shadow_application_values() {
        let parent = Arc::new(Injector::new());
        parent.map("app".to_string());
        parent.map(ReturnHandler::default());

        let seen: Arc<Mutex<Vec<String>>> = Arc::default();
        let observed = seen.clone();
        let reader = move |value: Arc<String>| {
            let seen = observed.clone();
            async move {
                seen.lock().unwrap().push((*value).clone());
            }
        };

        let recorder = ResponseRecorder::new();
        let writer = ResponseWriter::new(http::Method::GET, Box::new(recorder.clone()));
        let request: Request = http::Request::builder().uri("/").body(()).unwrap().into();
        let ctx = Context::new(
            writer,
            request,
            Params::new(),
            vec![reader.into_handler()],
            None,
            None,
            Some(parent),
        );
        ctx.map("request".to_string());
        ctx.run().await;

        assert_eq!(*seen.lock().unwrap(), vec!["request".to_string()]);
    }

    #[test]
    fn test_ordinalize() {
        assert_eq!(ordinalize(1), "1st");
        assert_eq!(ordinalize(2), "2nd");
        assert_eq!(ordinalize(3), "3rd");
        assert_eq!(ordinalize(4), "4th");
        assert_eq!(ordinalize(11), "11th");
        assert_eq!(ordinalize(12), "12th");
        assert_eq!(ordinalize(13), "13th");
        assert_eq!(ordinalize(22), "22nd");
        assert_eq!(ordinalize(101), "101st");
    }
}

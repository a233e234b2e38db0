//! A modular web framework built around typed dependency injection.
//!
//! Handlers are plain async functions; their parameter lists declare what
//! they need, and the framework resolves each parameter from a per-request
//! injector parented to the application injector. Routes use a rich syntax
//! (static, regex, placeholder and match-all segments, optional tails,
//! header constraints) matched through a prioritized tree provided by the
//! `ember-route` crate.
//!
//! ```no_run
//! use ember_web::{Context, Ember};
//!
//! async fn hello(ctx: Context) -> String {
//!     format!("hello, {}", ctx.param("name"))
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut app = Ember::new();
//!     app.get("/hello/{name}", hello);
//!     app.run().await;
//! }
//! ```
//!
//! Middleware are handlers too, registered with
//! [`use_handler`](Ember::use_handler) or per route/group; calling
//! [`Context::next`] runs the rest of the chain in the middle of a
//! middleware body. Whatever a handler returns is written to the response
//! by the [`ReturnHandler`] service, which applications may replace through
//! the injector.

mod app;
mod context;
mod env;
mod extract;
mod handler;
mod inject;
mod request;
mod response_writer;
mod return_handler;
mod router;
mod serve;

pub use app::{BeforeHandler, Ember, ADDR_VARIABLE};
pub use context::{Context, UrlPather};
pub use env::{EnvType, ENV_VARIABLE};
pub use extract::{FromContext, Inject};
pub use handler::{
    context_invoker, raw_invoker, BoxFuture, BoxedHandler, ContextInvoker, FastArgs, FnHandler,
    Handler, IntoHandler, IntoHandlers, RawInvoker, VecArgs,
};
pub use inject::{InjectError, Injector};
pub use request::Request;
pub use response_writer::{BeforeFn, ResponseRecorder, ResponseSink, ResponseWriter};
pub use return_handler::{IntoReturnValue, ReturnHandler, ReturnValue};
pub use router::{ComboRoute, HandlerWrapper, Route, Router};
pub use serve::ServeError;

pub use ember_route as route;
pub use ember_route::Params;

//! Handlers and their invocation.
//!
//! A handler is any async function with up to nine parameters, each
//! implementing [`FromContext`], returning a type that implements
//! [`IntoReturnValue`]. At registration time handlers are erased to
//! [`BoxedHandler`] via [`IntoHandler`], and invoked by the chain runtime
//! with the per-request [`Context`].
//!
//! Two invocation paths exist:
//!
//! - the generic path ([`FnHandler`]) resolves every parameter through
//!   [`FromContext`], failing with a "value not found" error when a
//!   dependency is missing;
//! - fast invokers ([`ContextInvoker`], [`RawInvoker`]) wrap the well-known
//!   handler shapes `async fn(Context)` and
//!   `async fn(ResponseWriter, Request)` and skip parameter resolution
//!   entirely. They cannot fail to resolve.

use crate::context::Context;
use crate::extract::FromContext;
use crate::inject::InjectError;
use crate::request::Request;
use crate::response_writer::ResponseWriter;
use crate::return_handler::{IntoReturnValue, ReturnValue};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed, pinned future returned by handler invocation.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An erased, invocable handler.
pub trait Handler: Send + Sync + 'static {
    /// Invokes the handler against the given request context.
    fn invoke<'a>(&'a self, ctx: Context) -> BoxFuture<'a, Result<ReturnValue, InjectError>>;

    /// The name of the underlying function type, used in diagnostics.
    fn type_name(&self) -> &'static str;
}

/// A shared, type-erased handler as stored in routes and chains.
pub type BoxedHandler = Arc<dyn Handler>;

/// Conversion into a [`BoxedHandler`], implemented for plain async
/// functions, fast invokers and already-boxed handlers. The `Args` parameter
/// only disambiguates the implementations and is inferred at the call site.
pub trait IntoHandler<Args> {
    fn into_handler(self) -> BoxedHandler;
}

/// The generic invocation path: resolves each declared parameter from the
/// context, then calls the function.
pub struct FnHandler<F, Args> {
    f: F,
    _marker: PhantomData<fn(Args)>,
}

impl<F, Args> FnHandler<F, Args> {
    pub fn new(f: F) -> Self {
        Self { f, _marker: PhantomData }
    }
}

/// Implements [`Handler`] and [`IntoHandler`] for async functions of one
/// arity: each parameter is resolved through [`FromContext`], then the
/// function is called with the extracted values. Extraction stops at the
/// first missing dependency, leaving later parameters untouched.
macro_rules! impl_handler_for_fn ({ $($param:ident)* } => {
    #[allow(non_snake_case, unused_variables)]
    impl<__HandlerFn, __HandlerFut, $($param,)*> Handler for FnHandler<__HandlerFn, ($($param,)*)>
    where
        __HandlerFn: Fn($($param),*) -> __HandlerFut + Send + Sync + 'static,
        __HandlerFut: Future + Send,
        __HandlerFut::Output: IntoReturnValue,
        $($param: FromContext + Send + 'static,)*
    {
        fn invoke<'a>(&'a self, ctx: Context) -> BoxFuture<'a, Result<ReturnValue, InjectError>> {
            Box::pin(async move {
                $(let $param = $param::from_context(&ctx)?;)*
                Ok((self.f)($($param),*).await.into_return_value())
            })
        }

        fn type_name(&self) -> &'static str {
            std::any::type_name::<__HandlerFn>()
        }
    }

    #[allow(non_snake_case)]
    impl<__HandlerFn, __HandlerFut, $($param,)*> IntoHandler<($($param,)*)> for __HandlerFn
    where
        __HandlerFn: Fn($($param),*) -> __HandlerFut + Send + Sync + 'static,
        __HandlerFut: Future + Send,
        __HandlerFut::Output: IntoReturnValue,
        $($param: FromContext + Send + 'static,)*
    {
        fn into_handler(self) -> BoxedHandler {
            Arc::new(FnHandler::new(self))
        }
    }
});

impl_handler_for_fn! {}
impl_handler_for_fn! { A }
impl_handler_for_fn! { A B }
impl_handler_for_fn! { A B C }
impl_handler_for_fn! { A B C D }
impl_handler_for_fn! { A B C D E }
impl_handler_for_fn! { A B C D E F }
impl_handler_for_fn! { A B C D E F G }
impl_handler_for_fn! { A B C D E F G H }
impl_handler_for_fn! { A B C D E F G H I }

/// Marker for the non-generic [`IntoHandler`] implementations.
pub struct FastArgs;

impl IntoHandler<FastArgs> for BoxedHandler {
    fn into_handler(self) -> BoxedHandler {
        self
    }
}

/// A fast invoker for the `async fn(Context)` shape.
///
/// The context is handed over directly, skipping parameter resolution.
pub struct ContextInvoker<F>(F);

/// Wraps a `async fn(Context)` handler into its fast invoker.
pub fn context_invoker<F, Fut>(f: F) -> ContextInvoker<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoReturnValue,
{
    ContextInvoker(f)
}

impl<F, Fut> Handler for ContextInvoker<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoReturnValue,
{
    fn invoke<'a>(&'a self, ctx: Context) -> BoxFuture<'a, Result<ReturnValue, InjectError>> {
        let fut = (self.0)(ctx);
        Box::pin(async move { Ok(fut.await.into_return_value()) })
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<F>()
    }
}

impl<F, Fut> IntoHandler<FastArgs> for ContextInvoker<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoReturnValue,
{
    fn into_handler(self) -> BoxedHandler {
        Arc::new(self)
    }
}

/// A fast invoker for the `async fn(ResponseWriter, Request)` shape, the
/// lowest-level handler form.
pub struct RawInvoker<F>(F);

/// Wraps a `async fn(ResponseWriter, Request)` handler into its fast
/// invoker.
pub fn raw_invoker<F, Fut>(f: F) -> RawInvoker<F>
where
    F: Fn(ResponseWriter, Request) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoReturnValue,
{
    RawInvoker(f)
}

impl<F, Fut> Handler for RawInvoker<F>
where
    F: Fn(ResponseWriter, Request) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoReturnValue,
{
    fn invoke<'a>(&'a self, ctx: Context) -> BoxFuture<'a, Result<ReturnValue, InjectError>> {
        let fut = (self.0)(ctx.response_writer().clone(), ctx.request().clone());
        Box::pin(async move { Ok(fut.await.into_return_value()) })
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<F>()
    }
}

impl<F, Fut> IntoHandler<FastArgs> for RawInvoker<F>
where
    F: Fn(ResponseWriter, Request) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoReturnValue,
{
    fn into_handler(self) -> BoxedHandler {
        Arc::new(self)
    }
}

/// Conversion of one or several handlers into a chain, so registration
/// methods accept both a single handler and a prebuilt `Vec<BoxedHandler>`
/// (see the [`handlers!`](crate::handlers) macro).
pub trait IntoHandlers<Args> {
    fn into_handlers(self) -> Vec<BoxedHandler>;
}

impl<H, Args> IntoHandlers<(Args,)> for H
where
    H: IntoHandler<Args>,
{
    fn into_handlers(self) -> Vec<BoxedHandler> {
        vec![self.into_handler()]
    }
}

pub struct VecArgs;

impl IntoHandlers<VecArgs> for Vec<BoxedHandler> {
    fn into_handlers(self) -> Vec<BoxedHandler> {
        self
    }
}

/// Builds a `Vec<BoxedHandler>` from a list of handlers of possibly
/// different shapes:
///
/// ```ignore
/// router.get("/", handlers![logger, hello]);
/// ```
#[macro_export]
macro_rules! handlers {
    ($($h:expr),* $(,)?) => {
        vec![$($crate::IntoHandler::into_handler($h)),*]
    };
}

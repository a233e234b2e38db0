//! Typed extraction of handler parameters from the request context.
//!
//! This module provides the [`FromContext`] trait, which defines how a
//! handler parameter is produced from the per-request [`Context`]. It is the
//! resolution half of dependency injection: the handler layer extracts one
//! value per parameter and fails the invocation when any of them is missing.
//!
//! Framework types ([`Context`], [`ResponseWriter`], [`Request`], [`Params`],
//! [`Method`]) are extracted structurally from the context. Everything else
//! goes through the context's injector, either as a bare [`Arc<T>`] or
//! wrapped in [`Inject<T>`].

use crate::context::Context;
use crate::inject::InjectError;
use crate::request::Request;
use crate::response_writer::ResponseWriter;
use ember_route::Params;
use http::{HeaderMap, Method, Uri};
use std::ops::Deref;
use std::sync::Arc;

/// A type that can be produced from the request context.
///
/// Implemented by framework types and by [`Arc<T>`]/[`Inject<T>`] for
/// injector-provided services. Custom implementations can compose these to
/// build richer extractors.
pub trait FromContext: Sized {
    fn from_context(ctx: &Context) -> Result<Self, InjectError>;
}

impl FromContext for Context {
    fn from_context(ctx: &Context) -> Result<Self, InjectError> {
        Ok(ctx.clone())
    }
}

impl FromContext for ResponseWriter {
    fn from_context(ctx: &Context) -> Result<Self, InjectError> {
        Ok(ctx.response_writer().clone())
    }
}

impl FromContext for Request {
    fn from_context(ctx: &Context) -> Result<Self, InjectError> {
        Ok(ctx.request().clone())
    }
}

impl FromContext for Params {
    fn from_context(ctx: &Context) -> Result<Self, InjectError> {
        Ok(ctx.params().clone())
    }
}

impl FromContext for Method {
    fn from_context(ctx: &Context) -> Result<Self, InjectError> {
        Ok(ctx.request().method().clone())
    }
}

impl FromContext for Uri {
    fn from_context(ctx: &Context) -> Result<Self, InjectError> {
        Ok(ctx.request().uri().clone())
    }
}

impl FromContext for HeaderMap {
    fn from_context(ctx: &Context) -> Result<Self, InjectError> {
        Ok(ctx.request().headers().clone())
    }
}

/// Services resolve through the injector, walking up to the application
/// injector when the request scope has no binding.
impl<T: ?Sized + Send + Sync + 'static> FromContext for Arc<T> {
    fn from_context(ctx: &Context) -> Result<Self, InjectError> {
        ctx.value::<T>().ok_or_else(InjectError::value_not_found::<T>)
    }
}

/// An extraction that is allowed to fail: a missing binding yields `None`
/// instead of failing the invocation.
impl<T: FromContext> FromContext for Option<T> {
    fn from_context(ctx: &Context) -> Result<Self, InjectError> {
        Ok(T::from_context(ctx).ok())
    }
}

/// A field-style injection wrapper.
///
/// `Inject<T>` pulls `T` from the injector and dereferences to it, which
/// keeps handler signatures close to plain field access:
///
/// ```ignore
/// async fn list(db: Inject<dyn Database>) -> String {
///     db.all().join(", ")
/// }
/// ```
pub struct Inject<T: ?Sized>(pub Arc<T>);

impl<T: ?Sized> Deref for Inject<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized + Send + Sync + 'static> FromContext for Inject<T> {
    fn from_context(ctx: &Context) -> Result<Self, InjectError> {
        ctx.value::<T>()
            .map(Inject)
            .ok_or_else(InjectError::value_not_found::<T>)
    }
}

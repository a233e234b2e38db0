//! Dispatch of handler return values to the response.
//!
//! Handlers may simply write to the [`ResponseWriter`] themselves, but most
//! return something instead: a body, a status and a body, or a `Result`.
//! Return values are converted to a [`ReturnValue`] and handed to the
//! [`ReturnHandler`] service resolved from the injector, so applications can
//! replace the default dispatch (e.g. to render errors as JSON) by mapping
//! their own.

use crate::context::Context;
use crate::response_writer::ResponseWriter;
use bytes::Bytes;
use http::StatusCode;
use std::sync::Arc;

/// The normalized form of whatever a handler returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnValue {
    /// Nothing to write.
    Unit,
    /// A body; the status defaults to 200 when unwritten.
    Body(Bytes),
    /// An explicit status followed by a body.
    StatusBody(StatusCode, Bytes),
    /// A failure, written as a 500 with the message as the body.
    Error(String),
}

impl ReturnValue {
    pub fn is_unit(&self) -> bool {
        matches!(self, Self::Unit)
    }
}

/// Conversion of handler outputs into a [`ReturnValue`].
pub trait IntoReturnValue {
    fn into_return_value(self) -> ReturnValue;
}

impl IntoReturnValue for () {
    fn into_return_value(self) -> ReturnValue {
        ReturnValue::Unit
    }
}

impl IntoReturnValue for ReturnValue {
    fn into_return_value(self) -> ReturnValue {
        self
    }
}

impl IntoReturnValue for String {
    fn into_return_value(self) -> ReturnValue {
        ReturnValue::Body(Bytes::from(self))
    }
}

impl IntoReturnValue for &'static str {
    fn into_return_value(self) -> ReturnValue {
        ReturnValue::Body(Bytes::from_static(self.as_bytes()))
    }
}

impl IntoReturnValue for Vec<u8> {
    fn into_return_value(self) -> ReturnValue {
        ReturnValue::Body(Bytes::from(self))
    }
}

impl IntoReturnValue for Bytes {
    fn into_return_value(self) -> ReturnValue {
        ReturnValue::Body(self)
    }
}

impl IntoReturnValue for StatusCode {
    fn into_return_value(self) -> ReturnValue {
        ReturnValue::StatusBody(self, Bytes::new())
    }
}

impl<T: IntoReturnValue> IntoReturnValue for (StatusCode, T) {
    fn into_return_value(self) -> ReturnValue {
        let (status, body) = self;
        match body.into_return_value() {
            ReturnValue::Unit => ReturnValue::StatusBody(status, Bytes::new()),
            ReturnValue::Body(b) => ReturnValue::StatusBody(status, b),
            // The leftmost status wins; an inner one is discarded.
            ReturnValue::StatusBody(_, b) => ReturnValue::StatusBody(status, b),
            error @ ReturnValue::Error(_) => error,
        }
    }
}

/// A non-`Ok` result is written as a 500 with the error message; `Ok`
/// dispatches its inner value, so `Ok(())` writes nothing.
impl<T, E> IntoReturnValue for Result<T, E>
where
    T: IntoReturnValue,
    E: std::fmt::Display,
{
    fn into_return_value(self) -> ReturnValue {
        match self {
            Ok(value) => value.into_return_value(),
            Err(e) => ReturnValue::Error(e.to_string()),
        }
    }
}

impl<T: IntoReturnValue> IntoReturnValue for Option<T> {
    fn into_return_value(self) -> ReturnValue {
        match self {
            Some(value) => value.into_return_value(),
            None => ReturnValue::Unit,
        }
    }
}

/// The injector-resolved service that writes return values to the response.
#[derive(Clone)]
pub struct ReturnHandler(Arc<dyn Fn(&Context, ReturnValue) + Send + Sync>);

impl ReturnHandler {
    pub fn new(f: impl Fn(&Context, ReturnValue) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn handle(&self, ctx: &Context, value: ReturnValue) {
        (self.0)(ctx, value)
    }
}

impl Default for ReturnHandler {
    fn default() -> Self {
        Self::new(default_dispatch)
    }
}

fn default_dispatch(ctx: &Context, value: ReturnValue) {
    let w = ctx.response_writer();
    if value.is_unit() {
        return;
    }
    default_content_type(w);

    match value {
        ReturnValue::Unit => {}
        // An empty bare body writes nothing at all, leaving the response
        // open for later handlers.
        ReturnValue::Body(body) => write_body(w, &body),
        ReturnValue::StatusBody(status, body) => {
            w.write_head(status);
            write_body(w, &body);
        }
        ReturnValue::Error(message) => {
            w.write_head(StatusCode::INTERNAL_SERVER_ERROR);
            write_body(w, message.as_bytes());
        }
    }
}

fn default_content_type(w: &ResponseWriter) {
    if w.written() {
        return;
    }
    let mut headers = w.headers_mut();
    if !headers.contains_key(http::header::CONTENT_TYPE) {
        headers.insert(
            http::header::CONTENT_TYPE,
            mime::TEXT_PLAIN_UTF_8.as_ref().parse().expect("static mime type"),
        );
    }
}

fn write_body(w: &ResponseWriter, body: &[u8]) {
    if body.is_empty() {
        return;
    }
    if let Err(e) = w.write(body) {
        tracing::error!(cause = %e, "failed to write response body");
    }
}

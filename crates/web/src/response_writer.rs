//! The response writer wrapper and its backing sink.
//!
//! [`ResponseWriter`] is what handlers write through. It tracks the response
//! status (first write wins), the accumulated body size, and a stack of
//! before-write hooks fired exactly once just before the head is committed
//! to the underlying [`ResponseSink`]. Middleware that needs to set headers
//! based on the final response (ETags, timing, cookies) registers a hook
//! instead of racing other writers.
//!
//! The sink abstracts over whatever actually transports the response; the
//! serving adapter uses a buffering sink, and tests use [`ResponseRecorder`]
//! to observe what was written.

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Method, StatusCode};
use std::io;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// The receiving end of a response: something able to take a head and body
/// chunks. Implementations must tolerate exactly one `write_head` call.
pub trait ResponseSink: Send {
    fn write_head(&mut self, status: StatusCode, headers: &HeaderMap);
    fn write_body(&mut self, chunk: &[u8]) -> io::Result<usize>;
}

/// A hook fired once, just before the head is written.
pub type BeforeFn = Box<dyn FnOnce(&ResponseWriter) + Send>;

/// A cheaply clonable wrapper over the response being produced for one
/// request.
#[derive(Clone)]
pub struct ResponseWriter {
    inner: Arc<Inner>,
}

struct Inner {
    method: Method,
    sink: Mutex<Box<dyn ResponseSink>>,
    headers: Mutex<HeaderMap>,
    /// The committed status code, 0 while unwritten. Doubles as the
    /// single-shot guard for `write_head`.
    status: AtomicU16,
    size: AtomicUsize,
    before: Mutex<Vec<BeforeFn>>,
}

impl ResponseWriter {
    pub fn new(method: Method, sink: Box<dyn ResponseSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                method,
                sink: Mutex::new(sink),
                headers: Mutex::new(HeaderMap::new()),
                status: AtomicU16::new(0),
                size: AtomicUsize::new(0),
                before: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The HTTP method of the request being answered. Bodies written for
    /// HEAD requests are counted but not forwarded to the sink.
    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    /// The response headers. Mutations are visible until the head is
    /// written; afterwards they have no effect on the wire.
    pub fn headers_mut(&self) -> MutexGuard<'_, HeaderMap> {
        self.inner.headers.lock().unwrap()
    }

    /// The committed status, or `None` while the head is unwritten.
    pub fn status(&self) -> Option<StatusCode> {
        let raw = self.inner.status.load(Ordering::SeqCst);
        if raw == 0 {
            return None;
        }
        StatusCode::from_u16(raw).ok()
    }

    /// Returns true once the head has been written.
    pub fn written(&self) -> bool {
        self.inner.status.load(Ordering::SeqCst) != 0
    }

    /// The number of body bytes written so far.
    pub fn size(&self) -> usize {
        self.inner.size.load(Ordering::SeqCst)
    }

    /// Registers a hook to run just before the head is written. Hooks run
    /// exactly once, in reverse registration order (last in, first out).
    pub fn before(&self, f: impl FnOnce(&ResponseWriter) + Send + 'static) {
        self.inner.before.lock().unwrap().push(Box::new(f));
    }

    /// Commits the response head. The first call wins; later calls are
    /// no-ops, so middleware cannot clobber an already written status.
    pub fn write_head(&self, status: StatusCode) {
        if self
            .inner
            .status
            .compare_exchange(0, status.as_u16(), Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let hooks = std::mem::take(&mut *self.inner.before.lock().unwrap());
        for hook in hooks.into_iter().rev() {
            hook(self);
        }

        let headers = self.inner.headers.lock().unwrap().clone();
        self.inner.sink.lock().unwrap().write_head(status, &headers);
    }

    /// Writes a body chunk, committing a 200 head first when none has been
    /// written. For HEAD requests the chunk is dropped and 0 is reported.
    pub fn write(&self, chunk: &[u8]) -> io::Result<usize> {
        if !self.written() {
            self.write_head(StatusCode::OK);
        }
        if self.inner.method == Method::HEAD {
            return Ok(0);
        }
        let n = self.inner.sink.lock().unwrap().write_body(chunk)?;
        self.inner.size.fetch_add(n, Ordering::SeqCst);
        Ok(n)
    }
}

impl std::fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("method", &self.inner.method)
            .field("status", &self.status())
            .field("size", &self.size())
            .finish()
    }
}

/// An in-memory sink recording everything written through the wrapper.
///
/// The recorder is clonable; keep one handle and hand the other to
/// [`ResponseWriter::new`], then inspect status, headers and body once the
/// request finishes.
#[derive(Clone, Default)]
pub struct ResponseRecorder {
    state: Arc<Mutex<Recorded>>,
}

#[derive(Default)]
struct Recorded {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.state.lock().unwrap().status
    }

    pub fn headers(&self) -> HeaderMap {
        self.state.lock().unwrap().headers.clone()
    }

    pub fn body(&self) -> Bytes {
        self.state.lock().unwrap().body.clone().freeze()
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().unwrap().body).into_owned()
    }
}

impl ResponseSink for ResponseRecorder {
    fn write_head(&mut self, status: StatusCode, headers: &HeaderMap) {
        let mut state = self.state.lock().unwrap();
        state.status = Some(status);
        state.headers = headers.clone();
    }

    fn write_body(&mut self, chunk: &[u8]) -> io::Result<usize> {
        self.state.lock().unwrap().body.extend_from_slice(chunk);
        Ok(chunk.len())
    }
}

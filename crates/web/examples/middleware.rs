//! Middleware and dependency injection.
//!
//! This example shows:
//! - Global middleware with "around" semantics via `ctx.next().await`
//! - Registering a service as a trait object and injecting it into handlers
//!
//! To run this example:
//! ```bash
//! cargo run --example middleware
//! ```

use ember_web::{Context, Ember};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

trait Counter: Send + Sync {
    fn next_id(&self) -> u64;
}

struct AtomicCounter(AtomicU64);

impl Counter for AtomicCounter {
    fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// Logs every request with its handling duration.
async fn timer(ctx: Context) {
    let started = Instant::now();
    let path = ctx.request().path().to_owned();
    ctx.next().await;
    info!(%path, elapsed = ?started.elapsed(), "request handled");
}

async fn next_uid(counter: Arc<dyn Counter>) -> String {
    format!("uid: {}", counter.next_id())
}

#[tokio::main]
async fn main() {
    let mut app = Ember::new();
    app.map_to::<dyn Counter>(Arc::new(AtomicCounter(AtomicU64::new(1))));
    app.use_handler(timer);
    app.get("/uid", next_uid);
    app.run_on("127.0.0.1:4000").await;
}

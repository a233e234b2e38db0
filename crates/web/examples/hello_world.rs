//! Basic example demonstrating a minimal application.
//!
//! This example shows:
//! - How to define route handlers as plain async functions
//! - How bind parameters reach a handler through the context
//!
//! To run this example:
//! ```bash
//! cargo run --example hello_world
//! ```
//! then open <http://127.0.0.1:4000/hello/world>.

use ember_web::{Context, Ember};

/// A handler reading the `{name}` bind parameter.
async fn hello(ctx: Context) -> String {
    format!("hello, {}", ctx.param("name"))
}

#[tokio::main]
async fn main() {
    let mut app = Ember::new();
    app.get("/", || async { "try /hello/world" });
    app.get("/hello/{name}", hello);
    app.run_on("127.0.0.1:4000").await;
}

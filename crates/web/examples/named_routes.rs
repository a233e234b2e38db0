//! Named routes, optional segments and reverse URL building.
//!
//! To run this example:
//! ```bash
//! cargo run --example named_routes
//! ```

use ember_web::{Context, Ember};

#[tokio::main]
async fn main() {
    let mut app = Ember::new();

    app.get("/users/{name}/?{tab}", |ctx: Context| async move {
        match ctx.param("tab") {
            "" => format!("profile of {}", ctx.param("name")),
            tab => format!("{} of {}", tab, ctx.param("name")),
        }
    })
    .name("user");

    // Renders "/users/alice" and "/users/alice/repos".
    app.get("/where", |ctx: Context| async move {
        let short = ctx.url_path("user", &[("name", "alice")]);
        let full = ctx.url_path(
            "user",
            &[("name", "alice"), ("tab", "repos"), ("withOptional", "true")],
        );
        format!("{short}\n{full}\n")
    });

    app.run_on("127.0.0.1:4000").await;
}

//! Minimal passage example: a token check, a response stamp, and a JSON
//! destination.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users?page=2
//!   curl -H 'authorization: Bearer t0k3n' http://localhost:3000/users?page=2
//!   curl -X POST http://localhost:3000/users \
//!        -H 'authorization: Bearer t0k3n' \
//!        -H 'content-type: application/x-www-form-urlencoded' \
//!        -d 'name=<b>alice</b>&email=alice@example.com'

use passage::{Middleware, Next, Pipe, Request, Response, Server, Services, Trace};
use serde_json::json;

struct RequireToken;

impl Middleware for RequireToken {
    fn handle(&self, request: Request, next: Next<'_>) -> passage::Result<Response> {
        match request.header("Authorization") {
            Some(token) if token.starts_with("Bearer ") => next.run(request),
            _ => Ok(Response::error("Unauthorized", 401)),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let services = Services::new()
        .middleware("auth", RequireToken)
        .middleware_fn("powered-by", |request, next| {
            let mut response = next.run(request)?;
            response.set_header("X-Powered-By", "passage");
            Ok::<_, passage::Error>(response)
        });

    Server::bind("0.0.0.0:3000")
        .container(services)
        .through([Pipe::layer(Trace), Pipe::named("powered-by"), Pipe::named("auth")])
        .serve(users)
        .await
        .expect("server error");
}

// GET  /users  lists one page
// POST /users  echoes the sanitised input
fn users(request: Request) -> serde_json::Value {
    if request.is_post() {
        return json!({
            "name": request.text("name", "anonymous"),
            "email": request.email("email", ""),
        });
    }

    json!({
        "page": request.absint("page", 1),
        "users": ["alice", "bob"],
    })
}

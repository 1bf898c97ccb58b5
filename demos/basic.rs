//! Basic aou server
//!
//! Run with: cargo run --example basic
//! Then: curl -i http://127.0.0.1:3000/users/42

use aou::logging::{LogConfig, LogFormat};
use aou::prelude::*;

#[derive(Debug, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
}

async fn get_user(req: HttpRequest, ctx: Context) -> Result<Json<serde_json::Value>, Error> {
    let id: u64 = req
        .param("id")
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| DomainError::new(400, "user id must be numeric"))?;
    Ok(Json(json!({
        "id": id,
        "name": format!("user-{id}"),
        "requested_by": ctx.get_str("client"),
    })))
}

async fn create_user(req: HttpRequest) -> Result<serde_json::Value, Error> {
    let user: User = req.json()?;
    Ok(json!({
        "status": 201,
        "headers": { "Location": format!("/users/{}", user.id) },
        "data": user,
    }))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _guard = LogConfig::new().format(LogFormat::Compact).init()?;

    let options = ServerOptions::from_env()?.implicit_json(true);
    let mut server = Server::with_options(options);

    let identify = MiddlewareChain::create(|req: HttpRequest, ctx: Context| async move {
        let client = req.header("user-agent").unwrap_or("unknown").to_string();
        Ok::<_, Error>((req, ctx.with("client", client)?))
    });

    server
        .get("/", |_req: HttpRequest| async { Ok::<_, Error>("aou is running") })?
        .get("/users/{id}", identify.handle(get_user))?
        .post("/users", create_user)?
        .fallback(|req: HttpRequest| async move {
            Ok::<_, Error>((404u16, format!("nothing at {}", req.path)))
        })
        .on_error(|err, summary| {
            tracing::warn!(path = %summary.path, error = %err, "request failed");
        });

    let instance = server.listen("127.0.0.1", 3000).await?;
    tracing::info!(port = instance.port(), "ready");

    tokio::signal::ctrl_c().await?;
    instance.shutdown().await;
    Ok(())
}

//! Live-socket tests: a real listener on 127.0.0.1 driven by reqwest and raw TCP.

use aou::prelude::*;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Todo {
    id: u32,
    title: String,
}

async fn start() -> ServerInstance {
    let mut server = Server::with_options(ServerOptions::new().implicit_json(true));
    server
        .get("/", |_req: HttpRequest| async { Ok::<_, Error>("hello") })
        .unwrap()
        .get("/todos/{id}", |req: HttpRequest| async move {
            let id: u32 = req
                .param("id")
                .and_then(|id| id.parse().ok())
                .ok_or_else(|| DomainError::new(400, "id must be a number"))?;
            Ok::<_, Error>(Json(Todo {
                id,
                title: format!("todo {id}"),
            }))
        })
        .unwrap()
        .post("/todos", |req: HttpRequest| async move {
            let todo: Todo = req.json()?;
            Ok::<_, Error>(json!({ "status": 201, "headers": { "Location": format!("/todos/{}", todo.id) }, "body": todo }))
        })
        .unwrap()
        .get("/boom", |_req: HttpRequest| async {
            Err::<(), _>(Error::handler("secret detail"))
        })
        .unwrap();
    server.listen("127.0.0.1", 0).await.unwrap()
}

fn url(instance: &ServerInstance, path: &str) -> String {
    format!("http://{}{}", instance.local_addr(), path)
}

async fn raw_exchange(instance: &ServerInstance, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(instance.local_addr()).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .unwrap()
        .unwrap();
    String::from_utf8(response).unwrap()
}

#[tokio::test]
async fn test_reqwest_roundtrip() {
    let instance = start().await;
    let client = reqwest::Client::new();

    let response = client.get(url(&instance, "/")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "hello");

    let response = client.get(url(&instance, "/todos/7")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );
    let todo: Todo = response.json().await.unwrap();
    assert_eq!(
        todo,
        Todo {
            id: 7,
            title: "todo 7".into()
        }
    );

    instance.shutdown().await;
}

#[tokio::test]
async fn test_explicit_response_object() {
    let instance = start().await;
    let client = reqwest::Client::new();

    let response = client
        .post(url(&instance, "/todos"))
        .json(&Todo {
            id: 3,
            title: "write tests".into(),
        })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    assert_eq!(response.headers()["location"].to_str().unwrap(), "/todos/3");
    let echoed: Todo = response.json().await.unwrap();
    assert_eq!(echoed.title, "write tests");

    instance.shutdown().await;
}

#[tokio::test]
async fn test_errors_over_the_socket() {
    let instance = start().await;
    let client = reqwest::Client::new();

    let response = client.get(url(&instance, "/todos/abc")).send().await.unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(response.text().await.unwrap(), "id must be a number");

    let response = client.get(url(&instance, "/boom")).send().await.unwrap();
    assert_eq!(response.status(), 500);
    let body = response.text().await.unwrap();
    assert!(!body.contains("secret detail"));

    let response = client.get(url(&instance, "/missing")).send().await.unwrap();
    assert_eq!(response.status(), 404);

    instance.shutdown().await;
}

#[tokio::test]
async fn test_raw_http10_closes_connection() {
    let instance = start().await;

    let response = raw_exchange(&instance, b"GET / HTTP/1.0\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Connection: close\r\n"));
    assert!(response.ends_with("\r\n\r\nhello"));

    instance.shutdown().await;
}

#[tokio::test]
async fn test_raw_garbage_gets_400() {
    let instance = start().await;

    let response = raw_exchange(&instance, b"NOT HTTP AT ALL\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));

    instance.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let instance = start().await;
    let addr = instance.local_addr();
    assert!(instance.is_running());

    assert!(instance.shutdown().await);
    assert!(!instance.is_running());

    // The listener is gone once the accept task has been aborted.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let result = reqwest::Client::new()
        .get(format!("http://{addr}/"))
        .timeout(Duration::from_millis(500))
        .send()
        .await;
    assert!(result.is_err());
}

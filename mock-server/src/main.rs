//! Serves the mock Aras API on `127.0.0.1:$PORT` (default 8080).

use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    println!("mock Aras OData server on http://{addr}");
    println!("  token endpoint: http://{addr}/oauthserver/connect/token");
    println!("  bearer token:   {}", mock_server::MOCK_TOKEN);
    mock_server::run(listener).await
}

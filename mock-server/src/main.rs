use tokio::net::TcpListener;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mock_server::Db;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    init_tracing();

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;

    let db = Db::default();
    let work_log = db.write().await.create_work_log("Default".to_string());
    tracing::info!(%addr, work_log_id = work_log.id, "listening on /api");

    mock_server::serve(listener, db).await
}

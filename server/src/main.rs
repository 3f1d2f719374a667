use mines_server::{build_rocket, config::Settings};
use tracing::info;

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    info!("🚀 Starting mines server");

    let settings = Settings::from_env();
    let rocket = build_rocket(settings)?;

    info!("📡 Endpoints: GET /defaults, GET /ws");
    rocket.launch().await?;
    Ok(())
}

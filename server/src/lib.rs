use rocket::{
    Build, Rocket,
    fairing::{Fairing, Info, Kind},
    routes,
};
use tracing::{info, warn};

pub mod cleanup;
pub mod config;
pub mod controller;
pub mod cors;
pub mod data;
pub mod error;
pub mod logic;
pub mod rate_limit;
pub mod routes;
pub mod timer;

pub use error::{BoardError, Result};

use crate::{
    cleanup::start_cleanup_task,
    config::Settings,
    cors::create_cors,
    rate_limit::{RateLimiter, create_rate_limiter},
    routes::{board_socket, defaults},
};

struct CleanupFairing;

#[rocket::async_trait]
impl Fairing for CleanupFairing {
    fn info(&self) -> Info {
        Info {
            name: "Rate Limit Cleanup",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        match (rocket.state::<RateLimiter>(), rocket.state::<Settings>()) {
            (Some(rate_limiter), Some(settings)) => {
                info!("Starting cleanup task for the rate limiter");
                tokio::spawn(start_cleanup_task(
                    rate_limiter.clone(),
                    settings.cleanup_interval,
                ));
            }
            _ => warn!("Failed to get rate limiter state for cleanup task"),
        }
        Ok(rocket)
    }
}

pub fn build_rocket(
    settings: Settings,
) -> std::result::Result<Rocket<Build>, rocket_cors::Error> {
    let cors = create_cors(&settings)?;

    Ok(rocket::build()
        .attach(cors)
        .attach(CleanupFairing)
        .manage(settings)
        .manage(create_rate_limiter())
        .mount("/", routes![defaults, board_socket]))
}

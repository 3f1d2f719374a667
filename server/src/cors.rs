use rocket::http::Method;
use rocket_cors::{AllowedHeaders, AllowedOrigins, Cors, CorsOptions};

use crate::config::Settings;

pub fn create_cors(settings: &Settings) -> Result<Cors, rocket_cors::Error> {
    let allowed_origins = AllowedOrigins::some_exact(&settings.cors_allowed_origins);

    CorsOptions {
        allowed_origins,
        allowed_methods: [Method::Get, Method::Options]
            .into_iter()
            .map(|m| m.into())
            .collect(),
        allowed_headers: AllowedHeaders::some(&["Accept", "Content-Type", "X-Requested-With"]),
        allow_credentials: false,
        ..Default::default()
    }
    .to_cors()
}

use std::{env, fmt::Display, str::FromStr, time::Duration};

use tracing::{info, warn};

use mines_common::models::GameParams;

use crate::logic::MAX_CELLS;

/// Server settings read from the environment at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Board used when the browser does not ask for a size.
    pub params: GameParams,
    /// Largest board a browser may ask for.
    pub max_cells: usize,
    pub reveal_delay: Duration,
    pub games_per_minute: u32,
    /// How often idle rate limit buckets are dropped.
    pub cleanup_interval: Duration,
    /// Read the client address from `X-Forwarded-For`/`X-Real-IP`. Only
    /// enable behind a proxy that overwrites them.
    pub trust_proxy_headers: bool,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            params: GameParams::default(),
            max_cells: 10_000,
            reveal_delay: Duration::from_millis(20),
            games_per_minute: 10,
            cleanup_interval: Duration::from_secs(60),
            trust_proxy_headers: false,
            cors_allowed_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid value {:?} for {}, using {}", raw, key, default);
            default
        }),
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let settings = Self::from_lookup(|key| env::var(key).ok());
        info!(
            "Default board {}x{} with {} mines, at most {} cells, reveal delay {}ms",
            settings.params.rows,
            settings.params.columns,
            settings.params.mines,
            settings.max_cells,
            settings.reveal_delay.as_millis()
        );
        info!(
            "Rate limit {} games per minute, cleanup every {}s, trust proxy headers: {}",
            settings.games_per_minute,
            settings.cleanup_interval.as_secs(),
            settings.trust_proxy_headers
        );
        settings
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let params = GameParams {
            rows: parse_or(&lookup, "BOARD_ROWS", defaults.params.rows),
            columns: parse_or(&lookup, "BOARD_COLUMNS", defaults.params.columns),
            mines: parse_or(&lookup, "BOARD_MINES", defaults.params.mines),
        };
        let mut max_cells = parse_or(&lookup, "BOARD_MAX_CELLS", defaults.max_cells);
        if max_cells > MAX_CELLS {
            warn!("BOARD_MAX_CELLS {} is above {}, capping it", max_cells, MAX_CELLS);
            max_cells = MAX_CELLS;
        }
        let reveal_delay = Duration::from_millis(parse_or(
            &lookup,
            "REVEAL_DELAY_MS",
            defaults.reveal_delay.as_millis() as u64,
        ));
        let games_per_minute = parse_or(
            &lookup,
            "RATE_LIMIT_GAMES_PER_MINUTE",
            defaults.games_per_minute,
        );
        // tokio intervals reject a zero period
        let cleanup_interval = Duration::from_secs(
            parse_or(
                &lookup,
                "RATE_LIMIT_CLEANUP_SECONDS",
                defaults.cleanup_interval.as_secs(),
            )
            .max(1),
        );
        let trust_proxy_headers = parse_or(
            &lookup,
            "TRUST_PROXY_HEADERS",
            defaults.trust_proxy_headers,
        );
        let cors_allowed_origins = match lookup("CORS_ALLOWED_ORIGINS") {
            Some(origins) => origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.cors_allowed_origins,
        };

        Self {
            params,
            max_cells,
            reveal_delay,
            games_per_minute,
            cleanup_interval,
            trust_proxy_headers,
            cors_allowed_origins,
        }
    }
}

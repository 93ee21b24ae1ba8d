use clap::Parser;

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "portfolio-demos")]
#[command(about = "Backend for the portfolio's interactive engineering demos")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    // Cache TTL in seconds for the /with-cache demo
    #[arg(short, long, env = "CACHE_TTL", default_value_t = 30)]
    pub cache_ttl: u64,

    // Simulated latency of the "slow API" behind the cache, in ms
    #[arg(long, env = "CACHE_API_DELAY_MS", default_value_t = 2000)]
    pub cache_api_delay_ms: u64,

    // How often expired cache entries are swept, in seconds
    #[arg(long, env = "CACHE_SWEEP_INTERVAL", default_value_t = 5)]
    pub cache_sweep_interval: u64,

    // Rate limit max requests per window
    #[arg(long, env = "RATE_LIMIT", default_value_t = 10)]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, env = "RATE_WINDOW", default_value_t = 60)]
    pub rate_window: u64,

    // HMAC key for the JWT demo
    #[arg(long, env = "JWT_SECRET", default_value = "demo-secret-key-2024")]
    pub jwt_secret: String,

    // Secret used when an inbound webhook doesn't name one
    #[arg(long, env = "WEBHOOK_SECRET", default_value = "demo-secret-key")]
    pub webhook_secret: String,

    // Secret the webhook proxy signs outbound payloads with
    #[arg(long, env = "PROXY_SECRET", default_value = "demo-secret-key-2024")]
    pub proxy_secret: String,

    // CORS origin for the front end, "*" allows any
    #[arg(long, env = "ALLOWED_ORIGIN", default_value = "*")]
    pub allowed_origin: String,
}

impl Default for Args {
    fn default() -> Self {
        Args::parse_from(["portfolio-demos"])
    }
}

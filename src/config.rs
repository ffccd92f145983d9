use std::env;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const PORT: &str = "PORT";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const STORAGE_DIR: &str = "LYLLA_STORAGE_DIR";
    pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
    pub const CLAUDE_ENDPOINT: &str = "CLAUDE_ENDPOINT";
    pub const CLAUDE_MODEL: &str = "CLAUDE_MODEL";
    pub const TAVILY_API_KEY: &str = "TAVILY_API_KEY";
}

/// Default values
pub mod defaults {
    pub const PORT: u16 = 8080;
    pub const DATABASE_URL: &str = "./.db/lylla.db";
    pub const STORAGE_DIR: &str = "./storage";
}

/// Get the storage directory from environment or default
pub fn storage_dir() -> String {
    env::var(env_vars::STORAGE_DIR).unwrap_or_else(|_| defaults::STORAGE_DIR.to_string())
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub storage_dir: String,
    pub anthropic_api_key: String,
    pub claude_endpoint: Option<String>,
    pub claude_model: Option<String>,
    pub tavily_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var(env_vars::PORT)
                .unwrap_or_else(|_| defaults::PORT.to_string())
                .parse()
                .expect("PORT must be a valid number"),
            database_url: env::var(env_vars::DATABASE_URL)
                .unwrap_or_else(|_| defaults::DATABASE_URL.to_string()),
            storage_dir: storage_dir(),
            anthropic_api_key: env::var(env_vars::ANTHROPIC_API_KEY)
                .expect("ANTHROPIC_API_KEY must be set"),
            claude_endpoint: env::var(env_vars::CLAUDE_ENDPOINT).ok(),
            claude_model: env::var(env_vars::CLAUDE_MODEL).ok(),
            tavily_api_key: env::var(env_vars::TAVILY_API_KEY).ok(),
        }
    }
}

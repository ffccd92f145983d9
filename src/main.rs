use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

mod ai;
mod channels;
mod commands;
mod config;
mod context;
mod controllers;
mod db;
mod dispatcher;
mod memory;
mod models;
mod scheduler;
mod search;
mod stores;

use ai::{ClaudeClient, ModelClient};
use channels::TelegramManager;
use commands::CommandExecutor;
use config::Config;
use db::Database;
use dispatcher::MessageDispatcher;
use memory::{ConversationCache, ConversationLog, IdentityStore, MemoryStore};
use scheduler::Scheduler;
use search::SearchClient;
use stores::{JsonNoteStore, JsonTaskStore, NoteStore, TaskStore};

pub struct AppState {
    pub db: Arc<Database>,
    pub config: Config,
    pub dispatcher: Arc<MessageDispatcher>,
    pub telegram: Arc<TelegramManager>,
    pub identities: Arc<IdentityStore>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let port = config.port;

    log::info!("Initializing database at {}", config.database_url);
    let db = Database::new(&config.database_url).expect("Failed to initialize database");
    let db = Arc::new(db);

    let storage = config.storage_dir.clone();
    let memory = Arc::new(MemoryStore::new(&storage));
    let identities = Arc::new(IdentityStore::new(&storage));
    let transcript = Arc::new(ConversationLog::new(&storage));
    let cache = Arc::new(ConversationCache::new());
    let tasks: Arc<dyn TaskStore> = Arc::new(JsonTaskStore::new(&storage));
    let notes: Arc<dyn NoteStore> = Arc::new(JsonNoteStore::new(&storage));

    let model: Arc<dyn ModelClient> = Arc::new(
        ClaudeClient::new(
            &config.anthropic_api_key,
            config.claude_endpoint.as_deref(),
            config.claude_model.as_deref(),
        )
        .expect("Failed to create Claude client"),
    );

    let search = Arc::new(SearchClient::new(config.tavily_api_key.clone()));
    if !search.is_configured() {
        log::warn!("TAVILY_API_KEY not set; web search is disabled");
    }

    let executor = CommandExecutor::new(
        memory.clone(),
        tasks.clone(),
        notes.clone(),
        Some(db.clone()),
    );

    log::info!("Initializing message dispatcher");
    let dispatcher = Arc::new(MessageDispatcher::new(
        model,
        identities.clone(),
        memory,
        transcript,
        cache,
        tasks.clone(),
        notes,
        search,
        executor,
    ));

    let telegram = Arc::new(TelegramManager::new(
        db.clone(),
        dispatcher.clone(),
        identities.clone(),
    ));
    telegram.initialize_from_storage();

    let scheduler = Arc::new(Scheduler::new(
        db.clone(),
        telegram.clone(),
        dispatcher.clone(),
        tasks,
    ));
    tokio::spawn(scheduler.run());

    log::info!("Starting Lylla backend on port {}", port);

    let tg = telegram.clone();
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                db: Arc::clone(&db),
                config: config.clone(),
                dispatcher: Arc::clone(&dispatcher),
                telegram: Arc::clone(&telegram),
                identities: Arc::clone(&identities),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::chat::config)
            .configure(controllers::identity::config)
            .configure(controllers::integrations::config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await;

    log::info!("Server stopped; shutting down Telegram bots");
    tg.shutdown_all().await;

    server
}

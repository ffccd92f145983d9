use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectTelegramRequest {
    pub user_id: String,
    pub bot_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectTelegramRequest {
    pub user_id: String,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/integrations/telegram")
            .route(web::post().to(connect_telegram))
            .route(web::delete().to(disconnect_telegram)),
    );
}

async fn connect_telegram(
    state: web::Data<AppState>,
    body: web::Json<ConnectTelegramRequest>,
) -> impl Responder {
    if body.bot_token.trim().is_empty() {
        return HttpResponse::BadRequest().json(json!({ "error": "botToken must not be empty" }));
    }

    let integration = match state
        .db
        .upsert_telegram_integration(&body.user_id, body.bot_token.trim())
    {
        Ok(integration) => integration,
        Err(e) => {
            log::error!("Failed to persist integration for user {}: {}", body.user_id, e);
            return HttpResponse::InternalServerError()
                .json(json!({ "error": "Failed to save integration" }));
        }
    };

    if let Err(e) = state
        .telegram
        .start_bot(&body.user_id, body.bot_token.trim())
        .await
    {
        // The integration is saved; the bot will be retried at next boot
        log::error!("Failed to start Telegram bot for user {}: {}", body.user_id, e);
        return HttpResponse::Conflict().json(json!({ "error": e }));
    }

    HttpResponse::Ok().json(integration)
}

async fn disconnect_telegram(
    state: web::Data<AppState>,
    body: web::Json<DisconnectTelegramRequest>,
) -> impl Responder {
    let stopped = state.telegram.stop_bot(&body.user_id).await;

    match state.db.deactivate_telegram_integration(&body.user_id) {
        Ok(existed) => HttpResponse::Ok().json(json!({
            "stopped": stopped,
            "deactivated": existed,
        })),
        Err(e) => {
            log::error!("Failed to deactivate integration for user {}: {}", body.user_id, e);
            HttpResponse::InternalServerError()
                .json(json!({ "error": "Failed to deactivate integration" }))
        }
    }
}

use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

use crate::memory::BotIdentity;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveIdentityRequest {
    pub user_id: String,
    #[serde(flatten)]
    pub identity: BotIdentity,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/ai/identity")
            .route(web::get().to(get_identity))
            .route(web::put().to(save_identity)),
    );
}

async fn get_identity(
    state: web::Data<AppState>,
    query: web::Query<IdentityQuery>,
) -> impl Responder {
    // Missing or corrupt files fall back to the default identity
    let identity = state.identities.get(&query.user_id);
    HttpResponse::Ok().json(identity)
}

async fn save_identity(
    state: web::Data<AppState>,
    body: web::Json<SaveIdentityRequest>,
) -> impl Responder {
    match state.identities.save(&body.user_id, &body.identity) {
        Ok(()) => HttpResponse::Ok().json(&body.identity),
        Err(e) => {
            log::error!("Failed to save identity for user {}: {}", body.user_id, e);
            HttpResponse::InternalServerError().json(json!({ "error": "Failed to save identity" }))
        }
    }
}

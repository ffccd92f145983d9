use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use crate::AppState;

fn default_conversation() -> String {
    "main".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub user_id: String,
    #[serde(default = "default_conversation")]
    pub conversation_id: String,
    pub prompt: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/ai/chat").route(web::post().to(chat)));
}

async fn chat(state: web::Data<AppState>, body: web::Json<ChatRequest>) -> impl Responder {
    if body.prompt.trim().is_empty() {
        return HttpResponse::BadRequest().json(ChatResponse {
            response: String::new(),
            options: Vec::new(),
            error: Some("prompt must not be empty".to_string()),
        });
    }

    let result = state
        .dispatcher
        .dispatch(&body.user_id, &body.conversation_id, &body.prompt)
        .await;

    let response = ChatResponse {
        response: result.response,
        options: result.options,
        error: result.error,
    };

    if response.error.is_some() {
        // The body still carries the generic user-facing text
        HttpResponse::InternalServerError().json(response)
    } else {
        HttpResponse::Ok().json(response)
    }
}

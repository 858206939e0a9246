use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::services::upstream::UpstreamError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub debug: Option<String>,
}

impl TokenQuery {
    fn debug_requested(&self) -> bool {
        matches!(self.debug.as_deref(), Some("1") | Some("true"))
    }
}

#[derive(Serialize)]
struct TokenResponse {
    token: String,
}

/// An unparsable query string counts as no debug request.
pub async fn issue_token(
    query: Option<web::Query<TokenQuery>>,
    state: web::Data<AppState>,
) -> HttpResponse {
    match state.direct_line.generate_token().await {
        Ok(token) => HttpResponse::Ok().json(TokenResponse { token }),
        Err(err) => {
            tracing::error!(error = %err, "Direct Line token request failed");
            let passthrough = state.token_debug_passthrough
                && query.map(|q| q.debug_requested()).unwrap_or(false);
            error_response(&err, passthrough)
        }
    }
}

fn error_response(err: &UpstreamError, passthrough: bool) -> HttpResponse {
    let body = match err {
        UpstreamError::UpstreamStatus { status, raw_body, .. } if passthrough => {
            let status = StatusCode::from_u16(status.as_u16())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return HttpResponse::build(status)
                .content_type("text/plain; charset=utf-8")
                .body(raw_body.clone());
        }
        UpstreamError::Configuration(msg) => msg.clone(),
        UpstreamError::UpstreamStatus { .. } => format!("Direct Line token error: {}", err),
        UpstreamError::MalformedResponse(msg) => {
            format!("Direct Line token response was malformed: {}", msg)
        }
        UpstreamError::Transport(msg) => format!("Direct Line token request failed: {}", msg),
    };

    HttpResponse::InternalServerError()
        .content_type("text/plain; charset=utf-8")
        .body(body)
}

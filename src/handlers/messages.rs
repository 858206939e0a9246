use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::models::activity::{has_activity_type, Activity};
use crate::state::AppState;

pub async fn receive_activity(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    let activity = serde_json::from_slice::<Value>(&body)
        .ok()
        .filter(has_activity_type)
        .and_then(|payload| serde_json::from_value::<Activity>(payload).ok());

    let Some(activity) = activity else {
        let user_agent = req
            .headers()
            .get("User-Agent")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        tracing::warn!(path = %req.path(), user_agent, body_len = body.len(), "invalid activity payload");
        return HttpResponse::BadRequest().body("Invalid activity payload");
    };

    let span = tracing::info_span!(
        "turn",
        correlation_id = %Uuid::new_v4(),
        kind = %activity.kind,
        channel = activity.channel_id.as_deref().unwrap_or("unknown"),
    );
    process_activity(&req, activity, &state).instrument(span).await
}

async fn process_activity(req: &HttpRequest, activity: Activity, state: &AppState) -> HttpResponse {
    if let Some(auth) = &state.channel_auth {
        let header = req.headers().get("Authorization").and_then(|v| v.to_str().ok());
        if let Err(err) = auth.authenticate(header, activity.service_url.as_deref()).await {
            tracing::warn!(error = %err, "rejected unauthenticated activity");
            return HttpResponse::Unauthorized().finish();
        }
    }

    let Some(text) = state.bot.on_turn(&activity).await else {
        return HttpResponse::Ok().finish();
    };

    let reply = activity.reply(&text);
    match state.connector.send_reply(&activity, &reply).await {
        Ok(()) => {
            tracing::info!("reply delivered");
            HttpResponse::Ok().finish()
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to deliver reply");
            HttpResponse::InternalServerError().body("Server error")
        }
    }
}

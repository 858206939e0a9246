use reqwest::Client;

use crate::bot::QnaBot;
use crate::config::Config;
use crate::services::channel_auth::ChannelAuthenticator;
use crate::services::connector::ConnectorClient;
use crate::services::direct_line::DirectLineClient;
use crate::services::question_answering::QuestionAnsweringClient;

pub struct AppState {
    pub direct_line: DirectLineClient,
    pub bot: QnaBot,
    pub connector: ConnectorClient,
    /// `None` when no bot app id is configured (emulator / local mode).
    pub channel_auth: Option<ChannelAuthenticator>,
    pub token_debug_passthrough: bool,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let client = Client::new();

        let channel_auth = config.bot.app_id.as_ref().map(|app_id| {
            ChannelAuthenticator::new(
                client.clone(),
                app_id.clone(),
                config.bot.openid_metadata_url.clone(),
            )
        });

        Self {
            direct_line: DirectLineClient::new(client.clone(), config.direct_line.clone()),
            bot: QnaBot::new(QuestionAnsweringClient::new(client.clone(), config.language.clone())),
            connector: ConnectorClient::new(client, config.bot.clone()),
            channel_auth,
            token_debug_passthrough: config.direct_line.debug_passthrough,
        }
    }
}

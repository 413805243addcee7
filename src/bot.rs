//! Telegram transport: outbound chat messages and the inbound command listener

use crate::channels::ChatTransport;
use crate::commands::CommandEndpoint;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::{debug, info};

/// Build a bot client, routed through `proxy` when one is configured.
///
/// The client timeout must outlast the long-polling timeout.
pub fn build_bot(token: &str, proxy: Option<&str>) -> Result<Bot> {
    let mut builder = teloxide::net::default_reqwest_settings().timeout(Duration::from_secs(45));
    if let Some(proxy) = proxy {
        let proxy = bot_reqwest::Proxy::all(proxy)
            .map_err(|e| Error::Config(format!("invalid PROXY_URL {:?}: {}", proxy, e)))?;
        builder = builder.proxy(proxy);
        info!("Telegram traffic routed through proxy");
    }
    let client = builder
        .build()
        .map_err(|e| Error::Config(format!("telegram client: {}", e)))?;
    Ok(Bot::with_client(token, client))
}

#[async_trait]
impl ChatTransport for Bot {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_message(ChatId(chat_id), text).await?;
        Ok(())
    }
}

/// Check the token and return the bot's username
pub async fn verify(bot: &Bot) -> Result<String> {
    let me = bot.get_me().await?;
    Ok(me.username.clone().unwrap_or_default())
}

/// Long-poll for commands until the process is stopped
pub async fn run_command_listener(bot: Bot, endpoint: Arc<CommandEndpoint>) {
    info!("Command listener started");
    teloxide::repl(bot, move |bot: Bot, msg: Message| {
        handle_message(bot, msg, Arc::clone(&endpoint))
    })
    .await;
    info!("Command listener stopped");
}

async fn handle_message(bot: Bot, msg: Message, endpoint: Arc<CommandEndpoint>) -> ResponseResult<()> {
    let (Some(user), Some(text)) = (msg.from.as_ref(), msg.text()) else {
        return Ok(());
    };

    let principal = user.id.0 as i64;
    debug!(principal, chat_id = msg.chat.id.0, "received command message");

    if let Some(reply) = endpoint.handle(principal, text).await {
        bot.send_message(msg.chat.id, reply).await?;
    }
    Ok(())
}

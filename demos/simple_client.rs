//! Simple IRC client example
//!
//! Connects to a server, negotiates capabilities (and SASL PLAIN when
//! `IRC_SASL_PASSWORD` is set), joins a channel and echoes what people say
//! there until the connection closes or Ctrl-C is pressed.
//!
//! ```text
//! IRC_SERVER=irc.libera.chat:6667 IRC_CHANNEL=#slirc-test RUST_LOG=info \
//!     cargo run --example simple_client
//! ```

use std::env;

use anyhow::Context as _;
use tracing::info;
use tracing_subscriber::EnvFilter;

use slirc_engine::{
    Context, EngineBuilder, EngineConfig, Event, Flow, FnHandler, Inbound, Outbound, Position,
    SaslCredentials,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let server = env::var("IRC_SERVER").unwrap_or_else(|_| "irc.libera.chat:6667".into());
    let channel = env::var("IRC_CHANNEL").unwrap_or_else(|_| "#slirc-test".into());
    let nickname = env::var("IRC_NICK").unwrap_or_else(|_| "slirc_example".into());

    let config = EngineConfig {
        sasl: env::var("IRC_SASL_PASSWORD").ok().map(|password| SaslCredentials {
            account: nickname.clone(),
            password: Some(password),
            ..SaslCredentials::default()
        }),
        nickname,
        ..EngineConfig::default()
    };

    let join_on_welcome = {
        let channel = channel.clone();
        FnHandler::new("join-on-welcome", move |ctx: &Context<'_>, event: &mut Event| {
            if let Event::Received(Inbound::Welcome { nickname, .. }) = event {
                info!(%nickname, %channel, "registered, joining");
                ctx.send(Outbound::Join {
                    channels: vec![channel.clone()],
                    keys: Vec::new(),
                });
            }
            Ok(Flow::Continue)
        })
    };

    let echo = FnHandler::new("echo", |ctx: &Context<'_>, event: &mut Event| {
        match event {
            Event::Received(Inbound::Message {
                source: Some(source),
                target,
                message,
            }) if target.starts_with('#') => {
                let nick = source.nick().unwrap_or("someone");
                ctx.send(Outbound::Privmsg {
                    targets: vec![target.clone()],
                    message: format!("{} said: {}", nick, message),
                });
            }
            Event::Received(Inbound::Action { source, text, .. }) => {
                println!("* {} {}", source.as_ref().and_then(|s| s.nick()).unwrap_or("?"), text);
            }
            _ => {}
        }
        Ok(Flow::Continue)
    });

    let engine = EngineBuilder::new(config)
        .handler(join_on_welcome, Position::Last)
        .handler(echo, Position::Last)
        .on_disconnect(|_, reason| info!(?reason, "disconnected"))
        .connect(server.as_str())
        .await
        .with_context(|| format!("connecting to {}", server))?;

    tokio::select! {
        _ = engine.closed() => {}
        _ = tokio::signal::ctrl_c() => {
            engine.quit(Some("example finished".into()));
            engine.closed().await;
        }
    }
    Ok(())
}

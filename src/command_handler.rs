//! Prefix command interface
//!
//! Parses `<prefix> training ...` and `<prefix> timezone ...` messages and
//! feeds them into the scheduler core. Mention tokens are stripped from the
//! argument list before time parsing; the audience is taken from the
//! message's mention metadata instead.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0

use anyhow::Result;
use chrono::Utc;
use chrono_tz::Tz;
use log::{debug, info, warn};
use regex::Regex;
use serenity::model::channel::Message;
use serenity::prelude::Context;
use std::sync::OnceLock;

use crate::core::TimeError;
use crate::database::{Database, EVERYONE};
use crate::features::trainings::{time, TrainingScheduler};

/// User mention token, e.g. `<@123>` or `<@!123>`.
fn mention_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^<@!?[0-9]+>$").expect("valid regex"))
}

#[derive(Clone)]
pub struct CommandHandler {
    database: Database,
    scheduler: TrainingScheduler,
    prefix: String,
}

impl CommandHandler {
    pub fn new(database: Database, scheduler: TrainingScheduler, prefix: String) -> Self {
        CommandHandler {
            database,
            scheduler,
            prefix,
        }
    }

    pub async fn handle_message(&self, ctx: &Context, msg: &Message) -> Result<()> {
        if msg.author.bot || !msg.content.starts_with(&self.prefix) {
            return Ok(());
        }

        debug!("Received command message: {}", msg.content);

        // Drop the prefix token and every mention; mentions come back in
        // from the message metadata when the audience is built.
        let mut args = strip_mentions(&msg.content);
        args.remove(0);

        let Some(cmd) = args.first().map(|c| c.to_lowercase()) else {
            return self.reply(ctx, msg, "Was that meant for me? I can't understand :(").await;
        };
        let args = &args[1..];

        match cmd.as_str() {
            "timezone" => self.handle_timezone(ctx, msg, args).await,
            "training" => self.handle_training(ctx, msg, args).await,
            _ => {
                debug!("Unrecognized command `{cmd}`");
                self.reply(ctx, msg, "Was that meant for me? I can't understand :(").await
            }
        }
    }

    async fn handle_timezone(&self, ctx: &Context, msg: &Message, args: &[String]) -> Result<()> {
        let [zone] = args else {
            return self.reply(ctx, msg, "Usage: timezone <IANA zone name>").await;
        };

        if let Err(e) = self.database.set_timezone(zone).await {
            warn!("Failed to store timezone: {e}");
            return self
                .reply(ctx, msg, "Sorry, I couldn't save that setting. Try again later.")
                .await;
        }

        info!("Timezone setting updated to {zone}");
        self.reply(ctx, msg, &format!("Timezone set to {zone}")).await
    }

    async fn handle_training(&self, ctx: &Context, msg: &Message, args: &[String]) -> Result<()> {
        let (time_expr, link) = split_time_and_link(args);
        if time_expr.is_empty() {
            return self
                .reply(ctx, msg, "Usage: training <time> [link <url>] [@mentions]")
                .await;
        }

        let zone = match self.database.get_timezone().await {
            Ok(zone) => zone,
            Err(e) => {
                warn!("Failed to read timezone, falling back to UTC: {e}");
                "UTC".to_string()
            }
        };
        debug!("Timezone: {zone}");

        let date = match time::resolve(&time_expr, &zone, Utc::now()) {
            Ok(date) => date,
            Err(TimeError::InvalidTime(expr)) => {
                return self
                    .reply(ctx, msg, &format!("I couldn't understand `{expr}` as a time."))
                    .await;
            }
            Err(TimeError::PastTime(when)) => {
                return self
                    .reply(ctx, msg, &format!("{when} is already in the past."))
                    .await;
            }
        };

        let audience = if msg.mention_everyone {
            vec![EVERYONE.to_string()]
        } else {
            msg.mentions.iter().map(|user| user.id.0.to_string()).collect()
        };

        let training = match self
            .database
            .create_training(
                &msg.channel_id.0.to_string(),
                date,
                link.as_deref(),
                &audience,
            )
            .await
        {
            Ok(training) => training,
            Err(e) => {
                warn!("Failed to persist training: {e}");
                return self
                    .reply(ctx, msg, "Sorry, I couldn't save that training. Try again later.")
                    .await;
            }
        };

        info!(
            "Training {} set for {} in channel {}",
            training.id, training.date, training.channel
        );

        let display = match zone.parse::<Tz>() {
            Ok(tz) => date.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z").to_string(),
            Err(_) => date.to_rfc3339(),
        };
        self.reply(ctx, msg, &format!("Training set for {display}")).await?;

        // Due within the current reconciliation window? Arm right away,
        // otherwise the hourly sweep will pick it up.
        self.scheduler.schedule_if_due(&training);

        Ok(())
    }

    async fn reply(&self, ctx: &Context, msg: &Message, text: &str) -> Result<()> {
        msg.channel_id.say(&ctx.http, text).await?;
        Ok(())
    }
}

/// Tokenize a command message, dropping user mentions and `@everyone`.
fn strip_mentions(content: &str) -> Vec<String> {
    content
        .split_whitespace()
        .filter(|token| !(mention_pattern().is_match(token) || *token == "@everyone"))
        .map(str::to_string)
        .collect()
}

/// Split training args into the time expression and an optional link
/// introduced by a literal `link` token.
fn split_time_and_link(args: &[String]) -> (String, Option<String>) {
    match args.iter().position(|a| a == "link") {
        Some(idx) => {
            let time_expr = args[..idx].join(" ");
            let link = args.get(idx + 1).cloned();
            (time_expr, link)
        }
        None => (args.join(" "), None),
    }
}

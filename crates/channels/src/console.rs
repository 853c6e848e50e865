//! Console channel: drive the bot from a terminal.
//!
//! Reads one event per stdin line, prints outbound messages to stdout. Handy
//! for trying personas and commands without a streaming platform.
//!
//! Line syntax:
//!
//! ```text
//! [#channel] [@user[:role]] text      chat message (role: viewer|mod|broadcaster)
//! [#channel] /follow user
//! [#channel] /sub user [months]
//! [#channel] /raid user [viewers]
//! exit | quit | /quit
//! ```
//!
//! The channel and user given last are remembered for the following lines.

use async_trait::async_trait;
use streamchat_core::channel::Channel;
use streamchat_core::error::ChannelError;
use streamchat_core::event::{AuthorRole, ChatEvent};
use streamchat_core::message::OutboundMessage;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

/// What one console line turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    Event(ChatEvent),
    /// Nothing to send (blank line, or only a channel/user switch).
    Nothing,
    Quit,
    /// Unrecognized input; the string explains why.
    Invalid(String),
}

/// Stateful line parser: remembers the current channel and author.
#[derive(Debug, Clone)]
pub struct LineParser {
    channel: String,
    user: String,
    role: AuthorRole,
}

impl LineParser {
    pub fn new(default_channel: impl Into<String>) -> Self {
        Self {
            channel: default_channel.into(),
            user: "viewer".into(),
            role: AuthorRole::Viewer,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn parse(&mut self, line: &str) -> ConsoleInput {
        let mut rest = line.trim();
        if rest.is_empty() {
            return ConsoleInput::Nothing;
        }
        if matches!(rest, "exit" | "quit" | "/quit" | "/exit") {
            return ConsoleInput::Quit;
        }

        if rest.starts_with('#') {
            let (channel, tail) = split_token(rest);
            if channel.len() > 1 {
                self.channel = channel.to_string();
            }
            rest = tail;
        }

        if let Some(command) = rest.strip_prefix('/') {
            return self.platform_event(command);
        }

        if let Some(author) = rest.strip_prefix('@') {
            let (author, tail) = split_token(author);
            let (name, role) = match author.split_once(':') {
                Some((name, role)) => match role.parse::<AuthorRole>() {
                    Ok(role) => (name, role),
                    Err(e) => return ConsoleInput::Invalid(e),
                },
                None => (author, AuthorRole::Viewer),
            };
            if name.is_empty() {
                return ConsoleInput::Invalid("missing user name after '@'".into());
            }
            self.user = name.to_string();
            self.role = role;
            rest = tail;
        }

        if rest.is_empty() {
            return ConsoleInput::Nothing;
        }

        ConsoleInput::Event(
            ChatEvent::message(&self.channel, &self.user, rest).with_role(self.role),
        )
    }

    fn platform_event(&self, command: &str) -> ConsoleInput {
        let mut parts = command.split_whitespace();
        let verb = parts.next().unwrap_or_default().to_lowercase();
        let Some(user) = parts.next().map(|u| u.trim_start_matches('@')) else {
            return ConsoleInput::Invalid(format!("usage: /{verb} <user>"));
        };

        let number = |default: u32| -> Result<u32, String> {
            match parts.clone().next() {
                Some(n) => n.parse().map_err(|_| format!("'{n}' is not a number")),
                None => Ok(default),
            }
        };

        let event = match verb.as_str() {
            "follow" => ChatEvent::follow(&self.channel, user),
            "sub" | "subscribe" => match number(1) {
                Ok(months) => ChatEvent::subscription(&self.channel, user, months),
                Err(e) => return ConsoleInput::Invalid(e),
            },
            "raid" => match number(0) {
                Ok(viewers) => ChatEvent::raid(&self.channel, user, viewers),
                Err(e) => return ConsoleInput::Invalid(e),
            },
            other => return ConsoleInput::Invalid(format!("unknown event '/{other}'")),
        };
        ConsoleInput::Event(event)
    }
}

fn split_token(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim_start()),
        None => (s, ""),
    }
}

/// Render an outbound message the way the console prints it.
pub fn format_outbound(bot_name: &str, message: &OutboundMessage) -> String {
    format!("[{}] <{bot_name}> {}", message.channel, message.text)
}

/// Terminal connector.
pub struct ConsoleChannel {
    bot_name: String,
    default_channel: String,
}

impl ConsoleChannel {
    pub fn new(bot_name: impl Into<String>, default_channel: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
            default_channel: default_channel.into(),
        }
    }
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChatEvent, ChannelError>>, ChannelError> {
        let (tx, rx) = mpsc::channel(32);
        let mut parser = LineParser::new(self.default_channel.clone());

        tokio::spawn(async move {
            let mut lines = BufReader::new(io::stdin()).lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match parser.parse(&line) {
                        ConsoleInput::Event(event) => {
                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        ConsoleInput::Nothing => {}
                        ConsoleInput::Quit => break,
                        ConsoleInput::Invalid(reason) => {
                            eprintln!("  ! {reason}");
                        }
                    },
                    Ok(None) => break, // EOF (Ctrl+D)
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                }
            }
            debug!("Console input closed");
        });

        Ok(rx)
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        println!("{}", format_outbound(&self.bot_name, message));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamchat_core::event::EventKind;
    use streamchat_core::message::Provenance;

    fn event(input: ConsoleInput) -> ChatEvent {
        match input {
            ConsoleInput::Event(e) => e,
            other => panic!("expected an event, got {other:?}"),
        }
    }

    #[test]
    fn plain_line_uses_defaults() {
        let mut p = LineParser::new("#console");
        let e = event(p.parse("hello bot"));
        assert_eq!(e.channel, "#console");
        assert_eq!(e.author_name, "viewer");
        assert_eq!(e.author_role, AuthorRole::Viewer);
        assert_eq!(e.text, "hello bot");
        assert_eq!(e.kind, EventKind::Message);
    }

    #[test]
    fn channel_and_user_are_remembered() {
        let mut p = LineParser::new("#console");
        let e = event(p.parse("#games @Mia:mod !reset"));
        assert_eq!(e.channel, "#games");
        assert_eq!(e.author_name, "Mia");
        assert_eq!(e.author_role, AuthorRole::Moderator);
        assert_eq!(e.text, "!reset");

        let next = event(p.parse("still me"));
        assert_eq!(next.channel, "#games");
        assert_eq!(next.author_name, "Mia");
        assert_eq!(next.author_role, AuthorRole::Moderator);
    }

    #[test]
    fn switching_without_text_sends_nothing() {
        let mut p = LineParser::new("#console");
        assert_eq!(p.parse("#other"), ConsoleInput::Nothing);
        assert_eq!(p.channel(), "#other");
        assert_eq!(p.parse("   "), ConsoleInput::Nothing);
    }

    #[test]
    fn platform_events() {
        let mut p = LineParser::new("#console");
        let follow = event(p.parse("/follow newbie"));
        assert_eq!(follow.kind, EventKind::Follow);
        assert_eq!(follow.author_name, "newbie");

        let sub = event(p.parse("/sub @fan 12"));
        assert_eq!(sub.kind, EventKind::Subscription);
        assert_eq!(sub.author_name, "fan");
        assert_eq!(sub.metadata["months"], 12);

        let raid = event(p.parse("#big /raid streamer 250"));
        assert_eq!(raid.kind, EventKind::Raid);
        assert_eq!(raid.channel, "#big");
        assert_eq!(raid.metadata["viewers"], 250);
    }

    #[test]
    fn bad_input_is_reported() {
        let mut p = LineParser::new("#console");
        assert!(matches!(p.parse("/raid"), ConsoleInput::Invalid(_)));
        assert!(matches!(p.parse("/raid x lots"), ConsoleInput::Invalid(_)));
        assert!(matches!(p.parse("/dance x"), ConsoleInput::Invalid(_)));
        assert!(matches!(p.parse("@bob:king hi"), ConsoleInput::Invalid(_)));
        assert_eq!(p.parse("quit"), ConsoleInput::Quit);
    }

    #[test]
    fn outbound_format() {
        let msg = OutboundMessage::new("#games", "gg", Provenance::Generated, 3);
        assert_eq!(format_outbound("bot", &msg), "[#games] <bot> gg");
    }

    #[test]
    fn console_channel_name() {
        assert_eq!(ConsoleChannel::new("bot", "#console").name(), "console");
    }
}

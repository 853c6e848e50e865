//! Command dispatcher: deterministic handling of `!trigger args` chat lines.
//!
//! The trigger table is filled once at startup through explicit
//! [`CommandDispatcher::register`] calls and is read-only afterwards, so
//! workers share the dispatcher without locking.

pub mod builtin;

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use streamchat_core::{AuthorRole, ChatEvent, CommandError, EventKind, OutboundMessage, Provenance};
use tracing::{debug, error};

use crate::context::ContextStore;

/// Everything a handler may look at while producing its reply.
pub struct CommandContext<'a> {
    pub event: &'a ChatEvent,
    /// Text after the trigger token, trimmed
    pub args: &'a str,
    /// Normalized trigger that matched (no prefix, lowercase)
    pub trigger: &'a str,
    pub context: &'a ContextStore,
    dispatcher: &'a CommandDispatcher,
}

impl CommandContext<'_> {
    pub fn prefix(&self) -> &str {
        &self.dispatcher.prefix
    }

    pub fn bot_name(&self) -> &str {
        &self.dispatcher.bot_name
    }

    /// Prefixed triggers the author is allowed to run, sorted.
    pub fn available_commands(&self) -> Vec<String> {
        self.dispatcher
            .triggers_for(self.event.author_role)
            .into_iter()
            .map(|t| format!("{}{t}", self.dispatcher.prefix))
            .collect()
    }

    /// Empty the invoking channel's context window.
    pub fn clear_history(&self) -> bool {
        self.context.clear(&self.event.channel)
    }
}

/// A command implementation. Returning an empty string means "no reply".
pub trait CommandHandler: Send + Sync {
    fn handle(&self, ctx: &CommandContext<'_>) -> String;
}

impl<F> CommandHandler for F
where
    F: Fn(&CommandContext<'_>) -> String + Send + Sync,
{
    fn handle(&self, ctx: &CommandContext<'_>) -> String {
        self(ctx)
    }
}

struct Command {
    required_role: AuthorRole,
    handler: Box<dyn CommandHandler>,
}

/// What the dispatcher decided for one event.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// A trigger matched and the handler ran. `None` when it produced no text
    /// or failed.
    Executed(Option<OutboundMessage>),
    /// A trigger matched but the author's role is too low.
    Denied(OutboundMessage),
    /// No trigger matched; the event goes on to generation.
    NotACommand,
}

impl DispatchOutcome {
    /// Whether a trigger matched, whatever the result.
    pub fn is_command(&self) -> bool {
        !matches!(self, Self::NotACommand)
    }
}

/// Trigger table plus the parsing rules around it.
pub struct CommandDispatcher {
    prefix: String,
    bot_name: String,
    commands: HashMap<String, Command>,
}

impl CommandDispatcher {
    pub fn new(prefix: impl Into<String>, bot_name: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            bot_name: bot_name.into(),
            commands: HashMap::new(),
        }
    }

    /// Strip the prefix if present and lowercase.
    fn normalize(&self, trigger: &str) -> String {
        trigger
            .strip_prefix(self.prefix.as_str())
            .unwrap_or(trigger)
            .to_lowercase()
    }

    /// Add a command. The trigger may be given with or without the prefix.
    ///
    /// Fails with [`CommandError::DuplicateTrigger`] when the trigger is
    /// already taken; the first registration stays active.
    pub fn register(
        &mut self,
        trigger: &str,
        handler: impl CommandHandler + 'static,
        required_role: AuthorRole,
    ) -> Result<(), CommandError> {
        let name = self.normalize(trigger.trim());
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(CommandError::InvalidTrigger {
                trigger: trigger.to_string(),
                reason: "trigger must be a single non-empty token".into(),
            });
        }
        if self.commands.contains_key(&name) {
            return Err(CommandError::DuplicateTrigger(name));
        }

        debug!(trigger = %name, role = ?required_role, "Registered command");
        self.commands.insert(
            name,
            Command {
                required_role,
                handler: Box::new(handler),
            },
        );
        Ok(())
    }

    /// Match the first token of `event.text` against the table.
    ///
    /// Chat messages need the prefix; platform-native command invocations may
    /// omit it. Every other event kind is never a command.
    pub fn dispatch(&self, event: &ChatEvent, context: &ContextStore) -> DispatchOutcome {
        let text = event.text.trim_start();
        let (token, args) = match text.split_once(char::is_whitespace) {
            Some((token, rest)) => (token, rest.trim()),
            None => (text, ""),
        };

        let name = match event.kind {
            EventKind::Message => match token.strip_prefix(self.prefix.as_str()) {
                Some(name) => name.to_lowercase(),
                None => return DispatchOutcome::NotACommand,
            },
            EventKind::CommandInvocation => self.normalize(token),
            _ => return DispatchOutcome::NotACommand,
        };

        let Some((trigger, command)) = self.commands.get_key_value(&name) else {
            return DispatchOutcome::NotACommand;
        };

        if !event.author_role.satisfies(command.required_role) {
            debug!(
                channel = %event.channel,
                author = %event.author_name,
                trigger = %trigger,
                "Command denied"
            );
            let text = format!(
                "@{}, you don't have permission to use {}{trigger}.",
                event.author_name, self.prefix
            );
            return DispatchOutcome::Denied(OutboundMessage::new(
                &event.channel,
                text,
                Provenance::Command,
                event.sequence,
            ));
        }

        let ctx = CommandContext {
            event,
            args,
            trigger,
            context,
            dispatcher: self,
        };

        let reply = match catch_unwind(AssertUnwindSafe(|| command.handler.handle(&ctx))) {
            Ok(reply) => reply,
            Err(_) => {
                error!(channel = %event.channel, trigger = %trigger, "Command handler panicked");
                return DispatchOutcome::Executed(None);
            }
        };

        let reply = reply.trim();
        if reply.is_empty() {
            return DispatchOutcome::Executed(None);
        }
        DispatchOutcome::Executed(Some(OutboundMessage::new(
            &event.channel,
            reply,
            Provenance::Command,
            event.sequence,
        )))
    }

    /// Every registered trigger (no prefix), sorted.
    pub fn triggers(&self) -> Vec<&str> {
        let mut triggers: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        triggers.sort_unstable();
        triggers
    }

    fn triggers_for(&self, role: AuthorRole) -> Vec<&str> {
        let mut triggers: Vec<&str> = self
            .commands
            .iter()
            .filter(|(_, c)| role.satisfies(c.required_role))
            .map(|(t, _)| t.as_str())
            .collect();
        triggers.sort_unstable();
        triggers
    }

    pub fn required_role(&self, trigger: &str) -> Option<AuthorRole> {
        self.commands
            .get(&self.normalize(trigger))
            .map(|c| c.required_role)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

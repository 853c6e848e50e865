//! Commands every bot instance ships with.

use streamchat_core::{AuthorRole, CommandError};

use super::{CommandContext, CommandDispatcher};

fn help(ctx: &CommandContext<'_>) -> String {
    format!("Commands: {}", ctx.available_commands().join(", "))
}

fn info(ctx: &CommandContext<'_>) -> String {
    format!(
        "I'm {}, a chat bot for this stream. Mention me or just chat and I'll reply; try {}help for commands.",
        ctx.bot_name(),
        ctx.prefix()
    )
}

fn ping(_: &CommandContext<'_>) -> String {
    "Pong!".into()
}

fn reset(ctx: &CommandContext<'_>) -> String {
    ctx.clear_history();
    "Conversation history cleared.".into()
}

/// Trigger, handler, required role.
type Builtin = (&'static str, fn(&CommandContext<'_>) -> String, AuthorRole);

const BUILTINS: &[Builtin] = &[
    ("help", help, AuthorRole::Viewer),
    ("info", info, AuthorRole::Viewer),
    ("ping", ping, AuthorRole::Viewer),
    ("reset", reset, AuthorRole::Moderator),
];

/// Register the built-in commands. Fails if one of their triggers is already
/// taken.
pub fn register_builtins(dispatcher: &mut CommandDispatcher) -> Result<(), CommandError> {
    for (trigger, handler, role) in BUILTINS {
        dispatcher.register(trigger, *handler, *role)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::DispatchOutcome;
    use crate::context::ContextStore;
    use streamchat_core::{ChatEvent, ContextEntry};

    fn builtins() -> CommandDispatcher {
        let mut d = CommandDispatcher::new("!", "chatbot");
        register_builtins(&mut d).unwrap();
        d
    }

    fn run(d: &CommandDispatcher, store: &ContextStore, event: ChatEvent) -> String {
        match d.dispatch(&event, store) {
            DispatchOutcome::Executed(Some(m)) | DispatchOutcome::Denied(m) => m.text,
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[test]
    fn table_is_registered() {
        assert_eq!(builtins().triggers(), vec!["help", "info", "ping", "reset"]);
    }

    #[test]
    fn ping_pongs() {
        let store = ContextStore::new(5);
        assert_eq!(run(&builtins(), &store, ChatEvent::message("#c", "a", "!ping")), "Pong!");
    }

    #[test]
    fn help_lists_only_what_the_author_may_run() {
        let d = builtins();
        let store = ContextStore::new(5);
        let viewer = run(&d, &store, ChatEvent::message("#c", "a", "!help"));
        assert_eq!(viewer, "Commands: !help, !info, !ping");

        let moderator = run(
            &d,
            &store,
            ChatEvent::message("#c", "m", "!help").with_role(AuthorRole::Moderator),
        );
        assert!(moderator.ends_with("!reset"));
    }

    #[test]
    fn info_names_the_bot() {
        let store = ContextStore::new(5);
        let text = run(&builtins(), &store, ChatEvent::message("#c", "a", "!info"));
        assert!(text.contains("chatbot"));
        assert!(text.contains("!help"));
    }

    #[test]
    fn reset_requires_moderator_and_clears_channel() {
        let d = builtins();
        let store = ContextStore::new(5);
        store.append("#c", ContextEntry::viewer("a", "remember me"));
        store.append("#other", ContextEntry::viewer("b", "keep me"));

        let denied = run(&d, &store, ChatEvent::message("#c", "a", "!reset"));
        assert!(denied.contains("permission"));
        assert_eq!(store.snapshot("#c").len(), 1);

        let ok = run(
            &d,
            &store,
            ChatEvent::message("#c", "m", "!reset").with_role(AuthorRole::Moderator),
        );
        assert_eq!(ok, "Conversation history cleared.");
        assert!(store.snapshot("#c").is_empty());
        assert_eq!(store.snapshot("#other").len(), 1);
    }

    #[test]
    fn builtins_collide_with_existing_triggers() {
        let mut d = CommandDispatcher::new("!", "bot");
        d.register("ping", ping, AuthorRole::Viewer).unwrap();
        assert_eq!(
            register_builtins(&mut d),
            Err(CommandError::DuplicateTrigger("ping".into()))
        );
    }
}

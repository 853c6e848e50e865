//! Response generator: turns a channel's history into a provider request and
//! a completion back into a chat-sized reply. Also renders the fixed
//! reactions to follows, subscriptions and raids.

use std::sync::Arc;

use streamchat_config::{AppConfig, TemplateConfig};
use streamchat_core::{
    ChatEvent, ContextEntry, EntryRole, EventKind, PromptMessage, Provider, ProviderError,
    ProviderRequest,
};
use tracing::debug;

const ELLIPSIS: &str = "...";

pub struct ResponseGenerator {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    history_limit: usize,
    max_reply_chars: usize,
    persona: String,
    templates: TemplateConfig,
}

impl ResponseGenerator {
    pub fn from_config(provider: Arc<dyn Provider>, config: &AppConfig) -> Self {
        let generation = &config.generation;
        let model = config
            .providers
            .get(&generation.provider)
            .and_then(|p| p.default_model.clone())
            .filter(|_| generation.model.is_empty())
            .unwrap_or_else(|| generation.model.clone());

        Self {
            provider,
            model,
            temperature: generation.temperature,
            max_tokens: generation.max_tokens,
            history_limit: generation.history_limit,
            max_reply_chars: generation.max_reply_chars,
            persona: generation.persona.clone(),
            templates: config.templates.clone(),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Build the prompt for `event` from a snapshot of its channel.
    ///
    /// The snapshot usually holds `event` itself, possibly followed by chat
    /// that arrived while the reply was waiting its turn. The event's own line
    /// is left out of the history block since the instruction repeats it.
    pub fn build_request(&self, history: &[ContextEntry], event: &ChatEvent) -> ProviderRequest {
        let own = history.iter().rposition(|e| {
            e.role == EntryRole::Viewer && e.author == event.author_name && e.text == event.text
        });
        let history: Vec<&ContextEntry> = history
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != own)
            .map(|(_, e)| e)
            .collect();
        let start = history.len().saturating_sub(self.history_limit);
        let recent = &history[start..];

        let mut prompt = String::new();
        if !recent.is_empty() {
            prompt.push_str("Recent chat:\n");
            for entry in recent {
                prompt.push_str(&entry.author);
                prompt.push_str(": ");
                prompt.push_str(&entry.text);
                prompt.push('\n');
            }
            prompt.push('\n');
        }
        prompt.push_str(&format!(
            "Respond to {} who said: {}",
            event.author_name, event.text
        ));

        ProviderRequest {
            model: self.model.clone(),
            messages: vec![PromptMessage::system(&self.persona), PromptMessage::user(prompt)],
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
            stop: Vec::new(),
        }
    }

    /// One provider call. Blank completions come back as
    /// [`ProviderError::EmptyCompletion`].
    pub async fn generate(&self, request: ProviderRequest) -> Result<String, ProviderError> {
        let response = self.provider.complete(request).await?;
        if let Some(usage) = &response.usage {
            debug!(
                provider = %self.provider.name(),
                total_tokens = usage.total_tokens,
                "Completion received"
            );
        }
        let reply = self.post_process(&response.text);
        if reply.is_empty() {
            return Err(ProviderError::EmptyCompletion);
        }
        Ok(reply)
    }

    /// Trim, drop one pair of wrapping quotes, cap the length.
    pub fn post_process(&self, raw: &str) -> String {
        let mut text = raw.trim();
        for (open, close) in [('"', '"'), ('\'', '\''), ('\u{201c}', '\u{201d}')] {
            if text.chars().count() >= 2 && text.starts_with(open) && text.ends_with(close) {
                text = text[open.len_utf8()..text.len() - close.len_utf8()].trim();
                break;
            }
        }

        if text.chars().count() <= self.max_reply_chars {
            return text.to_string();
        }
        let keep = self.max_reply_chars.saturating_sub(ELLIPSIS.len());
        let mut cut: String = text.chars().take(keep).collect();
        cut.truncate(cut.trim_end().len());
        cut.push_str(ELLIPSIS);
        cut
    }

    /// Fixed reaction for follows, subscriptions and raids. `None` for any
    /// other kind, or when the template is blank.
    pub fn template_reaction(&self, event: &ChatEvent) -> Option<String> {
        let template = match event.kind {
            EventKind::Follow => &self.templates.follow,
            EventKind::Subscription => &self.templates.subscription,
            EventKind::Raid => &self.templates.raid,
            EventKind::Message | EventKind::CommandInvocation => return None,
        };
        let rendered = render_template(template, event);
        (!rendered.trim().is_empty()).then_some(rendered)
    }
}

fn metadata_number(event: &ChatEvent, key: &str) -> Option<u64> {
    let value = event.metadata.get(key)?;
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Fill `{user}`, `{channel}`, `{months}` and `{viewers}`.
pub fn render_template(template: &str, event: &ChatEvent) -> String {
    let months = metadata_number(event, "months").unwrap_or(1).to_string();
    let viewers = metadata_number(event, "viewers")
        .map(|v| v.to_string())
        .unwrap_or_else(|| "some".into());

    template
        .replace("{user}", &event.author_name)
        .replace("{channel}", &event.channel)
        .replace("{months}", &months)
        .replace("{viewers}", &viewers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use streamchat_core::{PromptRole, ProviderResponse};

    struct Canned(&'static str);

    #[async_trait]
    impl Provider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, _: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                text: self.0.into(),
                usage: None,
                model: "m".into(),
            })
        }
    }

    fn generator(reply: &'static str) -> ResponseGenerator {
        let mut config = AppConfig::default();
        config.generation.history_limit = 2;
        config.generation.max_reply_chars = 20;
        config.generation.persona = "be nice".into();
        ResponseGenerator::from_config(Arc::new(Canned(reply)), &config)
    }

    #[test]
    fn prompt_has_persona_history_and_instruction() {
        let g = generator("");
        let history = vec![
            ContextEntry::viewer("old", "too old"),
            ContextEntry::viewer("bob", "first"),
            ContextEntry::bot("bot", "second"),
            ContextEntry::viewer("alice", "what's up?"),
        ];
        let event = ChatEvent::message("#c", "alice", "what's up?");
        let req = g.build_request(&history, &event);

        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, PromptRole::System);
        assert_eq!(req.messages[0].content, "be nice");
        let user = &req.messages[1].content;
        assert!(!user.contains("too old"));
        assert!(user.contains("bob: first\nbot: second\n"));
        assert!(user.ends_with("Respond to alice who said: what's up?"));
        assert_eq!(user.matches("what's up?").count(), 1);
        assert_eq!(req.max_tokens, Some(150));
    }

    #[test]
    fn own_line_is_dropped_even_when_not_last() {
        let g = generator("");
        let history = vec![
            ContextEntry::viewer("alice", "hello"),
            ContextEntry::viewer("bob", "later line"),
        ];
        let event = ChatEvent::message("#c", "alice", "hello");
        let user = g.build_request(&history, &event).messages[1].content.clone();
        assert_eq!(
            user,
            "Recent chat:\nbob: later line\n\nRespond to alice who said: hello"
        );
    }

    #[test]
    fn prompt_without_history() {
        let g = generator("");
        let event = ChatEvent::message("#c", "alice", "hi");
        let req = g.build_request(&[], &event);
        assert_eq!(req.messages[1].content, "Respond to alice who said: hi");
    }

    #[test]
    fn post_process_strips_quotes_and_truncates() {
        let g = generator("");
        assert_eq!(g.post_process("  \"hello\"  "), "hello");
        assert_eq!(g.post_process("'single'"), "single");
        assert_eq!(g.post_process("\"unbalanced"), "\"unbalanced");
        assert_eq!(g.post_process("'tis the season"), "'tis the season");
        assert_eq!(g.post_process("rock and roll'"), "rock and roll'");
        assert_eq!(g.post_process("\""), "\"");

        let long = g.post_process("this reply is much longer than twenty chars");
        assert!(long.ends_with("..."));
        assert!(long.chars().count() <= 20);
    }

    #[tokio::test]
    async fn blank_completion_is_an_error() {
        let g = generator("   \"\"  ");
        let req = g.build_request(&[], &ChatEvent::message("#c", "a", "x"));
        assert!(matches!(g.generate(req).await, Err(ProviderError::EmptyCompletion)));
    }

    #[tokio::test]
    async fn generate_returns_cleaned_text() {
        let g = generator("\"sure thing\"");
        let req = g.build_request(&[], &ChatEvent::message("#c", "a", "x"));
        assert_eq!(g.generate(req).await.unwrap(), "sure thing");
    }

    #[test]
    fn templates_render_placeholders() {
        let g = generator("");
        let raid = g.template_reaction(&ChatEvent::raid("#c", "Raider", 42)).unwrap();
        assert!(raid.contains("Raider"));
        assert!(raid.contains("42 viewers"));

        let sub = g
            .template_reaction(&ChatEvent::subscription("#c", "Fan", 6))
            .unwrap();
        assert!(sub.contains("6 months"));

        let follow = g.template_reaction(&ChatEvent::follow("#c", "Newbie")).unwrap();
        assert!(follow.contains("Newbie"));

        assert!(g.template_reaction(&ChatEvent::message("#c", "a", "hi")).is_none());
    }

    #[test]
    fn template_defaults_for_missing_metadata() {
        let event = ChatEvent::new(EventKind::Subscription, "#c", "Fan", "");
        assert_eq!(render_template("{user} {months} {channel}", &event), "Fan 1 #c");
        let raid = ChatEvent::new(EventKind::Raid, "#c", "R", "").with_metadata("viewers", "17");
        assert_eq!(render_template("{viewers}", &raid), "17");
    }
}

//! Selector catalog: ranked CSS selectors per target and role.
//!
//! Order inside a list is priority. The resolver stops at the first selector
//! that matches anything, so more specific selectors go first and broad
//! catch-alls go last. Lists are plain data and can be replaced from config.

use crate::Target;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Generic text-entry elements tried when every input selector of a target misses.
pub const GENERIC_INPUTS: &[&str] = &[
    "textarea",
    "input[type=\"text\"]",
    "[contenteditable=\"true\"]",
    "[role=\"textbox\"]",
];

/// Generic conversation containers tried when every response selector misses.
/// All matches are collected in this order and the last one wins.
pub const GENERIC_RESPONSES: &[&str] = &[
    ".message",
    ".chat-message",
    ".conversation-turn",
    ".response",
    "[role=\"region\"]",
];

/// Token looked for in a button's text or accessible label.
pub const SEND_TOKEN: &str = "send";

/// How many ancestor levels above the input are searched for a send button.
pub const ANCESTOR_LEVELS: usize = 3;

/// What an element is used for during a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Input,
    Button,
    Response,
}

impl Role {
    /// Conversation UIs append new turns, so the response role takes the
    /// last match; everything else takes the first.
    pub fn takes_last(&self) -> bool {
        matches!(self, Role::Response)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Input => write!(f, "input field"),
            Role::Button => write!(f, "send button"),
            Role::Response => write!(f, "response"),
        }
    }
}

/// Ordered selector expressions for one role.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectorList(Vec<String>);

impl SelectorList {
    pub fn new<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(selectors.into_iter().map(Into::into).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[&str]> for SelectorList {
    fn from(selectors: &[&str]) -> Self {
        Self::new(selectors.iter().copied())
    }
}

/// Everything the engine knows about one chat service's page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    /// Canonical chat URL, used to open tabs and for pre-navigation.
    pub url: String,
    /// URL fragments identifying an open tab of this service, tried in order.
    pub tab_patterns: Vec<String>,
    pub input: SelectorList,
    pub button: SelectorList,
    pub response: SelectorList,
    /// Markers present while a reply is still streaming. Empty means the
    /// stability count alone decides completion.
    pub generating: SelectorList,
    /// Controls that start a new conversation, clicked before asking.
    pub new_chat: SelectorList,
    /// Only click a new-conversation control while one of these is on the
    /// page. Empty means always.
    pub new_chat_when: SelectorList,
    /// Reload the canonical URL before every question.
    pub fresh_conversation: bool,
}

impl TargetSpec {
    /// Selector list for a role.
    pub fn selectors(&self, role: Role) -> &SelectorList {
        match role {
            Role::Input => &self.input,
            Role::Button => &self.button,
            Role::Response => &self.response,
        }
    }

    /// Whether a tab URL belongs to this service.
    pub fn matches_url(&self, url: &str) -> bool {
        self.url_rank(url).is_some()
    }

    /// Index of the first tab pattern `url` contains. Lower ranks win when
    /// several tabs match.
    pub fn url_rank(&self, url: &str) -> Option<usize> {
        self.tab_patterns.iter().position(|p| url.contains(p.as_str()))
    }

    fn gemini() -> Self {
        Self {
            url: "https://gemini.google.com/".into(),
            tab_patterns: vec!["gemini.google.com".into(), "bard.google.com".into()],
            input: SelectorList::new([
                "textarea[aria-label=\"Input for sending a message\"]",
                "textarea[placeholder=\"Enter a prompt here\"]",
                "textarea.message-input",
                ".ProseMirror",
                "div[contenteditable=\"true\"]",
                "textarea[placeholder=\"Message Gemini…\"]",
            ]),
            button: SelectorList::new([
                "button[aria-label=\"Send message\"]",
                "button.send-button",
                "button:has(svg)",
                "button[data-testid=\"send-button\"]",
                "button[aria-label=\"Send\"]",
            ]),
            response: SelectorList::new([
                ".gemini-response-container",
                ".response-container",
                ".model-response",
                ".response-message",
                ".message-content",
                ".message-body",
                "div[data-testid=\"llm-response\"]",
                ".conversation-container > div:last-child",
            ]),
            generating: SelectorList::new([".typing", ".result-streaming", ".stop-generating-button"]),
            new_chat: SelectorList::default(),
            new_chat_when: SelectorList::default(),
            fresh_conversation: false,
        }
    }

    fn chatgpt() -> Self {
        Self {
            url: "https://chat.openai.com/".into(),
            tab_patterns: vec!["chat.openai.com".into(), "chatgpt.com".into()],
            input: SelectorList::new([
                "#prompt-textarea",
                "textarea[data-id=\"root\"]",
                "textarea[placeholder=\"Message ChatGPT…\"]",
                "textarea[placeholder=\"Ask anything\"]",
                "input[placeholder=\"Ask anything\"]",
                "textarea[placeholder=\"Message\"]",
                "textarea",
            ]),
            button: SelectorList::new([
                "button[data-testid=\"send-button\"]",
                "button.send-button",
                "button:has(svg)",
                "button[aria-label=\"Send message\"]",
                "form button[type=\"submit\"]",
                "form button",
            ]),
            response: SelectorList::new([
                ".markdown",
                "[data-message-author-role=\"assistant\"]",
                ".assistant-message",
                ".response-content",
                ".text-message-content",
                "div[data-testid=\"conversation-turn-\"]",
                "div[data-message-author-role=\"assistant\"]",
                ".chat-message.assistant",
                ".chat-turn.assistant .content",
            ]),
            generating: SelectorList::new([
                ".typing",
                ".result-streaming",
                ".stop-generating-button",
                "button[data-testid=\"stop-button\"]",
            ]),
            // Landing page shows a one-line input; switch to the chat composer first.
            new_chat: SelectorList::new(["a[href=\"/\"]"]),
            new_chat_when: SelectorList::new(["input[placeholder=\"Ask anything\"]"]),
            fresh_conversation: false,
        }
    }

    fn claude() -> Self {
        Self {
            url: "https://claude.ai/".into(),
            tab_patterns: vec!["claude.ai".into(), "anthropic.com".into()],
            input: SelectorList::new([
                "div[contenteditable=\"true\"]",
                ".ProseMirror",
                "div[role=\"textbox\"]",
                "textarea[placeholder=\"Message Claude…\"]",
                "[data-slate-editor=\"true\"]",
                "div[placeholder=\"Enter your message...\"]",
                "textarea",
                "input[type=\"text\"]",
            ]),
            button: SelectorList::new([
                "button[aria-label=\"Send message\"]",
                "button.send-button",
                "button:has(svg)",
                "button[type=\"submit\"]",
                "button.sendButton",
                "form button[type=\"submit\"]",
                "button:not([disabled])",
            ]),
            response: SelectorList::new([
                ".claude-response",
                ".assistant-message",
                ".response-content",
                "[data-message-author-role=\"assistant\"]",
                ".message-container:last-child",
                ".prose",
                ".chat-message-container .chat-message",
                ".chat-messages .message.assistant",
                ".chatHistory .content:last-child",
                ".message.assistant",
                ".response",
            ]),
            generating: SelectorList::new([".typing", ".result-streaming", ".stop-generating-button"]),
            new_chat: SelectorList::new(["a[href=\"/new\"]"]),
            new_chat_when: SelectorList::default(),
            fresh_conversation: true,
        }
    }
}

/// Partial replacement for a target's catalog entry. Every field that is set
/// replaces the built-in value wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetOverride {
    pub url: Option<String>,
    pub tab_patterns: Option<Vec<String>>,
    pub input: Option<SelectorList>,
    pub button: Option<SelectorList>,
    pub response: Option<SelectorList>,
    pub generating: Option<SelectorList>,
    pub new_chat: Option<SelectorList>,
    pub new_chat_when: Option<SelectorList>,
    pub fresh_conversation: Option<bool>,
}

impl TargetOverride {
    /// Apply the set fields onto `spec`.
    pub fn apply(&self, spec: &mut TargetSpec) {
        if let Some(ref url) = self.url {
            spec.url = url.clone();
        }
        if let Some(ref patterns) = self.tab_patterns {
            spec.tab_patterns = patterns.clone();
        }
        if let Some(ref list) = self.input {
            spec.input = list.clone();
        }
        if let Some(ref list) = self.button {
            spec.button = list.clone();
        }
        if let Some(ref list) = self.response {
            spec.response = list.clone();
        }
        if let Some(ref list) = self.generating {
            spec.generating = list.clone();
        }
        if let Some(ref list) = self.new_chat {
            spec.new_chat = list.clone();
        }
        if let Some(ref list) = self.new_chat_when {
            spec.new_chat_when = list.clone();
        }
        if let Some(fresh) = self.fresh_conversation {
            spec.fresh_conversation = fresh;
        }
    }
}

/// Catalog entries for every target.
#[derive(Debug, Clone)]
pub struct Catalog {
    gemini: TargetSpec,
    chatgpt: TargetSpec,
    claude: TargetSpec,
}

impl Catalog {
    /// The hand-ranked selectors shipped with the crate.
    pub fn builtin() -> Self {
        Self {
            gemini: TargetSpec::gemini(),
            chatgpt: TargetSpec::chatgpt(),
            claude: TargetSpec::claude(),
        }
    }

    /// Entry for a target.
    pub fn get(&self, target: Target) -> &TargetSpec {
        match target {
            Target::Gemini => &self.gemini,
            Target::ChatGpt => &self.chatgpt,
            Target::Claude => &self.claude,
        }
    }

    fn get_mut(&mut self, target: Target) -> &mut TargetSpec {
        match target {
            Target::Gemini => &mut self.gemini,
            Target::ChatGpt => &mut self.chatgpt,
            Target::Claude => &mut self.claude,
        }
    }

    /// Replace a target's entry.
    pub fn set(&mut self, target: Target, spec: TargetSpec) {
        *self.get_mut(target) = spec;
    }

    /// Apply a config override to a target's entry.
    pub fn apply(&mut self, target: Target, patch: &TargetOverride) {
        patch.apply(self.get_mut(target));
    }

    /// First target whose tab patterns match `url`.
    pub fn target_for_url(&self, url: &str) -> Option<Target> {
        Target::ALL
            .into_iter()
            .find(|t| self.get(*t).matches_url(url))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_every_role() {
        let catalog = Catalog::builtin();
        for t in Target::ALL {
            let spec = catalog.get(t);
            assert!(!spec.input.is_empty(), "{} input", t);
            assert!(!spec.button.is_empty(), "{} button", t);
            assert!(!spec.response.is_empty(), "{} response", t);
            assert!(spec.url.starts_with("https://"));
        }
    }

    #[test]
    fn only_claude_starts_fresh() {
        let catalog = Catalog::builtin();
        assert!(catalog.get(Target::Claude).fresh_conversation);
        assert!(!catalog.get(Target::Gemini).fresh_conversation);
        assert!(!catalog.get(Target::ChatGpt).fresh_conversation);
    }

    #[test]
    fn selectors_by_role() {
        let spec = Catalog::builtin().get(Target::ChatGpt).clone();
        assert_eq!(spec.selectors(Role::Input).iter().next(), Some("#prompt-textarea"));
        assert_eq!(spec.selectors(Role::Response).iter().next(), Some(".markdown"));
        assert!(Role::Response.takes_last());
        assert!(!Role::Input.takes_last());
        assert!(!Role::Button.takes_last());
    }

    #[test]
    fn chatgpt_new_chat_only_on_landing_page() {
        let spec = Catalog::builtin().get(Target::ChatGpt).clone();
        assert_eq!(spec.new_chat, SelectorList::new(["a[href=\"/\"]"]));
        assert_eq!(
            spec.new_chat_when,
            SelectorList::new(["input[placeholder=\"Ask anything\"]"])
        );
        assert!(Catalog::builtin().get(Target::Claude).new_chat_when.is_empty());
    }

    #[test]
    fn tab_url_matching() {
        let catalog = Catalog::builtin();
        assert_eq!(
            catalog.target_for_url("https://gemini.google.com/app/123"),
            Some(Target::Gemini)
        );
        assert_eq!(
            catalog.target_for_url("https://bard.google.com/"),
            Some(Target::Gemini)
        );
        assert_eq!(
            catalog.target_for_url("https://claude.ai/chat/abc"),
            Some(Target::Claude)
        );
        assert_eq!(
            catalog.target_for_url("https://chatgpt.com/c/1"),
            Some(Target::ChatGpt)
        );
        assert_eq!(catalog.target_for_url("https://example.com"), None);
    }

    #[test]
    fn url_rank_follows_pattern_order() {
        let spec = Catalog::builtin().get(Target::ChatGpt).clone();
        assert_eq!(spec.url_rank("https://chat.openai.com/c/1"), Some(0));
        assert_eq!(spec.url_rank("https://chatgpt.com/"), Some(1));
        assert_eq!(spec.url_rank("https://claude.ai/"), None);
    }

    #[test]
    fn override_replaces_only_set_fields() {
        let mut catalog = Catalog::builtin();
        let before = catalog.get(Target::Claude).clone();
        let patch = TargetOverride {
            input: Some(SelectorList::new(["#composer"])),
            generating: Some(SelectorList::default()),
            fresh_conversation: Some(false),
            ..Default::default()
        };
        catalog.apply(Target::Claude, &patch);

        let after = catalog.get(Target::Claude);
        assert_eq!(after.input, SelectorList::new(["#composer"]));
        assert!(after.generating.is_empty());
        assert!(!after.fresh_conversation);
        assert_eq!(after.button, before.button);
        assert_eq!(after.url, before.url);
    }

    #[test]
    fn selector_list_from_yaml_sequence() {
        let list: SelectorList = serde_json::from_str(r##"["#a", ".b"]"##).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.iter().collect::<Vec<_>>(), vec!["#a", ".b"]);
    }
}

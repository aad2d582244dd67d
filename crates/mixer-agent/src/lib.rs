//! # mixer-agent
//!
//! Ask a question on a live web chat page and wait for the streamed answer to
//! settle. Nothing here relies on the page cooperating: elements are found
//! through ranked selector lists with generic fallbacks, text is written the
//! way UI frameworks expect to observe it, and completion is inferred from the
//! response text holding still.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mixer_agent::{CdpPage, Dispatch, Dispatcher, Target, TabId, TabProvider};
//!
//! struct Open;
//!
//! #[async_trait::async_trait(?Send)]
//! impl TabProvider for Open {
//!     async fn is_alive(&self, _tab: &TabId) -> mixer_agent::Result<bool> {
//!         Ok(true)
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> mixer_agent::Result<()> {
//! let browser = eoka::Browser::launch().await?;
//! let page = CdpPage::new(browser.new_page("https://claude.ai/").await?);
//! let tab = page.tab_id();
//!
//! let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
//! let dispatcher = Dispatcher::default();
//! let outcome = dispatcher
//!     .dispatch(&Open, Dispatch::new(Target::Claude, &tab, &page, "Hello?"), &tx)
//!     .await;
//! println!("{}", outcome.response_text());
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod cdp;
pub mod dispatch;
pub mod inject;
pub mod page;
pub mod poll;
pub mod resolve;
pub mod tuning;

#[cfg(test)]
mod fake;

pub use catalog::{Catalog, Role, SelectorList, TargetOverride, TargetSpec};
pub use cdp::CdpPage;
pub use dispatch::{
    ActiveDispatch, Dispatch, DispatchError, DispatchRegistry, Dispatcher, Outcome, TabId,
    TabProvider, Update, UpdateKind, UpdateSender,
};
pub use page::{ElementKind, ElementRef, Node, PageDriver, SyntheticEvent};
pub use poll::{PollEvent, PollPhase, PollState, Poller, Sample};
pub use resolve::{MatchSource, ResolvedElement, SendAffordance};
pub use tuning::Tuning;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result type for mixer-agent operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while talking to a page.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("tab closed: {0}")]
    TabClosed(String),

    #[error("cannot access page: {0}")]
    AccessDenied(String),

    #[error("element {0} is no longer attached")]
    Detached(String),

    #[error("unsupported input element: {0}")]
    Unsupported(String),

    #[error("page script returned malformed data: {0}")]
    Decode(#[from] serde_json::Error),
}

impl Error {
    /// Whether the page can no longer be used at all for this dispatch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::TabClosed(_) | Error::AccessDenied(_))
    }
}

/// One of the chat services this crate knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Gemini,
    ChatGpt,
    Claude,
}

impl Target {
    /// Every target, in the order results are reported.
    pub const ALL: [Target; 3] = [Target::Gemini, Target::ChatGpt, Target::Claude];

    /// Short identifier used in configs and on the command line.
    pub fn id(&self) -> &'static str {
        match self {
            Target::Gemini => "gemini",
            Target::ChatGpt => "chatgpt",
            Target::Claude => "claude",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Gemini => write!(f, "Gemini"),
            Target::ChatGpt => write!(f, "ChatGPT"),
            Target::Claude => write!(f, "Claude"),
        }
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "bard" => Ok(Target::Gemini),
            "chatgpt" | "openai" => Ok(Target::ChatGpt),
            "claude" => Ok(Target::Claude),
            other => Err(format!(
                "unknown target '{}', expected one of: gemini, chatgpt, claude",
                other
            )),
        }
    }
}

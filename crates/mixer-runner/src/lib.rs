//! # mixer-runner
//!
//! Ask several web chat UIs the same question. Define targets, browser and
//! tuning in YAML; answers stream back per target as they settle.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mixer_runner::{Config, Runner};
//!
//! # #[tokio::main]
//! # async fn main() -> mixer_runner::Result<()> {
//! let config = Config::load("mixer.yaml")?;
//! let mut runner = Runner::new(&config.browser).await?;
//! let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
//! let result = runner.ask(&config, "What is a monad?", tx).await?;
//! for (target, outcome) in &result.outcomes {
//!     println!("[{}] {}", target, outcome.response_text());
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod runner;

pub use config::{BrowserConfig, Config, Viewport};
pub use runner::{pick_tab, ChatTab, LiveTabs, RunResult, Runner};

/// Result type for mixer-runner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during config loading or a run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("page error: {0}")]
    Agent(#[from] mixer_agent::Error),

    #[error("no chat tabs found: {0}")]
    NoTabs(String),

    #[error("please enter a question")]
    EmptyQuestion,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixer_agent::{SelectorList, Target};

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
name: "Ask"
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.name, "Ask");
        assert_eq!(config.targets, Target::ALL.to_vec());
        assert!(!config.browser.headless);
        assert_eq!(config.tuning, mixer_agent::Tuning::default());
        assert!(config.catalog.is_empty());
        assert!(config.open_missing);
        assert!(config.browser.connect_port.is_none());
    }

    #[test]
    fn test_parse_browser_config() {
        let yaml = r#"
name: "Ask"
browser:
  headless: true
  proxy: "http://localhost:8080"
  user_agent: "Custom UA"
  viewport:
    width: 1920
    height: 1080
  connect_port: 9222
"#;
        let config = Config::parse(yaml).unwrap();
        assert!(config.browser.headless);
        assert_eq!(
            config.browser.proxy,
            Some("http://localhost:8080".to_string())
        );
        assert_eq!(config.browser.user_agent, Some("Custom UA".to_string()));
        let viewport = config.browser.viewport.unwrap();
        assert_eq!(viewport.width, 1920);
        assert_eq!(viewport.height, 1080);
        assert_eq!(config.browser.connect_port, Some(9222));
    }

    #[test]
    fn test_parse_targets_and_tuning() {
        let yaml = r#"
name: "Ask"
targets: [claude, chatgpt]
open_missing: false
tuning:
  poll_interval_ms: 500
  stable_threshold: 6
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.targets, vec![Target::Claude, Target::ChatGpt]);
        assert!(!config.open_missing);
        assert_eq!(config.tuning.poll_interval_ms, 500);
        assert_eq!(config.tuning.stable_threshold, 6);
        assert_eq!(config.tuning.max_attempts, 60);
    }

    #[test]
    fn test_catalog_override() {
        let yaml = r##"
name: "Ask"
catalog:
  claude:
    input: ["#composer", "textarea"]
    fresh_conversation: false
  gemini:
    generating: []
"##;
        let config = Config::parse(yaml).unwrap();
        let catalog = config.build_catalog();

        let claude = catalog.get(Target::Claude);
        assert_eq!(claude.input, SelectorList::new(["#composer", "textarea"]));
        assert!(!claude.fresh_conversation);
        assert_eq!(claude.url, "https://claude.ai/");

        assert!(catalog.get(Target::Gemini).generating.is_empty());
        assert!(!catalog.get(Target::ChatGpt).response.is_empty());
    }

    #[test]
    fn test_empty_name_fails() {
        let yaml = r#"
name: ""
"#;
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("name is required"));
    }

    #[test]
    fn test_empty_targets_fails() {
        let yaml = r#"
name: "Ask"
targets: []
"#;
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("at least one target"));
    }

    #[test]
    fn test_duplicate_target_fails() {
        let yaml = r#"
name: "Ask"
targets: [claude, gemini, claude]
"#;
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn test_unknown_target_fails() {
        let yaml = r#"
name: "Ask"
targets: [copilot]
"#;
        assert!(matches!(Config::parse(yaml), Err(Error::Yaml(_))));
    }

    #[test]
    fn test_zero_threshold_fails() {
        let yaml = r#"
name: "Ask"
tuning:
  stable_threshold: 0
"#;
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("stable_threshold"));
    }

    #[test]
    fn test_unknown_catalog_field_fails() {
        let yaml = r#"
name: "Ask"
catalog:
  claude:
    inputs: ["textarea"]
"#;
        assert!(Config::parse(yaml).is_err());
    }

    #[test]
    fn test_empty_catalog_list_fails() {
        let yaml = r#"
name: "Ask"
catalog:
  chatgpt:
    input: []
"#;
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("catalog.chatgpt.input"));
    }

    #[test]
    fn test_only_targets() {
        let mut config = Config::parse("name: Ask").unwrap();
        config.only(&[Target::Gemini]).unwrap();
        assert_eq!(config.targets, vec![Target::Gemini]);
        assert!(config.only(&[]).is_ok());
        assert_eq!(config.targets, vec![Target::Gemini]);
    }
}

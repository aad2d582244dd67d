use crate::config::{BrowserConfig, Config};
use crate::{Error, Result};
use async_trait::async_trait;
use eoka::Browser;
use futures_util::future::join_all;
use mixer_agent::{
    CdpPage, Dispatch, DispatchRegistry, Dispatcher, Outcome, PageDriver, TabId, TabProvider,
    Target, TargetSpec, Tuning, UpdateSender,
};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of asking one question.
#[derive(Debug)]
pub struct RunResult {
    /// One outcome per target that had a tab, in config order.
    pub outcomes: Vec<(Target, Outcome)>,
    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl RunResult {
    /// Targets that produced text (complete or partial).
    pub fn answered(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| !o.is_failure()).count()
    }

    pub fn all_failed(&self) -> bool {
        self.answered() == 0
    }
}

/// A tab the runner drives.
pub struct ChatTab {
    pub id: TabId,
    pub page: CdpPage,
}

/// First listed tab for `spec`, ranked by which URL pattern it matches
/// and then by list order.
pub fn pick_tab<'a>(spec: &TargetSpec, listed: &'a [(TabId, String)]) -> Option<&'a TabId> {
    listed
        .iter()
        .filter_map(|(id, url)| spec.url_rank(url).map(|rank| (rank, id)))
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, id)| id)
}

/// Tab liveness backed by the browser's target list.
pub struct LiveTabs<'a> {
    browser: &'a Browser,
}

impl<'a> LiveTabs<'a> {
    pub fn new(browser: &'a Browser) -> Self {
        Self { browser }
    }
}

#[async_trait(?Send)]
impl TabProvider for LiveTabs<'_> {
    async fn is_alive(&self, tab: &TabId) -> mixer_agent::Result<bool> {
        let tabs = self.browser.tabs().await?;
        Ok(tabs.iter().any(|t| t.id == tab.as_str()))
    }
}

/// Owns the browser and the chat tabs, and fans questions out to them.
///
/// Each ask starts from the browser's tab list: matching tabs are attached
/// on first use and kept, closed ones are dropped.
pub struct Runner {
    browser: Browser,
    tabs: Vec<ChatTab>,
    registry: DispatchRegistry,
}

impl Runner {
    /// Launch a browser, or attach to a running one when
    /// `config.connect_port` is set.
    pub async fn new(config: &BrowserConfig) -> Result<Self> {
        if let Some(port) = config.connect_port {
            debug!("Connecting to browser on port {}", port);
            let browser = Browser::connect_port(port).await?;
            return Ok(Self::with_browser(browser));
        }

        let stealth = eoka::StealthConfig {
            headless: config.headless,
            proxy: config.proxy.clone(),
            user_agent: config.user_agent.clone(),
            viewport_width: config.viewport.as_ref().map(|v| v.width).unwrap_or(1280),
            viewport_height: config.viewport.as_ref().map(|v| v.height).unwrap_or(720),
            ..Default::default()
        };

        debug!(
            "Launching browser (headless: {}, proxy: {:?})",
            config.headless, config.proxy
        );
        let browser = Browser::launch_with_config(stealth).await?;
        Ok(Self::with_browser(browser))
    }

    fn with_browser(browser: Browser) -> Self {
        Self {
            browser,
            tabs: Vec::new(),
            registry: DispatchRegistry::new(),
        }
    }

    /// Get a reference to the browser.
    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    pub fn tabs(&self) -> &[ChatTab] {
        &self.tabs
    }

    /// Ask every configured target `question`. Partial and final updates go
    /// to `updates` as they happen.
    pub async fn ask(
        &mut self,
        config: &Config,
        question: &str,
        updates: UpdateSender,
    ) -> Result<RunResult> {
        if question.trim().is_empty() {
            return Err(Error::EmptyQuestion);
        }
        let start = Instant::now();
        let catalog = config.build_catalog();

        let listed = self.refresh_tabs().await?;
        let mut chosen = Vec::new();
        for &target in &config.targets {
            let spec = catalog.get(target);
            let found = match pick_tab(spec, &listed) {
                Some(id) => match self.tab_index(id).await {
                    Ok(i) => Some(i),
                    Err(e) => {
                        warn!("{}: could not attach to tab {}: {}", target, id, e);
                        None
                    }
                },
                None => None,
            };
            if let Some(i) = found {
                debug!("{}: using tab {}", target, self.tabs[i].id);
                chosen.push((target, i));
                continue;
            }
            if !config.open_missing {
                info!("{}: no open tab, skipping", target);
                continue;
            }
            match self.open_tab(target, spec, &config.tuning).await {
                Ok(i) => chosen.push((target, i)),
                Err(e) => warn!("{}: could not open {}: {}", target, spec.url, e),
            }
        }

        if chosen.is_empty() {
            let names: Vec<String> = config.targets.iter().map(|t| t.to_string()).collect();
            return Err(Error::NoTabs(format!(
                "open {} in a tab first",
                names.join(", ")
            )));
        }

        info!("Asking {} target(s)", chosen.len());
        let dispatcher =
            Dispatcher::with_registry(catalog, config.tuning.clone(), self.registry.clone());
        let live = LiveTabs::new(&self.browser);
        let jobs = chosen.iter().map(|&(target, i)| {
            let tab = &self.tabs[i];
            let job = Dispatch::new(target, &tab.id, &tab.page, question);
            dispatcher.dispatch(&live, job, &updates)
        });
        let outcomes = join_all(jobs).await;

        Ok(RunResult {
            outcomes: chosen.iter().map(|&(t, _)| t).zip(outcomes).collect(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// List the browser's tabs as `(id, url)` in browser order, dropping
    /// held tabs that are gone.
    async fn refresh_tabs(&mut self) -> Result<Vec<(TabId, String)>> {
        let open = self.browser.tabs().await?;
        let before = self.tabs.len();
        self.tabs
            .retain(|tab| open.iter().any(|t| t.id == tab.id.as_str()));
        if self.tabs.len() < before {
            debug!("Dropped {} closed tab(s)", before - self.tabs.len());
        }

        Ok(open
            .into_iter()
            .map(|t| (TabId::new(t.id), t.url))
            .collect())
    }

    /// Index of the held tab `id`, attaching to it first if needed.
    async fn tab_index(&mut self, id: &TabId) -> Result<usize> {
        if let Some(i) = self.tabs.iter().position(|t| &t.id == id) {
            return Ok(i);
        }
        debug!("Attaching to tab {}", id);
        let page = self.browser.attach_page(id.as_str()).await?;
        self.tabs.push(ChatTab {
            id: id.clone(),
            page: CdpPage::new(page),
        });
        Ok(self.tabs.len() - 1)
    }

    /// Open the target's canonical URL in a new tab and wait for it to load.
    async fn open_tab(&mut self, target: Target, spec: &TargetSpec, tuning: &Tuning) -> Result<usize> {
        info!("{}: opening {}", target, spec.url);
        let page = CdpPage::new(self.browser.new_page(&spec.url).await?);
        if !page.wait_until_loaded(tuning.open_timeout()).await? {
            warn!("{}: page load timed out, using the tab anyway", target);
        }
        tokio::time::sleep(tuning.open_settle()).await;

        let id = page.tab_id();
        self.tabs.push(ChatTab { id, page });
        Ok(self.tabs.len() - 1)
    }

    /// Close the browser.
    pub async fn close(self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixer_agent::{Catalog, DispatchError};

    fn listed(tabs: &[(&str, &str)]) -> Vec<(TabId, String)> {
        tabs.iter()
            .map(|(id, url)| (TabId::new(*id), url.to_string()))
            .collect()
    }

    #[test]
    fn pick_tab_prefers_earlier_pattern() {
        let catalog = Catalog::builtin();
        let tabs = listed(&[
            ("a", "https://claude.ai/chat/1"),
            ("b", "https://chatgpt.com/"),
            ("c", "https://chat.openai.com/c/9"),
            ("d", "https://chat.openai.com/"),
        ]);
        let spec = catalog.get(Target::ChatGpt);
        assert_eq!(pick_tab(spec, &tabs), Some(&TabId::new("c")));
        assert_eq!(
            pick_tab(catalog.get(Target::Claude), &tabs),
            Some(&TabId::new("a"))
        );
        assert_eq!(pick_tab(catalog.get(Target::Gemini), &tabs), None);
    }

    #[test]
    fn pick_tab_falls_back_to_later_pattern() {
        let catalog = Catalog::builtin();
        let tabs = listed(&[("x", "about:blank"), ("y", "https://bard.google.com/")]);
        assert_eq!(
            pick_tab(catalog.get(Target::Gemini), &tabs),
            Some(&TabId::new("y"))
        );
    }

    #[test]
    fn all_failed_counts_partials_as_answers() {
        let failed = Outcome::Failure(DispatchError::Timeout {
            target: Target::Gemini,
        });
        let result = RunResult {
            outcomes: vec![
                (Target::Gemini, failed.clone()),
                (Target::Claude, Outcome::PartialOnTimeout("half".into())),
            ],
            duration_ms: 0,
        };
        assert_eq!(result.answered(), 1);
        assert!(!result.all_failed());

        let result = RunResult {
            outcomes: vec![(Target::Gemini, failed)],
            duration_ms: 0,
        };
        assert!(result.all_failed());
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::config::{RuleConfig, RuleFileConfig};
use crate::error::EmissaryResult;

/// Callback invoked with a full replacement batch of rule configurations
pub type RuleChangeCallback = Arc<dyn Fn(Vec<RuleConfig>) + Send + Sync>;

/// Supplier of rule configuration batches.
///
/// `current_rules` provides the initial snapshot; sources that can detect
/// changes push full replacement batches through the subscribed callback.
pub trait RuleSource: Send + Sync {
    fn current_rules(&self) -> EmissaryResult<Vec<RuleConfig>>;

    /// Register the reload callback. Sources without change detection keep
    /// the initial snapshot and may ignore this.
    fn subscribe(&mut self, callback: RuleChangeCallback) -> EmissaryResult<()>;
}

/// Fixed rule list, mostly for tests and embedded configuration
pub struct StaticRuleSource {
    rules: Vec<RuleConfig>,
}

impl StaticRuleSource {
    pub fn new(rules: Vec<RuleConfig>) -> Self {
        Self { rules }
    }
}

impl RuleSource for StaticRuleSource {
    fn current_rules(&self) -> EmissaryResult<Vec<RuleConfig>> {
        Ok(self.rules.clone())
    }

    fn subscribe(&mut self, _callback: RuleChangeCallback) -> EmissaryResult<()> {
        Ok(())
    }
}

/// TOML rule file with hot reload via filesystem watching.
///
/// A parse failure on reload keeps the current snapshot; the watcher stays
/// alive for as long as this source does.
pub struct FileRuleSource {
    path: PathBuf,
    _watcher: Option<RecommendedWatcher>,
}

impl FileRuleSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            _watcher: None,
        }
    }

    fn load(path: &Path) -> EmissaryResult<Vec<RuleConfig>> {
        let text = std::fs::read_to_string(path)?;
        let config: RuleFileConfig = toml::from_str(&text)?;
        Ok(config.rules)
    }
}

impl RuleSource for FileRuleSource {
    fn current_rules(&self) -> EmissaryResult<Vec<RuleConfig>> {
        Self::load(&self.path)
    }

    fn subscribe(&mut self, callback: RuleChangeCallback) -> EmissaryResult<()> {
        let (tx, mut rx) = mpsc::channel(100);

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if let Err(e) = tx.blocking_send(event) {
                        error!("Failed to send rule file change event: {}", e);
                    }
                }
                Err(e) => error!("Rule file watch error: {}", e),
            },
            NotifyConfig::default().with_poll_interval(Duration::from_secs(1)),
        )?;

        // Watch the file and its directory to survive rename-based writes
        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        if let Some(parent) = self.path.parent() {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }

        info!("Started watching rule file: {:?}", self.path);

        let path = self.path.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                use notify::EventKind;

                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    continue;
                }

                let file_changed = event
                    .paths
                    .iter()
                    .any(|p| p == &path || (p.is_dir() && path.starts_with(p)));
                if !file_changed {
                    continue;
                }

                debug!("Rule file change detected: {:?}", event);

                // Allow the file write to settle
                tokio::time::sleep(Duration::from_millis(100)).await;

                match Self::load(&path) {
                    Ok(rules) => {
                        info!(count = rules.len(), "Rule file reloaded");
                        (callback)(rules);
                    }
                    Err(e) => {
                        warn!("Failed to reload rule file (keeping current rules): {}", e);
                    }
                }
            }
        });

        self._watcher = Some(watcher);
        Ok(())
    }
}

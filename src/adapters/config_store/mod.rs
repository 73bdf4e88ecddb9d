//! File-backed `ConfigStore` — each `*.json` file under `config_store.path`
//! holds one [`ListenerConfig`].
//! The manager polls this at `manager.reload_interval_s`; this
//! adapter itself just reads and parses the directory on every call.

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use tokio::fs;
use tracing::warn;

use crate::domain::ListenerConfig;
use crate::ports::config_store::ConfigStore;

pub struct FileConfigStore {
    dir: PathBuf,
}

impl FileConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load_active_configs(&self) -> anyhow::Result<Vec<ListenerConfig>> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating config store directory {}", self.dir.display()))?;

        let mut configs = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let content = fs::read_to_string(&path).await?;
            match serde_json::from_str::<ListenerConfig>(&content) {
                Ok(config) if config.is_active => configs.push(config),
                Ok(_) => {}
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping unparseable listener config");
                }
            }
        }
        Ok(configs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Filters, Platform};
    use uuid::Uuid;

    fn write_config(dir: &std::path::Path, name: &str, is_active: bool) {
        let config = ListenerConfig {
            id: Uuid::new_v4(),
            name: name.to_string(),
            platform: Platform::Polymarket,
            description: None,
            filters: Filters::Polymarket {
                series_ids: vec![],
                tag_ids: vec![],
                slug_patterns: vec![],
                condition_ids: vec![],
                min_liquidity: None,
                min_volume: None,
            },
            discovery_interval_s: 60,
            emit_interval_ms: 100,
            enable_forward_fill: true,
            is_active,
        };
        std::fs::write(
            dir.join(format!("{name}.json")),
            serde_json::to_string(&config).unwrap(),
        )
            .unwrap();
    }

    #[tokio::test]
    async fn loads_only_active_configs() {
        let dir = std::env::temp_dir().join(format!("lob-listener-cfg-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        write_config(&dir, "active-one", true);
        write_config(&dir, "inactive-one", false);

        let store = FileConfigStore::new(&dir);
        let configs = store.load_active_configs().await.unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].name, "active-one");

        std::fs::remove_dir_all(&dir).ok();
    }
}

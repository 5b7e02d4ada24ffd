use serde::Deserialize;
use std::path::Path;

use filechooser_common::{IconSet, NameFilter};

use crate::backend::SourceConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct ChooserConfig {
    pub source: SourceConfig,
    #[serde(default)]
    pub start_path: Option<String>,
    #[serde(default)]
    pub filter: Vec<String>,
    #[serde(default)]
    pub icons: bool,
    #[serde(default)]
    pub bucket_icon: Option<String>,
    #[serde(default)]
    pub dir_icon: Option<String>,
    #[serde(default)]
    pub file_icon: Option<String>,
    #[serde(default)]
    pub show_only_dirs: bool,
}

impl ChooserConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        Self::parse(&content)
            .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path.display(), e))
    }

    /// Parse, fill credentials from the environment, and validate.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let mut config: ChooserConfig = toml::from_str(content)?;
        config.source = config.source.resolve()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        match &self.source {
            SourceConfig::S3(c) => {
                if c.access_key_id.is_empty() || c.secret_access_key.is_empty() {
                    anyhow::bail!(
                        "s3 source needs access_key_id and secret_access_key (or AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY)"
                    );
                }
                if c.region.is_empty() {
                    anyhow::bail!("region must not be empty");
                }
            }
            SourceConfig::Azure(c) => {
                if c.account_name.is_empty() || c.account_key.is_empty() {
                    anyhow::bail!(
                        "azure source needs account_name and account_key, or a connection string"
                    );
                }
            }
        }
        if let Some(p) = &self.start_path {
            if !p.starts_with('/') {
                anyhow::bail!("start_path must be absolute: {}", p);
            }
        }
        self.name_filter()?;
        Ok(())
    }

    /// Icon set for listings when `icons` is on. Unset icons use the defaults.
    pub fn icon_set(&self) -> Option<IconSet> {
        self.icons.then(|| {
            IconSet::with_fallbacks(
                self.bucket_icon.as_deref(),
                self.dir_icon.as_deref(),
                self.file_icon.as_deref(),
            )
        })
    }

    /// Compiled leaf filter; `None` when no patterns are configured.
    pub fn name_filter(&self) -> anyhow::Result<Option<NameFilter>> {
        if self.filter.is_empty() {
            return Ok(None);
        }
        let filter = NameFilter::new(&self.filter)
            .map_err(|e| anyhow::anyhow!("invalid filter pattern: {}", e))?;
        Ok(Some(filter))
    }
}

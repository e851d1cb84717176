use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::mailer_error::ConfigSnafu;
use crate::error::Result;

/// User-level defaults stored at ~/.git-commit-mailer.toml. Everything here
/// can be overridden on the command line.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub error_to: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_html: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_push_mail: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_diff_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_browser: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gitlab_project_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sendmail_path: Option<String>,
}

impl UserConfig {
    pub fn path() -> Option<PathBuf> {
        std::env::var("HOME")
            .ok()
            .map(PathBuf::from)
            .filter(|p| p.is_absolute())
            .map(|home| home.join(".git-commit-mailer.toml"))
    }

    /// Load the user config file. Returns Ok(None) when it does not exist.
    pub fn load() -> Result<Option<Self>> {
        let Some(path) = Self::path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            ConfigSnafu {
                message: format!("cannot read {}: {e}", path.display()),
            }
            .build()
        })?;
        let config: UserConfig = toml::from_str(&contents).map_err(|e| {
            ConfigSnafu {
                message: format!("cannot parse {}: {e}", path.display()),
            }
            .build()
        })?;
        Ok(Some(config))
    }
}

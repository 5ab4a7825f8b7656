use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use wardsim_engine::settings::EngineSettings;

/// Current config version. Bump this when adding fields or changing shape.
/// Each bump requires a corresponding entry in [`migrate`].
const CURRENT_VERSION: u32 = 2;

const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-5-sonnet-20240620-v1:0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WardsimConfig {
    /// Schema version. Missing or 0 = pre-versioned config.
    #[serde(default)]
    pub config_version: u32,
    pub region: String,
    pub bucket: String,
    pub model_id: String,
    pub credentials: CredentialSource,
    pub user_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_country: Option<String>,
    /// Where in-progress cases are mirrored. Defaults to the platform cache
    /// directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialSource {
    Inline {
        access_key_id: String,
        secret_access_key: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        session_token: Option<String>,
    },
    Profile {
        profile_name: String,
    },
    DefaultChain,
}

/// Redacted config summary, safe to print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigInfo {
    pub region: String,
    pub bucket: String,
    pub model_id: String,
    pub user_email: String,
    pub credential_type: String,
    pub profile_name: Option<String>,
    pub access_key_hint: Option<String>,
    pub cache_dir: String,
}

impl WardsimConfig {
    pub fn new(
        region: impl Into<String>,
        bucket: impl Into<String>,
        user_email: impl Into<String>,
        credentials: CredentialSource,
    ) -> Self {
        Self {
            config_version: CURRENT_VERSION,
            region: region.into(),
            bucket: bucket.into(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            credentials,
            user_email: user_email.into(),
            user_country: None,
            cache_dir: None,
            engine: EngineSettings::default(),
        }
    }

    /// Apply `WARDSIM_BUCKET`, `WARDSIM_MODEL_ID`, `AWS_REGION` and
    /// `WARDSIM_USER_EMAIL` from `lookup`. Blank values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bucket) = get("WARDSIM_BUCKET") {
            self.bucket = bucket;
        }
        if let Some(model_id) = get("WARDSIM_MODEL_ID") {
            self.model_id = model_id;
        }
        if let Some(region) = get("AWS_REGION") {
            self.region = region;
        }
        if let Some(email) = get("WARDSIM_USER_EMAIL") {
            self.user_email = email;
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn resolved_cache_dir(&self) -> eyre::Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        let base = dirs::cache_dir().ok_or_else(|| eyre::eyre!("no cache directory found"))?;
        Ok(base.join("wardsim").join("cases"))
    }

    pub fn validate(&self) -> eyre::Result<()> {
        let required = [
            ("region", &self.region),
            ("bucket", &self.bucket),
            ("model_id", &self.model_id),
            ("user_email", &self.user_email),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(eyre::eyre!("config is missing: {}", missing.join(", ")));
        }
        Ok(())
    }
}

fn config_dir() -> eyre::Result<PathBuf> {
    let base = dirs::config_dir().ok_or_else(|| eyre::eyre!("no config directory found"))?;
    Ok(base.join("wardsim"))
}

pub fn config_path() -> eyre::Result<PathBuf> {
    Ok(config_dir()?.join("config.json"))
}

pub fn load_config() -> eyre::Result<WardsimConfig> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> eyre::Result<WardsimConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("failed to read config at {}: {e}", path.display()))?;

    // Parse as raw JSON so we can run migrations before deserializing.
    let json: serde_json::Value = serde_json::from_str(&contents)?;
    let on_disk_version = json
        .get("config_version")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;

    let migrated = migrate(json, on_disk_version)?;
    let config: WardsimConfig = serde_json::from_value(migrated)?;
    Ok(config)
}

/// Run sequential migrations from `from_version` up to [`CURRENT_VERSION`].
///
/// Each migration is a pure transform on the raw JSON value.
fn migrate(mut json: serde_json::Value, from_version: u32) -> eyre::Result<serde_json::Value> {
    if from_version > CURRENT_VERSION {
        return Err(eyre::eyre!(
            "config_version {from_version} is newer than this build supports ({CURRENT_VERSION}). \
             Please update wardsim."
        ));
    }
    let obj = json
        .as_object_mut()
        .ok_or_else(|| eyre::eyre!("config is not a JSON object"))?;

    // v0 -> v1: credentials became explicit; old configs used the default chain.
    if from_version < 1 {
        obj.entry("credentials")
            .or_insert(serde_json::json!({ "type": "default_chain" }));
        obj.insert("config_version".to_string(), 1.into());
        tracing::info!("migrated config v0 -> v1 (added credentials)");
    }

    // v1 -> v2: top-level retry knobs moved into the `engine` section.
    if from_version < 2 {
        let mut engine = match obj.remove("engine") {
            Some(serde_json::Value::Object(engine)) => engine,
            _ => serde_json::Map::new(),
        };
        for key in ["max_retries", "retry_base_delay_ms"] {
            if let Some(value) = obj.remove(key) {
                engine.entry(key).or_insert(value);
            }
        }
        obj.insert("engine".to_string(), serde_json::Value::Object(engine));
        obj.insert("config_version".to_string(), 2.into());
        tracing::info!("migrated config v1 -> v2 (engine section)");
    }

    Ok(json)
}

pub fn save_config(config: &WardsimConfig) -> eyre::Result<()> {
    save_config_to(&config_path()?, config)
}

pub fn save_config_to(path: &Path, config: &WardsimConfig) -> eyre::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| eyre::eyre!("config path {} has no parent", path.display()))?;
    std::fs::create_dir_all(dir)?;

    // Always write the current version, regardless of what was loaded.
    let mut stamped = config.clone();
    stamped.config_version = CURRENT_VERSION;
    let json = serde_json::to_string_pretty(&stamped)?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json.as_bytes())?;

    // Set restrictive permissions on Unix before renaming
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp_path, path)?;

    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

pub fn config_info(config: &WardsimConfig) -> ConfigInfo {
    let (credential_type, profile_name, access_key_hint) = match &config.credentials {
        CredentialSource::Inline {
            access_key_id,
            session_token,
            ..
        } => {
            let cred_type = if session_token.is_some() {
                "temporary"
            } else {
                "inline"
            };
            (cred_type.to_string(), None, Some(redact_access_key(access_key_id)))
        }
        CredentialSource::Profile { profile_name } => {
            ("profile".to_string(), Some(profile_name.clone()), None)
        }
        CredentialSource::DefaultChain => ("default_chain".to_string(), None, None),
    };

    ConfigInfo {
        region: config.region.clone(),
        bucket: config.bucket.clone(),
        model_id: config.model_id.clone(),
        user_email: config.user_email.clone(),
        credential_type,
        profile_name,
        access_key_hint,
        cache_dir: config
            .resolved_cache_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
    }
}

fn redact_access_key(key: &str) -> String {
    if key.len() <= 8 || !key.is_ascii() {
        return "****".to_string();
    }
    let prefix = &key[..4];
    let suffix = &key[key.len() - 4..];
    format!("{prefix}...{suffix}")
}

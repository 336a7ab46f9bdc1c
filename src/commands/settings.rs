use crate::config::{RagConfig, SETTING_KEYS};
use crate::db::Database;
use crate::error::{RagError, Result};
use std::collections::BTreeMap;

/// Persisted settings, keyed by name. Keys never set are absent.
pub fn get_settings(db: &Database) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for key in SETTING_KEYS {
        if let Some(value) = db.get_setting(key)? {
            map.insert(key.to_string(), value);
        }
    }
    Ok(map)
}

/// Persist one setting. The value must leave the resulting configuration valid.
pub fn set_setting(db: &Database, key: &str, value: &str) -> Result<()> {
    let mut config = RagConfig::from_settings(db)?;
    config.apply(key, value)?;
    config.validate()?;
    db.set_setting(key, value.trim())?;
    log::info!("Setting {} = {}", key, value.trim());
    Ok(())
}

/// Remove a persisted setting so the default applies again
pub fn delete_setting(db: &Database, key: &str) -> Result<()> {
    if !SETTING_KEYS.contains(&key) {
        return Err(RagError::data(format!("Unknown setting key: {}", key)));
    }
    db.delete_setting(key)?;
    Ok(())
}

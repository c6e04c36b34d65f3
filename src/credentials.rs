//! Geocoder credentials.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable naming the credentials file.
pub const CREDENTIALS_ENV: &str = "POSTAL_LABELS_CREDENTIALS";

/// JSON key holding the geocoder API key.
pub const API_KEY_FIELD: &str = "google_maps_api_key";

/// Value written into a fresh credentials file.
pub const PLACEHOLDER_KEY: &str = "INSERT_MAPS_API_KEY";

/// Get the default credentials file.
pub fn default_credentials_path() -> PathBuf {
    if let Ok(env_path) = std::env::var(CREDENTIALS_ENV) {
        let path = PathBuf::from(env_path);
        if path.is_file() {
            return path;
        }
    }

    let local = PathBuf::from("input").join("credentials.json");
    if local.exists() {
        return local;
    }

    // per-user file, only when the operator has put one there
    if let Some(config_dir) = dirs::config_dir() {
        let user = config_dir.join("postal-labels").join("credentials.json");
        if user.is_file() {
            return user;
        }
    }

    local
}

/// Read the API key from the credentials file at `path`.
///
/// A missing file is replaced by a template holding [`PLACEHOLDER_KEY`],
/// and the operator is asked to fill it in.
///
/// # Errors
///
/// Every problem with the file is reported as [`Error::InvalidApiKey`].
pub fn load_api_key(path: &Path) -> Result<String> {
    if !path.exists() {
        write_template(path)?;
        return Err(Error::invalid_api_key(format!(
            "No API key given ({})",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path)?;
    parse_api_key(&contents)
}

fn write_template(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(
        path,
        format!("{{\n\t\"{API_KEY_FIELD}\": \"{PLACEHOLDER_KEY}\"\n}}"),
    )?;
    Ok(())
}

/// Extract the API key from the contents of a credentials file.
pub fn parse_api_key(contents: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(contents)
        .map_err(|_| Error::invalid_api_key("No (valid) JSON object in credentials.json"))?;

    let object = value
        .as_object()
        .ok_or_else(|| Error::invalid_api_key("No JSON object in credentials.json"))?;

    let key = object.get(API_KEY_FIELD).ok_or_else(|| {
        Error::invalid_api_key(format!("Missing key '{API_KEY_FIELD}' in credentials.json"))
    })?;

    let key = key.as_str().ok_or_else(|| {
        Error::invalid_api_key(format!(
            "Json value for key '{API_KEY_FIELD}' is not a string"
        ))
    })?;

    if key == PLACEHOLDER_KEY {
        return Err(Error::invalid_api_key(
            "Please update the API key in credentials.json",
        ));
    }

    Ok(key.to_string())
}

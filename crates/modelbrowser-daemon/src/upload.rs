use std::path::{Path, PathBuf};

use modelbrowser_proto::catalog::items_dir;
use modelbrowser_proto::protocol::ErrorReason;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid model name: {0}")]
    InvalidName(String),
    #[error("model is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("model {0} already exists")]
    AlreadyExists(String),
    #[error("failed to write model: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    pub fn reason(&self) -> ErrorReason {
        match self {
            UploadError::InvalidName(_) => ErrorReason::InvalidName,
            UploadError::TooLarge { .. } => ErrorReason::TooLarge,
            UploadError::InvalidJson(_) => ErrorReason::InvalidJson,
            UploadError::AlreadyExists(_) => ErrorReason::AlreadyExists,
            // closest reason on the wire for a write that failed
            UploadError::Io(_) => ErrorReason::ModelNotFound,
        }
    }
}

/// Outcome of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uploaded {
    pub id: String,
    pub path: PathBuf,
    /// `false` when an existing file was overwritten.
    pub created: bool,
}

/// Strip an optional `<namespace>:` prefix and check the remaining name.
pub fn validate_name<'a>(id: &'a str, namespace: &str) -> Result<&'a str, UploadError> {
    let name = match id.split_once(':') {
        Some((ns, rest)) if ns == namespace => rest,
        Some(_) => return Err(UploadError::InvalidName(id.to_string())),
        None => id,
    };
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'_' | b'.' | b'-'));
    if valid {
        Ok(name)
    } else {
        Err(UploadError::InvalidName(id.to_string()))
    }
}

/// Validate an uploaded definition and write it into the items directory.
/// The catalog sees it after the next reload.
pub fn write_model(
    root: &Path,
    namespace: &str,
    id: &str,
    json: &str,
    overwrite: bool,
    max_bytes: usize,
) -> Result<Uploaded, UploadError> {
    let name = validate_name(id, namespace)?;
    if json.len() > max_bytes {
        return Err(UploadError::TooLarge {
            size: json.len(),
            limit: max_bytes,
        });
    }
    let value: serde_json::Value = serde_json::from_str(json)?;

    let dir = items_dir(root, namespace);
    let path = dir.join(format!("{}.json", name));
    let exists = path.exists();
    if exists && !overwrite {
        return Err(UploadError::AlreadyExists(format!("{}:{}", namespace, name)));
    }

    std::fs::create_dir_all(&dir)?;
    std::fs::write(&path, serde_json::to_string_pretty(&value)?)?;
    info!("Saved uploaded model to {:?}", path);

    Ok(Uploaded {
        id: format!("{}:{}", namespace, name),
        path,
        created: !exists,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_validation() {
        assert_eq!(validate_name("coin", "minecraft").unwrap(), "coin");
        assert_eq!(validate_name("minecraft:gold.coin-2", "minecraft").unwrap(), "gold.coin-2");
        assert_eq!(validate_name("Coin", "minecraft").unwrap_err().reason(), ErrorReason::InvalidName);
        assert!(validate_name("other:coin", "minecraft").is_err());
        assert!(validate_name("../escape", "minecraft").is_err());
        assert!(validate_name("..", "minecraft").is_err());
        assert!(validate_name("", "minecraft").is_err());
    }

    #[test]
    fn test_write_and_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let uploaded = write_model(tmp.path(), "minecraft", "coin", r#"{"model":{}}"#, false, 1024).unwrap();
        assert!(uploaded.created);
        assert_eq!(uploaded.id, "minecraft:coin");
        assert!(tmp.path().join("assets/minecraft/items/coin.json").is_file());

        let err = write_model(tmp.path(), "minecraft", "coin", "{}", false, 1024).unwrap_err();
        assert_eq!(err.reason(), ErrorReason::AlreadyExists);

        let again = write_model(tmp.path(), "minecraft", "coin", "{}", true, 1024).unwrap();
        assert!(!again.created);
    }

    #[test]
    fn test_rejects_bad_json_and_size() {
        let tmp = tempfile::tempdir().unwrap();
        let err = write_model(tmp.path(), "minecraft", "coin", "{ nope", false, 1024).unwrap_err();
        assert_eq!(err.reason(), ErrorReason::InvalidJson);

        let big = format!(r#"{{"pad":"{}"}}"#, "x".repeat(64));
        let err = write_model(tmp.path(), "minecraft", "coin", &big, false, 16).unwrap_err();
        assert_eq!(err.reason(), ErrorReason::TooLarge);
        assert!(!tmp.path().join("assets/minecraft/items/coin.json").exists());
    }
}

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

use crate::credential::Auth;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("credential store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential file {file} is not valid JSON")]
    Corrupt { file: String },
}

/// One credential per JSON file under the auth directory.
///
/// File names are `{provider}-{label}.json` and equal the credential id.
/// The top-level `type` field discriminates the provider on read.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        if self.dir.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.dir, std::fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }

    /// Enumerate credentials. Undecodable files are kept on disk and skipped
    /// with a warning; files with an unknown `type` are skipped likewise.
    pub fn list(&self, known_providers: &[&str]) -> Result<Vec<Auth>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            match self.load_file(&path, &file_name, known_providers) {
                Ok(Some(auth)) => out.push(auth),
                Ok(None) => {}
                Err(err) => warn!(file = %file_name, error = %err, "skipping credential file"),
            }
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    fn load_file(
        &self,
        path: &Path,
        file_name: &str,
        known_providers: &[&str],
    ) -> Result<Option<Auth>, StoreError> {
        let raw = std::fs::read(path)?;
        let value: Value = serde_json::from_slice(&raw).map_err(|_| StoreError::Corrupt {
            file: file_name.to_string(),
        })?;

        // `type` is case-sensitive on purpose.
        let provider = value.get("type").and_then(Value::as_str).unwrap_or("");
        if !known_providers.contains(&provider) {
            warn!(file = %file_name, r#type = %provider, "unknown credential type");
            return Ok(None);
        }

        // Files written by this process parse directly; foreign token files
        // (flat `{type, access_token, ...}` objects) fold into metadata.
        let mut auth: Auth = serde_json::from_value(value.clone()).unwrap_or_else(|_| {
            let mut fallback = Auth::new(provider, "");
            if let Some(map) = value.as_object() {
                for (key, field) in map {
                    if key == "type" {
                        continue;
                    }
                    fallback.metadata.insert(key.clone(), field.clone());
                }
            }
            fallback
        });
        auth.provider = provider.to_string();
        auth.id = file_name.to_string();
        if auth.label.is_empty() {
            auth.label = value
                .get("label")
                .or_else(|| value.get("username"))
                .or_else(|| value.get("user_info"))
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
        }
        if auth.storage.is_none() {
            auth.storage = Some(value);
        }
        Ok(Some(auth))
    }

    /// Atomic write: serialize to a temp file in the same directory, chmod,
    /// then rename over the target.
    pub fn save(&self, auth: &Auth) -> Result<PathBuf, StoreError> {
        self.ensure_dir()?;
        let target = self.dir.join(&auth.id);
        let tmp = self.dir.join(format!(".{}.tmp", auth.id));

        let mut value = serde_json::to_value(auth).unwrap_or(Value::Null);
        if let Some(map) = value.as_object_mut() {
            map.insert("type".to_string(), Value::String(auth.provider.clone()));
        }
        let mut body = serde_json::to_vec_pretty(&value).unwrap_or_default();
        body.push(b'\n');

        std::fs::write(&tmp, body)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp, &target)?;
        Ok(target)
    }
}

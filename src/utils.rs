use std::path::Path;

use anyhow::{Context, Result, bail};
use log::debug;
use tokio::fs;

/// Makes sure `path` is a directory the bridge can keep its files in.
/// Returns `true` when it had to be created.
pub async fn ensure_directory_exists(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    match fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => return Ok(false),
        Ok(_) => bail!("{} exists but is not a directory", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("cannot inspect {}", path.display())),
    }

    fs::create_dir_all(path)
        .await
        .with_context(|| format!("cannot create directory {}", path.display()))?;
    debug!("Created directory {}", path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_once_and_rejects_files() {
        let root = std::env::temp_dir().join(format!("taika-utils-{}", std::process::id()));
        let nested = root.join("storage").join("tables");

        assert!(ensure_directory_exists(&nested).await.unwrap());
        assert!(!ensure_directory_exists(&nested).await.unwrap());

        let file = root.join("ring_bridge_config.json");
        fs::write(&file, "{}").await.unwrap();
        let err = ensure_directory_exists(&file).await.unwrap_err();
        assert!(err.to_string().contains("not a directory"));

        let _ = std::fs::remove_dir_all(&root);
    }
}

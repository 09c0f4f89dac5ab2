//! Avatar model assets.
//!
//! Models ship as password-protected zip archives on the server, one per
//! avatar, each containing a `.glb`. The first use of an avatar downloads
//! and extracts its archive into the data dir; later sessions reuse the
//! extracted model. The archive itself is removed as soon as extraction
//! is attempted, whether or not it succeeded.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info};

use crate::config::{paths, Settings, UserSession};

/// Archive password scheme: avatar name with the first letter upper-cased,
/// followed by a fixed suffix.
fn archive_password(avatar_name: &str) -> String {
    let mut chars = avatar_name.chars();
    match chars.next() {
        Some(first) => format!("{}{}2024!", first.to_uppercase(), chars.as_str()),
        None => "2024!".to_string(),
    }
}

fn avatars_dir() -> PathBuf {
    paths::get_data_dir().join("avatars")
}

/// Resolve the local `.glb` path for `avatar_name`, downloading and
/// extracting the model archive on first use.
pub async fn ensure_avatar_model(
    settings: &Settings,
    session: &UserSession,
    avatar_name: &str,
) -> anyhow::Result<PathBuf> {
    let dir = avatars_dir();
    let model_path = dir.join(format!("{avatar_name}.glb"));
    if model_path.exists() {
        debug!(path = %model_path.display(), "Avatar model already cached");
        return Ok(model_path);
    }

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let url = format!(
        "{}/assets/avatars/{}.zip",
        settings.server_url.trim_end_matches('/'),
        avatar_name
    );
    info!(%url, "Downloading avatar model");

    let client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(settings.api_timeout))
        .build()?;
    let resp = client
        .get(&url)
        .bearer_auth(&session.token)
        .send()
        .await?
        .error_for_status()
        .context("Avatar model download failed")?;
    let bytes = resp.bytes().await?;

    // The archive is transient; park it in the cache dir, not next to
    // the extracted model.
    let cache_dir = paths::get_cache_dir();
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("Failed to create {}", cache_dir.display()))?;
    let archive_path = cache_dir.join(format!("{avatar_name}.zip"));
    std::fs::write(&archive_path, &bytes)
        .with_context(|| format!("Failed to write {}", archive_path.display()))?;

    // The archive must not linger on disk, even when extraction fails.
    let result = extract_archive(&archive_path, &dir, &archive_password(avatar_name));
    let _ = std::fs::remove_file(&archive_path);
    result?;

    if !model_path.exists() {
        anyhow::bail!(
            "Avatar archive for '{avatar_name}' did not contain {}",
            model_path.display()
        );
    }
    info!(path = %model_path.display(), "Avatar model ready");
    Ok(model_path)
}

/// Extract every entry of a password-protected zip into `dest`.
fn extract_archive(archive_path: &Path, dest: &Path, password: &str) -> anyhow::Result<()> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index_decrypt(i, password.as_bytes())
            .context("Failed to decrypt archive entry")?;
        let Some(rel) = entry.enclosed_name() else {
            // Entry path escapes the destination; skip it.
            continue;
        };
        let out_path = dest.join(rel);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        std::io::copy(&mut entry, &mut out)?;
        debug!(entry = %out_path.display(), "Extracted");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_archive_password_capitalizes_name() {
        assert_eq!(archive_password("luna"), "Luna2024!");
        assert_eq!(archive_password("Atlas"), "Atlas2024!");
        assert_eq!(archive_password(""), "2024!");
    }

    #[test]
    fn test_extract_archive_writes_entries() {
        let dir = std::env::temp_dir().join(format!("avatar-assets-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let archive_path = dir.join("test.zip");
        {
            let file = std::fs::File::create(&archive_path).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("test.glb", options).unwrap();
            writer.write_all(b"glTF").unwrap();
            writer.finish().unwrap();
        }

        // Unencrypted entries ignore the password.
        extract_archive(&archive_path, &dir, "Test2024!").unwrap();
        assert_eq!(std::fs::read(dir.join("test.glb")).unwrap(), b"glTF");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}

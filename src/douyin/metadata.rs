//! 作品元数据
//!
//! 每个作品写入 `metadata/<id>.json`, 文件已存在时跳过.
//! 先写入 `<id>.json.part` 再重命名, 失败时不会留下不完整的 json

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use log::warn;
use tokio::io::AsyncWriteExt;

use crate::{douyin::model::Aweme, error::Error};

pub const METADATA_DIR: &str = "metadata";
const DESC_MAX_CHARS: usize = 40;

#[derive(Debug, Serialize)]
struct MetadataSnapshot<'a> {
    desc: String,
    statistics: &'a Value,
    author: &'a Value,
    music: &'a Value,
    aweme_type: Option<i64>,
}

pub fn metadata_path(save_dir: &Path, aweme_id: &str) -> PathBuf {
    save_dir.join(METADATA_DIR).join(format!("{aweme_id}.json"))
}

/// 写入元数据, 返回是否实际写入
pub async fn write_metadata(save_dir: &Path, aweme: &Aweme) -> Result<bool, Error> {
    let path = metadata_path(save_dir, &aweme.aweme_id);
    if tokio::fs::try_exists(&path).await? {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let snapshot = MetadataSnapshot {
        desc: aweme
            .desc()
            .chars()
            .take(DESC_MAX_CHARS)
            .collect::<String>()
            .trim()
            .to_string(),
        statistics: &aweme.statistics,
        author: &aweme.author,
        music: &aweme.music,
        aweme_type: aweme.aweme_type,
    };
    let content = serde_json::to_string_pretty(&snapshot)?;

    let part = part_path(&path);
    if let Err(e) = write_part(&part, content.as_bytes()).await {
        if let Err(e) = tokio::fs::remove_file(&part).await {
            warn!("remove partial metadata failed, {}, {e}", part.display());
        }
        return Err(e);
    }
    tokio::fs::rename(&part, &path).await?;

    Ok(true)
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn write_part(part: &Path, content: &[u8]) -> Result<(), Error> {
    let mut file = tokio::fs::File::create(part).await?;
    file.write_all(content).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_write_metadata_once() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let aweme: Aweme = serde_json::from_value(json!({
            "aweme_id": "42", "aweme_type": 0, "desc": "第一条视频",
            "statistics": {"digg_count": 10}, "author": {"nickname": "someone"}
        }))?;

        assert!(write_metadata(dir.path(), &aweme).await?);
        let path = metadata_path(dir.path(), "42");
        let content = std::fs::read_to_string(&path)?;
        assert!(content.contains("第一条视频"));

        let value: Value = serde_json::from_str(&content)?;
        assert_eq!(value["statistics"]["digg_count"], 10);
        assert_eq!(value["aweme_type"], 0);
        assert!(value["music"].is_null());

        // 已存在时不覆盖
        std::fs::write(&path, "kept")?;
        assert!(!write_metadata(dir.path(), &aweme).await?);
        assert_eq!(std::fs::read_to_string(&path)?, "kept");
        Ok(())
    }

    #[tokio::test]
    async fn test_desc_is_truncated_then_trimmed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let desc = format!("{}   tail", "a".repeat(38));
        let aweme: Aweme = serde_json::from_value(json!({"aweme_id": "7", "desc": desc}))?;

        assert!(write_metadata(dir.path(), &aweme).await?);
        let value: Value =
            serde_json::from_str(&std::fs::read_to_string(metadata_path(dir.path(), "7"))?)?;
        assert_eq!(value["desc"], "a".repeat(38));
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_part_file_does_not_block() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let aweme: Aweme = serde_json::from_value(json!({"aweme_id": "9", "desc": "ok"}))?;
        let path = metadata_path(dir.path(), "9");
        let part = part_path(&path);
        std::fs::create_dir_all(dir.path().join(METADATA_DIR))?;
        std::fs::write(&part, "{\"desc\": \"trunc")?;

        assert!(write_metadata(dir.path(), &aweme).await?);
        let value: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(value["desc"], "ok");
        assert!(!part.exists());
        Ok(())
    }
}

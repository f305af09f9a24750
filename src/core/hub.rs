//! 模型仓库文件下载
//!
//! 依次尝试 huggingface.co 和 hf-mirror.com, 先写入 `.part` 文件, 完成后重命名

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    time::Duration,
};

use log::{info, warn};
use reqwest::blocking::Client;

use crate::error::Error;

pub const HUB_ENDPOINTS: [&str; 2] = ["https://huggingface.co", "https://hf-mirror.com"];

pub struct HubFetcher {
    client: Client,
    endpoints: Vec<String>,
}

impl HubFetcher {
    pub fn new() -> Result<Self, Error> {
        Self::with_endpoints(HUB_ENDPOINTS.iter().map(|v| v.to_string()).collect())
    }

    pub fn with_endpoints(endpoints: Vec<String>) -> Result<Self, Error> {
        // 模型文件较大, 不限制总时长
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()?;

        Ok(Self { client, endpoints })
    }

    /// 下载 `<endpoint>/<repo_path>` 到 dest, 文件已存在时直接返回
    pub fn fetch(&self, repo_path: &str, dest: &Path) -> Result<PathBuf, Error> {
        if dest.exists() {
            return Ok(dest.to_path_buf());
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut last_error = Error::FileNotFound(repo_path.to_string());
        for endpoint in &self.endpoints {
            let url = format!(
                "{}/{}",
                endpoint.trim_end_matches('/'),
                repo_path.trim_start_matches('/')
            );
            match self.fetch_from(&url, dest) {
                Ok(()) => {
                    info!("downloaded {url} to {}", dest.display());
                    return Ok(dest.to_path_buf());
                }
                Err(e) => {
                    warn!("download from {url} failed, {e}");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    fn fetch_from(&self, url: &str, dest: &Path) -> Result<(), Error> {
        let mut response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(status.as_u16()));
        }

        let part = part_path(dest);
        let result = File::create(&part)
            .map_err(Error::from)
            .and_then(|mut file| response.copy_to(&mut file).map_err(Error::from));
        if let Err(e) = result {
            remove_partial(&part);
            return Err(e);
        }

        fs::rename(&part, dest)?;
        Ok(())
    }
}

fn remove_partial(part: &Path) {
    match fs::remove_file(part) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("remove partial file failed, {}, {e}", part.display()),
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/models/luts/a.cube")),
            PathBuf::from("/models/luts/a.cube.part")
        );
    }

    #[test]
    fn test_existing_file_skips_network() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dest = dir.path().join("a.cube");
        fs::write(&dest, "kept")?;

        // 不可达的地址, 若发起请求则会失败
        let fetcher = HubFetcher::with_endpoints(vec!["http://127.0.0.1:9".to_string()])?;
        assert_eq!(fetcher.fetch("repo/a.cube", &dest)?, dest);
        assert_eq!(fs::read_to_string(&dest)?, "kept");
        Ok(())
    }
}

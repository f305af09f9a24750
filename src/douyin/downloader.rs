//! 并发媒体下载
//!
//! 信号量限制同时进行的下载数, 单个文件失败不影响其他文件

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use futures::{future::join_all, StreamExt};
use log::{debug, error, info, warn};
use reqwest::{header::CONTENT_TYPE, Client};
use tokio::{io::AsyncWriteExt, sync::Semaphore};

use crate::{
    douyin::{
        client::media_headers,
        config::DownloadConfig,
        media::{build_tasks, corrected_destination, DownloadTask},
        metadata::write_metadata,
        model::Aweme,
    },
    error::Error,
};

/// 下载结果统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadReport {
    /// 成功的文件数
    pub success: usize,
    /// 尝试下载的文件数
    pub total: usize,
}

pub struct MediaDownloader {
    client: Client,
    cookie: String,
    config: DownloadConfig,
}

impl MediaDownloader {
    pub fn new(cookie: impl Into<String>, config: DownloadConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(config.timeout_duration())
            .build()?;

        Ok(Self {
            client,
            cookie: cookie.into(),
            config,
        })
    }

    /// 单次下载, 成功时返回实际写入的路径
    pub async fn download_file(&self, task: &DownloadTask) -> Result<PathBuf, Error> {
        let response = self
            .client
            .get(&task.url)
            .headers(media_headers(&self.cookie, &task.referer, &task.url)?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let dest = corrected_destination(&task.dest, content_type.as_deref());
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(&dest).await?;
        let written = write_body(&mut file, response).await;
        drop(file);
        if let Err(e) = written {
            remove_partial(&dest).await;
            return Err(e);
        }

        let size = tokio::fs::metadata(&dest).await?.len();
        if size == 0 {
            remove_partial(&dest).await;
            return Err(Error::EmptyDownload(task.url.clone()));
        }

        debug!("downloaded {} bytes to {}", size, dest.display());
        Ok(dest)
    }

    /// 带重试的下载, 返回是否成功
    pub async fn download_with_retry(&self, task: &DownloadTask) -> bool {
        let max_attempts = self.config.max_attempts;

        for attempt in 1..=max_attempts {
            match self.download_file(task).await {
                Ok(_) => return true,
                Err(e) => warn!(
                    "download failed, attempt {attempt}/{max_attempts}, url: {}, {e}",
                    task.url
                ),
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.config.retry_delay()).await;
            }
        }

        error!(
            "download gave up after {max_attempts} attempts, url: {}",
            task.url
        );
        false
    }

    /// 并发执行全部任务
    pub async fn download_tasks(&self, tasks: Vec<DownloadTask>) -> Result<DownloadReport, Error> {
        let total = tasks.len();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let success = AtomicUsize::new(0);

        let futures = tasks.iter().map(|task| {
            let semaphore = semaphore.clone();
            let success = &success;
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| Error::AcquireError(e.to_string()))?;
                if self.download_with_retry(task).await {
                    success.fetch_add(1, Ordering::SeqCst);
                }
                Ok::<(), Error>(())
            }
        });

        for result in join_all(futures).await {
            result?;
        }

        Ok(DownloadReport {
            success: success.load(Ordering::SeqCst),
            total,
        })
    }

    /// 写入元数据并下载全部作品的媒体文件
    pub async fn download_all(
        &self,
        awemes: &[Aweme],
        save_dir: &Path,
    ) -> Result<DownloadReport, Error> {
        let mut tasks = Vec::new();
        for aweme in awemes {
            match write_metadata(save_dir, aweme).await {
                Ok(true) => debug!("metadata saved, aweme {}", aweme.aweme_id),
                Ok(false) => debug!("metadata exists, aweme {}", aweme.aweme_id),
                Err(e) => warn!("write metadata failed, aweme {}, {e}", aweme.aweme_id),
            }
            tasks.extend(build_tasks(aweme, save_dir));
        }

        info!(
            "downloading {} files of {} posts, concurrency {}",
            tasks.len(),
            awemes.len(),
            self.config.concurrency
        );
        self.download_tasks(tasks).await
    }
}

/// 流式写入响应体并刷新到磁盘
async fn write_body(file: &mut tokio::fs::File, response: reqwest::Response) -> Result<(), Error> {
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("remove partial file failed, {}, {e}", path.display());
    }
}

//! 下载任务编排
//!
//! 状态流转: idle -> initializing -> resolving_account -> crawling -> downloading -> completed,
//! 任意运行中状态出错时进入 error。
//! 同一实例同时只允许一个任务运行, 任务在独立线程的 tokio 运行时中执行。
//! 任务结束后可通过 [`Notifier`] 通知调用方。

use std::{
    fmt,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use log::{error, info};
use reqwest::Client;
use strum_macros::Display;

use crate::{
    douyin::{
        config::DouyinConfig, crawler::PostCrawler, downloader::MediaDownloader,
        metadata::METADATA_DIR, resolver::resolve_account,
    },
    error::Error,
};

/// 任务已在运行时返回的状态
pub const STATUS_ALREADY_RUNNING: &str = "Task is already running, please wait";

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    Idle,
    Initializing,
    ResolvingAccount,
    Crawling,
    Downloading,
    Completed,
    Error,
}

impl RunState {
    /// 终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Error)
    }
}

/// 状态快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStatus {
    pub state: RunState,
    pub message: String,
}

/// 最近一次写入的状态, 供节点随时读取
#[derive(Debug)]
pub struct StatusBoard {
    inner: Mutex<RunStatus>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self {
            inner: Mutex::new(RunStatus {
                state: RunState::Idle,
                message: "Waiting to start".to_string(),
            }),
        }
    }
}

impl StatusBoard {
    /// 更新状态, 内容变化时输出一次日志
    pub fn set(&self, state: RunState, message: impl Into<String>) {
        let message = message.into();
        let mut status = match self.inner.lock() {
            Ok(v) => v,
            Err(poisoned) => poisoned.into_inner(),
        };
        if status.message != message {
            info!("[Douyin Downloader] {message}");
        }
        *status = RunStatus { state, message };
    }

    pub fn snapshot(&self) -> RunStatus {
        match self.inner.lock() {
            Ok(v) => v.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// 一次下载请求
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub account_url: String,
    pub save_dir: PathBuf,
    pub max_posts: usize,
    pub config: DouyinConfig,
    pub debug: bool,
}

/// 一次下载的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub success: usize,
    pub total: usize,
    pub posts: usize,
    pub elapsed: Duration,
    pub save_dir: PathBuf,
}

impl RunOutcome {
    pub fn summary(&self) -> String {
        format!(
            "Download finished: {}/{} files succeeded\nSaved to: {}\nElapsed: {:.1}s",
            self.success,
            self.total,
            self.save_dir.display(),
            self.elapsed.as_secs_f64()
        )
    }
}

/// 运行标志, 离开作用域时释放
struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, Error> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| Error::RunInProgress)?;
        Ok(RunGuard(flag.clone()))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 任务结束通知, 参数为最终状态
#[derive(Clone)]
pub struct Notifier(Arc<dyn Fn(&RunStatus) + Send + Sync>);

impl Notifier {
    pub fn new(f: impl Fn(&RunStatus) + Send + Sync + 'static) -> Self {
        Notifier(Arc::new(f))
    }

    pub fn notify(&self, status: &RunStatus) {
        (self.0)(status)
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Notifier")
    }
}

#[derive(Debug, Clone, Default)]
pub struct DouyinOrchestrator {
    running: Arc<AtomicBool>,
    status: Arc<StatusBoard>,
    notifier: Option<Notifier>,
}

impl DouyinOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> RunStatus {
        self.status.snapshot()
    }

    /// 在后台线程中启动任务
    ///
    /// 已有任务运行时返回 `RunInProgress`, 不影响正在运行的任务
    pub fn start(
        &self,
        request: RunRequest,
    ) -> Result<JoinHandle<Result<RunOutcome, Error>>, Error> {
        let guard = RunGuard::acquire(&self.running)?;
        self.status.set(RunState::Initializing, "Initializing task...");

        let status = self.status.clone();
        let notifier = self.notifier.clone();
        let handle = std::thread::Builder::new()
            .name("douyin-downloader".to_string())
            .spawn(move || {
                let _guard = guard;
                let runtime = match tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
                {
                    Ok(v) => v,
                    Err(e) => {
                        error!("create tokio runtime failed, {e}");
                        status.set(RunState::Error, format!("Error: {e}"));
                        if let Some(notifier) = &notifier {
                            notifier.notify(&status.snapshot());
                        }
                        return Err(Error::from(e));
                    }
                };
                runtime.block_on(execute(&status, notifier.as_ref(), request))
            })?;

        Ok(handle)
    }

    /// 在当前运行时中执行任务
    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome, Error> {
        let _guard = RunGuard::acquire(&self.running)?;
        self.status.set(RunState::Initializing, "Initializing task...");
        execute(&self.status, self.notifier.as_ref(), request).await
    }
}

/// 执行任务并记录最终状态
async fn execute(
    status: &StatusBoard,
    notifier: Option<&Notifier>,
    request: RunRequest,
) -> Result<RunOutcome, Error> {
    let result = pipeline(status, &request).await;
    match &result {
        Ok(outcome) => status.set(RunState::Completed, outcome.summary()),
        Err(e) => {
            error!("douyin download failed, {e}");
            status.set(RunState::Error, format!("Error: {e}"));
        }
    }
    if let Some(notifier) = notifier {
        notifier.notify(&status.snapshot());
    }
    result
}

async fn pipeline(status: &StatusBoard, request: &RunRequest) -> Result<RunOutcome, Error> {
    let config = &request.config;

    status.set(RunState::Initializing, "Initializing downloader...");
    tokio::fs::create_dir_all(request.save_dir.join(METADATA_DIR)).await?;
    let client = Client::builder().build()?;
    let downloader = MediaDownloader::new(config.cookie.clone(), config.download.clone())?;
    if request.debug {
        info!("save directory: {}", request.save_dir.display());
    }

    status.set(RunState::ResolvingAccount, "Resolving account...");
    let sec_user_id = resolve_account(&client, &config.cookie, &request.account_url).await?;
    if request.debug {
        info!("sec_user_id: {sec_user_id}");
    }

    status.set(
        RunState::Crawling,
        format!("Fetching the latest {} posts...", request.max_posts),
    );
    let crawler = PostCrawler::new(client, config.cookie.clone(), config.crawl.clone());
    let awemes = crawler.crawl(&sec_user_id, request.max_posts).await?;
    if request.debug {
        info!("fetched {} posts", awemes.len());
    }

    status.set(
        RunState::Downloading,
        format!("Downloading {} posts...", awemes.len()),
    );
    let start = Instant::now();
    let report = downloader.download_all(&awemes, &request.save_dir).await?;

    Ok(RunOutcome {
        success: report.success,
        total: report.total,
        posts: awemes.len(),
        elapsed: start.elapsed(),
        save_dir: request.save_dir.clone(),
    })
}

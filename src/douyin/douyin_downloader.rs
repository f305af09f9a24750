//! 抖音下载节点
//!
//! 节点立即返回当前状态, 下载在后台进行, 再次执行节点可查看最新状态

use log::{error, info, warn};
use pyo3::{
    exceptions::PyRuntimeError,
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyErr, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_DOUYIN,
    douyin::{
        config::{DouyinConfig, DownloadConfig},
        orchestrator::{DouyinOrchestrator, Notifier, RunRequest, RunStatus, STATUS_ALREADY_RUNNING},
    },
    error::Error,
    wrapper::{
        comfy::folder_paths::FolderPaths,
        comfyui::{
            send_message,
            types::{NODE_BOOLEAN, NODE_INT, NODE_STRING},
            PromptServer,
        },
    },
};

pub const DEFAULT_SAVE_DIRECTORY: &str = "douyin_downloads";

/// 抖音账号作品下载
#[pyclass(subclass)]
pub struct DouyinDownloader {
    orchestrator: DouyinOrchestrator,
}

impl PromptServer for DouyinDownloader {}

#[pymethods]
impl DouyinDownloader {
    #[new]
    fn new() -> Self {
        Self {
            orchestrator: DouyinOrchestrator::new().with_notifier(Notifier::new(notify_finished)),
        }
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str,) {
        (NODE_STRING,)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str,) {
        ("status",)
    }

    #[classattr]
    #[pyo3(name = "OUTPUT_NODE")]
    fn output_node() -> bool {
        true
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_DOUYIN;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Download the latest videos and image galleries of a Douyin account in the background."
    }

    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let dict = PyDict::new(py);
            dict.set_item("required", {
                let required = PyDict::new(py);
                required.set_item(
                    "cookie",
                    (NODE_STRING, {
                        let cookie = PyDict::new(py);
                        cookie.set_item("default", "")?;
                        cookie.set_item("multiline", true)?;
                        cookie.set_item("tooltip", "Cookie of a logged-in douyin.com session")?;
                        cookie
                    }),
                )?;
                required.set_item(
                    "account_url",
                    (NODE_STRING, {
                        let account_url = PyDict::new(py);
                        account_url.set_item("default", "")?;
                        account_url.set_item("tooltip", "Share link or profile url of the account")?;
                        account_url
                    }),
                )?;
                required.set_item(
                    "save_directory",
                    (NODE_STRING, {
                        let save_directory = PyDict::new(py);
                        save_directory.set_item("default", DEFAULT_SAVE_DIRECTORY)?;
                        save_directory.set_item("tooltip", "Directory under the ComfyUI output folder")?;
                        save_directory
                    }),
                )?;
                required.set_item(
                    "max_download",
                    (NODE_INT, {
                        let max_download = PyDict::new(py);
                        max_download.set_item("default", 50)?;
                        max_download.set_item("min", 1)?;
                        max_download.set_item("max", 2000)?;
                        max_download.set_item("step", 1)?;
                        max_download.set_item("tooltip", "Maximum number of posts to download")?;
                        max_download
                    }),
                )?;
                required.set_item(
                    "concurrency",
                    (NODE_INT, {
                        let concurrency = PyDict::new(py);
                        concurrency.set_item("default", 3)?;
                        concurrency.set_item("min", 1)?;
                        concurrency.set_item("max", 10)?;
                        concurrency.set_item("step", 1)?;
                        concurrency.set_item("tooltip", "Number of simultaneous downloads")?;
                        concurrency
                    }),
                )?;
                required
            })?;

            dict.set_item("optional", {
                let optional = PyDict::new(py);
                optional.set_item(
                    "debug_mode",
                    (NODE_BOOLEAN, {
                        let debug_mode = PyDict::new(py);
                        debug_mode.set_item("default", false)?;
                        debug_mode.set_item("tooltip", "Log extra details of the run")?;
                        debug_mode
                    }),
                )?;
                optional
            })?;

            Ok(dict.into())
        })
    }

    /// 每次都重新执行, 以便读取最新状态
    #[classmethod]
    #[pyo3(name = "IS_CHANGED", signature = (**_kwargs))]
    fn is_changed(_cls: &Bound<'_, PyType>, _kwargs: Option<Bound<'_, PyDict>>) -> f64 {
        f64::NAN
    }

    #[allow(clippy::too_many_arguments)]
    #[pyo3(
        name = "execute",
        signature = (cookie, account_url, save_directory, max_download, concurrency, debug_mode=false)
    )]
    fn execute(
        &mut self,
        py: Python,
        cookie: String,
        account_url: String,
        save_directory: String,
        max_download: usize,
        concurrency: usize,
        debug_mode: bool,
    ) -> PyResult<(String,)> {
        if self.orchestrator.is_running() {
            return Ok((STATUS_ALREADY_RUNNING.to_string(),));
        }

        let folder_paths = FolderPaths::resolve(py);
        let result = self.start(
            &folder_paths,
            cookie,
            account_url,
            save_directory,
            max_download,
            concurrency,
            debug_mode,
        );

        match result {
            Ok(v) => Ok((v,)),
            Err(e) => {
                error!("DouyinDownloader error, {e}");
                if let Err(e) = self.send_error(py, "DouyinDownloader".to_string(), e.to_string())
                {
                    error!("send error failed, {e}");
                    return Err(PyErr::new::<PyRuntimeError, _>(e.to_string()));
                };
                Err(PyErr::new::<PyRuntimeError, _>(e.to_string()))
            }
        }
    }
}

impl DouyinDownloader {
    /// 启动后台任务, 返回当前状态
    #[allow(clippy::too_many_arguments)]
    fn start(
        &self,
        folder_paths: &FolderPaths,
        cookie: String,
        account_url: String,
        save_directory: String,
        max_download: usize,
        concurrency: usize,
        debug_mode: bool,
    ) -> Result<String, Error> {
        if cookie.trim().is_empty() {
            return Err(Error::InvalidParameter("cookie is empty".to_string()));
        }
        if account_url.trim().is_empty() {
            return Err(Error::InvalidParameter("account_url is empty".to_string()));
        }

        let save_directory = match save_directory.trim() {
            "" => DEFAULT_SAVE_DIRECTORY,
            v => v,
        };
        let save_dir = folder_paths.output_directory().join(save_directory);
        if debug_mode {
            info!("douyin save directory: {}", save_dir.display());
        }

        let config = DouyinConfig::new(cookie)
            .with_download(DownloadConfig::default().with_concurrency(concurrency));
        let request = RunRequest {
            account_url,
            save_dir,
            max_posts: max_download.max(1),
            config,
            debug: debug_mode,
        };

        match self.orchestrator.start(request) {
            // 后台线程独立运行, 不等待结束
            Ok(_handle) => Ok(self.orchestrator.status().message),
            Err(Error::RunInProgress) => Ok(STATUS_ALREADY_RUNNING.to_string()),
            Err(e) => Err(e),
        }
    }
}

/// 任务结束后通知前端
fn notify_finished(status: &RunStatus) {
    let result = Python::with_gil(|py| -> PyResult<()> {
        let data = PyDict::new(py);
        data.set_item("type", "DouyinDownloaderFinished")?;
        data.set_item("node", "DouyinDownloader")?;
        data.set_item("state", status.state.to_string())?;
        data.set_item("message", &status.message)?;
        send_message(py, &data)
    });
    if let Err(e) = result {
        warn!("send finished notice failed, {e}");
    }
}

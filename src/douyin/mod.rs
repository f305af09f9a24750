//! 抖音账号作品下载
//!
//! 账号解析 -> 分页抓取 -> 并发下载, 由 `DouyinOrchestrator` 在后台线程中编排

use pyo3::{
    types::{PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

use crate::core::node::NodeRegister;

pub mod client;
pub mod config;
pub mod crawler;
pub mod downloader;
pub mod media;
pub mod metadata;
pub mod model;
pub mod orchestrator;
pub mod resolver;

mod douyin_downloader;
pub use douyin_downloader::DouyinDownloader;

/// 抖音模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "douyin")?;
    submodule.add_class::<DouyinDownloader>()?;
    Ok(submodule)
}

/// Douyin node register
pub fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let nodes: Vec<NodeRegister> = vec![NodeRegister(
        "DouyinDownloader",
        py.get_type::<DouyinDownloader>(),
        "Ck Douyin Downloader",
    )];
    Ok(nodes)
}

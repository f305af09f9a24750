//! 文件夹路径
//!
//! 优先读取 ComfyUI 的 `folder_paths` 模块, 不可用时以当前目录为基础路径

use std::path::{Path, PathBuf};

use log::warn;
use pyo3::{
    types::{PyAnyMethods, PyModule},
    PyResult, Python,
};

/// 文件夹路径配置结构体
#[derive(Debug, Clone)]
pub struct FolderPaths {
    /// 基础路径
    base_path: PathBuf,
    /// 模型路径
    model_path: PathBuf,
    /// 输出目录
    output_directory: PathBuf,
    /// 输入目录
    input_directory: PathBuf,
    /// 临时目录
    temp_directory: PathBuf,
}

impl Default for FolderPaths {
    fn default() -> Self {
        let base_path = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::from_base_directory(base_path)
    }
}

impl FolderPaths {
    /// 以指定目录为基础路径
    pub fn from_base_directory(base_directory: impl Into<PathBuf>) -> Self {
        let base_path = base_directory.into();

        Self {
            model_path: base_path.join("models"),
            output_directory: base_path.join("output"),
            input_directory: base_path.join("input"),
            temp_directory: base_path.join("temp"),
            base_path,
        }
    }

    /// 从 ComfyUI 运行环境中读取
    ///
    /// ```python,ignore
    /// import folder_paths
    /// folder_paths.get_output_directory()
    /// ```
    pub fn from_comfy(py: Python<'_>) -> PyResult<Self> {
        let module = PyModule::import(py, "folder_paths")?;

        let base_path: PathBuf = module.getattr("base_path")?.extract()?;
        let model_path: PathBuf = module.getattr("models_dir")?.extract()?;
        let output_directory: PathBuf = module.call_method0("get_output_directory")?.extract()?;
        let input_directory: PathBuf = module.call_method0("get_input_directory")?.extract()?;
        let temp_directory: PathBuf = module.call_method0("get_temp_directory")?.extract()?;

        Ok(Self {
            base_path,
            model_path,
            output_directory,
            input_directory,
            temp_directory,
        })
    }

    /// ComfyUI 环境可用时读取其配置, 否则使用默认路径
    pub fn resolve(py: Python<'_>) -> Self {
        match Self::from_comfy(py) {
            Ok(v) => v,
            Err(e) => {
                warn!("folder_paths module unavailable, fallback to current directory, {e}");
                Self::default()
            }
        }
    }

    /// 获取基础路径
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// 获取模型路径
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// 获取输出目录
    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// 获取输入目录
    pub fn input_directory(&self) -> &Path {
        &self.input_directory
    }

    /// 获取临时目录
    pub fn temp_directory(&self) -> &Path {
        &self.temp_directory
    }

    /// 模型子目录, 如 `loras`, `luts`
    pub fn model_folder(&self, name: &str) -> PathBuf {
        self.model_path.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_base_directory() {
        let folder_paths = FolderPaths::from_base_directory("/opt/comfy");
        assert_eq!(folder_paths.base_path(), Path::new("/opt/comfy"));
        assert_eq!(folder_paths.output_directory(), Path::new("/opt/comfy/output"));
        assert_eq!(folder_paths.input_directory(), Path::new("/opt/comfy/input"));
        assert_eq!(folder_paths.temp_directory(), Path::new("/opt/comfy/temp"));
        assert_eq!(
            folder_paths.model_folder("luts"),
            PathBuf::from("/opt/comfy/models/luts")
        );
    }

    #[test]
    fn test_default_uses_current_dir() {
        let folder_paths = FolderPaths::default();
        assert!(folder_paths.base_path().exists());
        assert!(folder_paths.model_path().ends_with("models"));
    }

    #[test]
    #[ignore]
    fn test_from_comfy() -> anyhow::Result<()> {
        Python::with_gil(|py| -> anyhow::Result<()> {
            let folder_paths = FolderPaths::from_comfy(py)?;
            println!("output: {:?}", folder_paths.output_directory());
            Ok(())
        })
    }
}

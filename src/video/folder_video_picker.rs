//! 文件夹视频选择
//!
//! 按顺序或随机从目录中选择一个视频, 同时返回其第一帧

use std::path::{Path, PathBuf};

use candle_core::Device;
use log::{debug, error};
use pyo3::{
    exceptions::PyRuntimeError,
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyErr, PyResult, Python,
};

use crate::{
    core::{
        category::CATEGORY_VIDEO,
        selection::{SelectionMode, Selector},
        utils::{directory::scan_files, image::images_to_batch},
    },
    error::Error,
    video::ffmpeg::Ffmpeg,
    wrapper::{
        comfy::folder_paths::FolderPaths,
        comfyui::{
            types::{NODE_BOOLEAN, NODE_IMAGE, NODE_INT, NODE_SEED_MAX, NODE_STRING},
            PromptServer,
        },
        torch::tensor::TensorWrapper,
    },
};

pub const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "mov", "avi", "mkv", "webm"];

#[pyclass(subclass)]
pub struct FolderVideoPicker {
    device: Device,
    selector: Selector,
    cache: Option<(PathBuf, Vec<PathBuf>)>,
}

impl PromptServer for FolderVideoPicker {}

#[pymethods]
impl FolderVideoPicker {
    #[new]
    fn new() -> Self {
        Self {
            device: Device::Cpu,
            selector: Selector::new(),
            cache: None,
        }
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str, &'static str) {
        (NODE_STRING, NODE_IMAGE, NODE_INT)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str, &'static str) {
        ("video_path", "first_frame", "index")
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_VIDEO;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Pick one video from a folder, sequentially or at random, and decode its first frame."
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
                    "directory",
                    (NODE_STRING, {
                        let directory = PyDict::new(py);
                        directory.set_item("default", "videos")?;
                        directory.set_item("tooltip", "Folder relative to the input directory")?;
                        directory
                    }),
                )?;
                required.set_item(
                    "mode",
                    (SelectionMode::choices(), {
                        let mode = PyDict::new(py);
                        mode.set_item("default", SelectionMode::Sequential.to_string())?;
                        mode
                    }),
                )?;
                required.set_item(
                    "seed",
                    (NODE_INT, {
                        let seed = PyDict::new(py);
                        seed.set_item("default", 0)?;
                        seed.set_item("min", 0)?;
                        seed.set_item("max", NODE_SEED_MAX)?;
                        seed
                    }),
                )?;
                required
            })?;

            dict.set_item("optional", {
                let optional = PyDict::new(py);
                optional.set_item(
                    "reset_counter",
                    (NODE_BOOLEAN, {
                        let reset_counter = PyDict::new(py);
                        reset_counter.set_item("default", false)?;
                        reset_counter
                    }),
                )?;
                optional
            })?;

            Ok(dict.into())
        })
    }

    #[classmethod]
    #[pyo3(name = "IS_CHANGED", signature = (**_kwargs))]
    fn is_changed(_cls: &Bound<'_, PyType>, _kwargs: Option<Bound<'_, PyDict>>) -> f64 {
        f64::NAN
    }

    #[pyo3(name = "execute", signature = (directory, mode, seed, reset_counter=false))]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        directory: String,
        mode: String,
        seed: u64,
        reset_counter: bool,
    ) -> PyResult<(String, Bound<'py, PyAny>, usize)> {
        let input_directory = FolderPaths::resolve(py).input_directory().to_path_buf();
        let result = self.load(py, &input_directory, &directory, &mode, seed, reset_counter);

        match result {
            Ok(v) => Ok(v),
            Err(e) => {
                error!("FolderVideoPicker error, {e}");
                if let Err(e) = self.send_error(py, "FolderVideoPicker".to_string(), e.to_string())
                {
                    error!("send error failed, {e}");
                    return Err(PyErr::new::<PyRuntimeError, _>(e.to_string()));
                };
                Err(PyErr::new::<PyRuntimeError, _>(e.to_string()))
            }
        }
    }
}

impl FolderVideoPicker {
    fn load<'py>(
        &mut self,
        py: Python<'py>,
        input_directory: &Path,
        directory: &str,
        mode: &str,
        seed: u64,
        reset: bool,
    ) -> Result<(String, Bound<'py, PyAny>, usize), Error> {
        let mode = mode
            .parse::<SelectionMode>()
            .map_err(|e| Error::ParseEnumString(e.to_string()))?;

        let (path, index) = self.pick(input_directory, directory, mode, seed, reset)?;
        debug!("picked video {}", path.display());

        let frame = Ffmpeg::locate()?.first_frame(&path)?;
        let tensor = images_to_batch(&[frame], &self.device)?;
        let image = TensorWrapper::<f32>::from_tensor(tensor).to_py_tensor(py)?;

        Ok((path.to_string_lossy().to_string(), image, index))
    }

    /// 选择一个视频, 返回路径和序号 (从 1 开始)
    fn pick(
        &mut self,
        input_directory: &Path,
        directory: &str,
        mode: SelectionMode,
        seed: u64,
        reset: bool,
    ) -> Result<(PathBuf, usize), Error> {
        let folder = resolve_directory(input_directory, directory);

        let stale = match &self.cache {
            Some((cached, files)) => *cached != folder || files.is_empty(),
            None => true,
        };
        if reset || stale {
            let files = scan_files(&folder, &VIDEO_EXTENSIONS, false)?;
            debug!("found {} videos in {}", files.len(), folder.display());
            self.cache = Some((folder, files));
            self.selector.reset();
        }

        let files = self.cache.as_ref().map(|(_, v)| v.as_slice()).unwrap_or_default();
        let index = self.selector.pick(files.len(), mode, seed)?;
        Ok((files[index].clone(), index + 1))
    }
}

/// 相对路径基于输入目录
pub fn resolve_directory(input_directory: &Path, directory: &str) -> PathBuf {
    let directory = directory.trim();
    let path = Path::new(directory);
    if path.is_absolute() {
        path.to_path_buf()
    } else if directory.is_empty() || directory == "." {
        input_directory.to_path_buf()
    } else {
        input_directory.join(path)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_resolve_directory() {
        let input = Path::new("/comfy/input");
        assert_eq!(resolve_directory(input, "clips"), PathBuf::from("/comfy/input/clips"));
        assert_eq!(resolve_directory(input, " . "), PathBuf::from("/comfy/input"));
        assert_eq!(resolve_directory(input, "/data/videos"), PathBuf::from("/data/videos"));
    }

    #[test]
    fn test_pick_videos() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let clips = dir.path().join("clips");
        fs::create_dir_all(&clips)?;
        for name in ["b.mov", "a.mp4", "c.MKV", "cover.jpg"] {
            fs::write(clips.join(name), b"x")?;
        }

        let mut picker = FolderVideoPicker::new();
        let picked = (0..4)
            .map(|_| picker.pick(dir.path(), "clips", SelectionMode::Sequential, 0, false))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(
            picked,
            vec![
                (clips.join("a.mp4"), 1),
                (clips.join("b.mov"), 2),
                (clips.join("c.MKV"), 3),
                (clips.join("a.mp4"), 1),
            ]
        );

        let (path, index) = picker.pick(dir.path(), "clips", SelectionMode::Random, 9, false)?;
        assert!(path.starts_with(&clips));
        assert!((1..=3).contains(&index));
        Ok(())
    }

    #[test]
    fn test_pick_empty_folder() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut picker = FolderVideoPicker::new();
        assert!(matches!(
            picker.pick(dir.path(), ".", SelectionMode::Sequential, 0, false),
            Err(Error::ListEmpty)
        ));
        Ok(())
    }
}

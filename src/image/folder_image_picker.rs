//! 文件夹图片选择
//!
//! 从 `<input>/picdata/<subfolder>` 中按顺序或随机读取一张图片

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
        category::CATEGORY_IMAGE,
        selection::{SelectionMode, Selector},
        utils::{
            directory::{list_subdirectories, scan_files},
            image::load_image_batch,
        },
    },
    error::Error,
    wrapper::{
        comfy::folder_paths::FolderPaths,
        comfyui::{
            types::{NODE_BOOLEAN, NODE_IMAGE, NODE_INT, NODE_SEED_MAX},
            PromptServer,
        },
        torch::tensor::TensorWrapper,
    },
};

/// 图片根目录, 位于输入目录下
pub const PICTURE_ROOT: &str = "picdata";
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// 文件夹图片选择
#[pyclass(subclass)]
pub struct FolderImagePicker {
    device: Device,
    selector: Selector,
    /// (目录, 文件列表)
    cache: Option<(PathBuf, Vec<PathBuf>)>,
}

impl PromptServer for FolderImagePicker {}

#[pymethods]
impl FolderImagePicker {
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
    fn return_types() -> (&'static str, &'static str) {
        (NODE_IMAGE, NODE_INT)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str) {
        ("image", "index")
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_IMAGE;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Pick one image from a subfolder of input/picdata, sequentially or at random."
    }

    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let root = FolderPaths::resolve(py)
                .input_directory()
                .join(PICTURE_ROOT);
            let mut subfolders = list_subdirectories(&root);
            if subfolders.is_empty() {
                subfolders.push(".".to_string());
            }

            let dict = PyDict::new(py);
            dict.set_item("required", {
                let required = PyDict::new(py);
                required.set_item(
                    "subfolder",
                    (subfolders.clone(), {
                        let subfolder = PyDict::new(py);
                        subfolder.set_item("default", subfolders[0].clone())?;
                        subfolder.set_item("tooltip", "Subfolder of input/picdata")?;
                        subfolder
                    }),
                )?;
                required.set_item(
                    "seed",
                    (NODE_INT, {
                        let seed = PyDict::new(py);
                        seed.set_item("default", 0)?;
                        seed.set_item("min", 0)?;
                        seed.set_item("max", NODE_SEED_MAX)?;
                        seed.set_item("tooltip", "Random seed, 0 uses system entropy")?;
                        seed
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
                required
            })?;

            dict.set_item("optional", {
                let optional = PyDict::new(py);
                optional.set_item(
                    "reset_counter",
                    (NODE_BOOLEAN, {
                        let reset_counter = PyDict::new(py);
                        reset_counter.set_item("default", false)?;
                        reset_counter.set_item("tooltip", "Rescan the folder and restart from the first image")?;
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

    #[pyo3(name = "execute", signature = (subfolder, seed, mode, reset_counter=false))]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        subfolder: String,
        seed: u64,
        mode: String,
        reset_counter: bool,
    ) -> PyResult<(Bound<'py, PyAny>, usize)> {
        let root = FolderPaths::resolve(py)
            .input_directory()
            .join(PICTURE_ROOT);
        let result = self.load(py, &root, &subfolder, &mode, seed, reset_counter);

        match result {
            Ok(v) => Ok(v),
            Err(e) => {
                error!("FolderImagePicker error, {e}");
                if let Err(e) = self.send_error(py, "FolderImagePicker".to_string(), e.to_string())
                {
                    error!("send error failed, {e}");
                    return Err(PyErr::new::<PyRuntimeError, _>(e.to_string()));
                };
                Err(PyErr::new::<PyRuntimeError, _>(e.to_string()))
            }
        }
    }
}

impl FolderImagePicker {
    fn load<'py>(
        &mut self,
        py: Python<'py>,
        root: &Path,
        subfolder: &str,
        mode: &str,
        seed: u64,
        reset: bool,
    ) -> Result<(Bound<'py, PyAny>, usize), Error> {
        let mode = mode
            .parse::<SelectionMode>()
            .map_err(|e| Error::ParseEnumString(e.to_string()))?;

        let (path, index) = self.pick(root, subfolder, mode, seed, reset)?;
        debug!("picked image {}", path.display());

        let tensor = load_image_batch(&path, &self.device)?;
        let image = TensorWrapper::<f32>::from_tensor(tensor).to_py_tensor(py)?;
        Ok((image, index))
    }

    /// 选择一张图片, 返回路径和序号 (从 1 开始)
    fn pick(
        &mut self,
        root: &Path,
        subfolder: &str,
        mode: SelectionMode,
        seed: u64,
        reset: bool,
    ) -> Result<(PathBuf, usize), Error> {
        let folder = match subfolder.trim() {
            "" | "." => root.to_path_buf(),
            v => root.join(v),
        };

        let stale = match &self.cache {
            Some((cached, _)) => *cached != folder,
            None => true,
        };
        if reset || stale {
            let files = scan_files(&folder, &IMAGE_EXTENSIONS, false)?;
            debug!("found {} images in {}", files.len(), folder.display());
            self.cache = Some((folder, files));
            self.selector.reset();
        }

        let files = self.cache.as_ref().map(|(_, v)| v.as_slice()).unwrap_or_default();
        let index = self.selector.pick(files.len(), mode, seed)?;
        Ok((files[index].clone(), index + 1))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_pick_sequential_and_rescan() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cats = dir.path().join("cats");
        let dogs = dir.path().join("dogs");
        fs::create_dir_all(&cats)?;
        fs::create_dir_all(&dogs)?;
        for name in ["b.png", "a.JPG", "c.webp", "notes.txt"] {
            fs::write(cats.join(name), b"x")?;
        }
        fs::write(dogs.join("d.jpeg"), b"x")?;

        let mut picker = FolderImagePicker::new();
        let names = (0..4)
            .map(|_| {
                picker
                    .pick(dir.path(), "cats", SelectionMode::Sequential, 0, false)
                    .map(|(p, i)| (p.file_name().map(|n| n.to_string_lossy().to_string()), i))
            })
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(
            names,
            vec![
                (Some("a.JPG".to_string()), 1),
                (Some("b.png".to_string()), 2),
                (Some("c.webp".to_string()), 3),
                (Some("a.JPG".to_string()), 1),
            ]
        );

        // 切换目录后重新扫描
        let (path, index) = picker.pick(dir.path(), "dogs", SelectionMode::Sequential, 0, false)?;
        assert_eq!(path, dogs.join("d.jpeg"));
        assert_eq!(index, 1);
        Ok(())
    }

    #[test]
    fn test_pick_missing_folder() {
        let mut picker = FolderImagePicker::new();
        assert!(matches!(
            picker.pick(Path::new("/nonexistent/picdata"), ".", SelectionMode::Random, 1, false),
            Err(Error::InvalidDirectory(_))
        ));
    }
}

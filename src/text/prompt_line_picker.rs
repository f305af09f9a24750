//! 提示词逐行选择
//!
//! 从 txt 文件中按顺序或随机读取一行

use std::path::{Path, PathBuf};

use log::error;
use pyo3::{
    exceptions::PyRuntimeError,
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyErr, PyResult, Python,
};

use crate::{
    core::{
        category::CATEGORY_TEXT,
        selection::{SelectionMode, Selector},
        utils::{directory::has_extension, text_file::read_non_empty_lines},
    },
    error::Error,
    wrapper::comfyui::{
        types::{NODE_BOOLEAN, NODE_INT, NODE_SEED_MAX, NODE_STRING},
        PromptServer,
    },
};

/// 提示词逐行选择
#[pyclass(subclass)]
pub struct PromptLinePicker {
    selector: Selector,
    prompt_file: Option<PathBuf>,
}

impl PromptServer for PromptLinePicker {}

#[pymethods]
impl PromptLinePicker {
    #[new]
    fn new() -> Self {
        Self {
            selector: Selector::new(),
            prompt_file: None,
        }
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str) {
        (NODE_STRING, NODE_INT)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str) {
        ("prompt", "index")
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_TEXT;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Pick one non-empty line from a txt file, sequentially or at random."
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
                    "prompt_file",
                    (NODE_STRING, {
                        let prompt_file = PyDict::new(py);
                        prompt_file.set_item("default", "")?;
                        prompt_file.set_item("tooltip", "Path of a .txt file, one prompt per line")?;
                        prompt_file
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
                        reset_counter.set_item("tooltip", "Restart sequential reading from the first line")?;
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

    #[pyo3(name = "execute", signature = (prompt_file, seed, mode, reset_counter=false))]
    fn execute(
        &mut self,
        py: Python,
        prompt_file: String,
        seed: u64,
        mode: String,
        reset_counter: bool,
    ) -> PyResult<(String, usize)> {
        let result = mode
            .parse::<SelectionMode>()
            .map_err(|e| Error::ParseEnumString(e.to_string()))
            .and_then(|mode| self.pick(Path::new(prompt_file.trim()), mode, seed, reset_counter));

        match result {
            Ok(v) => Ok(v),
            Err(e) => {
                error!("PromptLinePicker error, {e}");
                if let Err(e) = self.send_error(py, "PromptLinePicker".to_string(), e.to_string())
                {
                    error!("send error failed, {e}");
                    return Err(PyErr::new::<PyRuntimeError, _>(e.to_string()));
                };
                Err(PyErr::new::<PyRuntimeError, _>(e.to_string()))
            }
        }
    }
}

impl PromptLinePicker {
    /// 选择一行, 返回内容和行号 (从 1 开始)
    fn pick(
        &mut self,
        path: &Path,
        mode: SelectionMode,
        seed: u64,
        reset: bool,
    ) -> Result<(String, usize), Error> {
        if !path.is_file() {
            return Err(Error::FileNotFound(path.to_string_lossy().to_string()));
        }
        if !has_extension(path, &["txt"]) {
            return Err(Error::InvalidParameter(format!(
                "only .txt files are supported, {}",
                path.display()
            )));
        }

        // 切换文件后从头读取
        if reset || self.prompt_file.as_deref() != Some(path) {
            self.selector.reset();
            self.prompt_file = Some(path.to_path_buf());
        }

        let lines = read_non_empty_lines(path)?;
        let index = self.selector.pick(lines.len(), mode, seed)?;
        Ok((lines[index].clone(), index + 1))
    }
}

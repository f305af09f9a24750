//! LoRA 预设调节
//!
//! 预设权重首次使用时从模型仓库下载到 `<models>/loras`

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use log::{error, info};
use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyResult, Python,
};

use crate::{
    core::{category::CATEGORY_MODEL, hub::HubFetcher},
    error::Error,
    wrapper::{
        comfy::{
            folder_paths::FolderPaths,
            lora::{load_lora_for_models, load_torch_file},
        },
        comfyui::types::{NODE_CLIP, NODE_FLOAT, NODE_MODEL},
    },
};

pub const LORA_FOLDER: &str = "loras";
const LORA_REPO: &str = "liguanwei/mymodels/resolve/main";

// 预设名称 -> 权重文件名 (不含扩展名)
lazy_static! {
    static ref LORA_PRESETS: Vec<(&'static str, &'static str)> = vec![
        ("hand stability", "hand_stability_lora"),
        ("sexy style", "sexy_style_lora"),
        ("influencer style", "Beautifulgirl_size_lora"),
        ("breast size", "breast_size_lora"),
        ("breast size nsfw", "breast_size_nswf"),
    ];
}

pub fn preset_names() -> Vec<&'static str> {
    LORA_PRESETS.iter().map(|(name, _)| *name).collect()
}

/// 预设对应的权重文件名
pub fn preset_file_name(preset: &str) -> Result<String, Error> {
    LORA_PRESETS
        .iter()
        .find(|(name, _)| *name == preset)
        .map(|(_, stem)| format!("{stem}.safetensors"))
        .ok_or_else(|| Error::InvalidParameter(format!("unknown lora preset: {preset}")))
}

/// 仓库内的相对路径
pub fn preset_repo_path(file_name: &str) -> String {
    format!("{LORA_REPO}/{file_name}")
}

#[pyclass(subclass)]
pub struct LoraPresetAdjuster {
    /// (权重路径, 已加载的权重)
    cache: Option<(PathBuf, Py<PyAny>)>,
}

#[pymethods]
impl LoraPresetAdjuster {
    #[new]
    fn new() -> Self {
        Self { cache: None }
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str) {
        (NODE_MODEL, NODE_CLIP)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str) {
        ("model", "clip")
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_MODEL;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Apply a preset LoRA to the model and clip. The weights are downloaded on first use."
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
                required.set_item("model", (NODE_MODEL,))?;
                required.set_item("clip", (NODE_CLIP,))?;
                required.set_item(
                    "preset",
                    (preset_names(), {
                        let preset = PyDict::new(py);
                        preset.set_item("default", preset_names().first().copied())?;
                        preset
                    }),
                )?;
                required.set_item(
                    "strength",
                    (NODE_FLOAT, {
                        let strength = PyDict::new(py);
                        strength.set_item("default", 0.3)?;
                        strength.set_item("min", -1.0)?;
                        strength.set_item("max", 2.0)?;
                        strength.set_item("step", 0.1)?;
                        strength.set_item("tooltip", "0 leaves the model unchanged")?;
                        strength
                    }),
                )?;
                required
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(name = "execute")]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        model: Bound<'py, PyAny>,
        clip: Bound<'py, PyAny>,
        preset: String,
        strength: f32,
    ) -> PyResult<(Bound<'py, PyAny>, Bound<'py, PyAny>)> {
        if strength == 0.0 {
            return Ok((model, clip));
        }

        match self.adjust(py, &model, &clip, &preset, strength) {
            Ok(v) => Ok(v),
            Err(e) => {
                // 失败时原样返回输入
                error!("LoraPresetAdjuster error, {e}");
                Ok((model, clip))
            }
        }
    }
}

impl LoraPresetAdjuster {
    fn adjust<'py>(
        &mut self,
        py: Python<'py>,
        model: &Bound<'py, PyAny>,
        clip: &Bound<'py, PyAny>,
        preset: &str,
        strength: f32,
    ) -> Result<(Bound<'py, PyAny>, Bound<'py, PyAny>), Error> {
        let file_name = preset_file_name(preset)?;
        let dest = FolderPaths::resolve(py)
            .model_folder(LORA_FOLDER)
            .join(&file_name);

        // 下载期间释放 GIL
        let path = py.allow_threads(|| {
            HubFetcher::new().and_then(|fetcher| fetcher.fetch(&preset_repo_path(&file_name), &dest))
        })?;

        let lora = self.load_lora(py, &path)?;
        let (model, clip) =
            load_lora_for_models(py, model, clip, lora.bind(py), strength, strength)?;
        info!("applied lora preset {preset} with strength {strength}");
        Ok((model, clip))
    }

    /// 同一路径的权重只加载一次
    fn load_lora(&mut self, py: Python<'_>, path: &Path) -> Result<Py<PyAny>, Error> {
        if let Some((cached, lora)) = &self.cache {
            if cached == path {
                return Ok(lora.clone_ref(py));
            }
        }

        let lora = load_torch_file(py, path)?;
        self.cache = Some((path.to_path_buf(), lora.clone_ref(py)));
        Ok(lora)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_file_name() -> anyhow::Result<()> {
        assert_eq!(
            preset_file_name("influencer style")?,
            "Beautifulgirl_size_lora.safetensors"
        );
        assert_eq!(
            preset_file_name("breast size nsfw")?,
            "breast_size_nswf.safetensors"
        );
        assert!(matches!(
            preset_file_name("unknown"),
            Err(Error::InvalidParameter(_))
        ));
        Ok(())
    }

    #[test]
    fn test_preset_repo_path() {
        assert_eq!(
            preset_repo_path("hand_stability_lora.safetensors"),
            "liguanwei/mymodels/resolve/main/hand_stability_lora.safetensors"
        );
        assert_eq!(preset_names().len(), 5);
        assert_eq!(preset_names()[0], "hand stability");
    }
}

//! 模型相关的节点
use pyo3::{
    types::{PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

use crate::core::node::NodeRegister;

mod lora_preset_adjuster;
pub use lora_preset_adjuster::LoraPresetAdjuster;

/// 模型模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "model")?;
    submodule.add_class::<LoraPresetAdjuster>()?;
    Ok(submodule)
}

/// Model node register
pub fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let nodes: Vec<NodeRegister> = vec![NodeRegister(
        "LoraPresetAdjuster",
        py.get_type::<LoraPresetAdjuster>(),
        "Ck LoRA Preset Adjuster",
    )];
    Ok(nodes)
}

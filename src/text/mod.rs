//! 文本相关的节点
use pyo3::{
    types::{PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

use crate::core::node::NodeRegister;

mod prompt_line_picker;
pub use prompt_line_picker::PromptLinePicker;

mod markdown_table_to_excel;
pub use markdown_table_to_excel::{parse_table, write_xlsx, MarkdownTableToExcel, Table};

/// 文本模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "text")?;
    submodule.add_class::<PromptLinePicker>()?;
    submodule.add_class::<MarkdownTableToExcel>()?;
    Ok(submodule)
}

/// Text node register
pub fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let nodes: Vec<NodeRegister> = vec![
        NodeRegister(
            "PromptLinePicker",
            py.get_type::<PromptLinePicker>(),
            "Ck Prompt Line Picker",
        ),
        NodeRegister(
            "MarkdownTableToExcel",
            py.get_type::<MarkdownTableToExcel>(),
            "Ck Markdown Table To Excel",
        ),
    ];
    Ok(nodes)
}

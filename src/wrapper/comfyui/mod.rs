//! ComfyUI 服务端包装

pub mod types;

use pyo3::{
    types::{PyAnyMethods, PyDict, PyDictMethods, PyModule},
    Bound, PyResult, PyTypeInfo, Python,
};

/// 前端消息事件名称
const EVENT_NAME: &str = "creator_kit";

/// comfyui PromptServer wrapper
pub trait PromptServer: PyTypeInfo {
    /// 发送日志信息到ComfyUI
    ///
    /// 当节点执行出现异常时通知前端
    fn send_error(&self, py: Python, error_type: String, message: String) -> PyResult<()> {
        let error_data = PyDict::new(py);
        error_data.set_item("type", &error_type)?;
        error_data.set_item("node", self.get_class_name(py)?)?;
        error_data.set_item("message", message)?;

        send_message(py, &error_data)
    }

    /// Class 名称
    fn get_class_name(&self, py: Python) -> PyResult<String> {
        Self::type_object(py)
            .getattr("__name__")?
            .extract::<String>()
    }
}

/// 通过 PromptServer 向前端发送消息
pub fn send_message(py: Python, data: &Bound<'_, PyDict>) -> PyResult<()> {
    let server = PyModule::import(py, "server")?
        .getattr("PromptServer")?
        .getattr("instance")?;

    server.getattr("send_sync")?.call1((EVENT_NAME, data))?;
    Ok(())
}

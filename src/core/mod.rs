//! 公共库
//!
//! 相关节点定义: ComfyUI/comfy/comfy_types/node_typing.py

pub mod category;
pub mod hub;
pub mod lut;
pub mod node;
pub mod selection;
pub mod utils;

//! 工具
pub mod directory;
pub mod image;
pub mod log;
pub mod text_file;

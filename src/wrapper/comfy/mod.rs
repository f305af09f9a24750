pub mod folder_paths;
pub mod lora;

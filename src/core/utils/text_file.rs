//! 文本文件读取, 自动匹配文件编码

use std::{fs, path::Path};

use chardet::{charset2encoding, detect};
use encoding::label::encoding_from_whatwg_label;
use encoding::DecoderTrap;
use log::error;

use crate::error::Error;

/// 读取文件内容， 自动匹配文件编码
pub fn read_to_string_auto(path: &Path) -> Result<String, Error> {
    let bytes = fs::read(path)?;

    // 优先尝试 UTF-8 解码
    if let Ok(s) = std::str::from_utf8(&bytes) {
        return Ok(s.trim_start_matches('\u{feff}').to_string());
    }

    // detect charset of the file
    let result = detect(&bytes);

    // 检测常见编码（GBK/ISO-8859-1）
    if let Some(coder) = encoding_from_whatwg_label(charset2encoding(&result.0)) {
        let text = coder.decode(&bytes, DecoderTrap::Ignore).map_err(|e| {
            error!("decode error, {e}");
            Error::Decode(e.to_string())
        })?;

        return Ok(text);
    }

    error!("file auto decode failed");
    Err(Error::Decode("file auto decode failed".to_string()))
}

/// 读取文件中所有非空行 (去除首尾空白)
pub fn read_non_empty_lines(path: &Path) -> Result<Vec<String>, Error> {
    let content = read_to_string_auto(path)?;
    Ok(content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect())
}

//! 目录操作

use std::{
    fs,
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

use crate::error::Error;

/// 扩展名检测, 忽略大小写和前导的 '.'
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            extensions
                .iter()
                .any(|v| v.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// 扫描目录下指定扩展名的文件, 按路径排序
pub fn scan_files(dir: &Path, extensions: &[&str], recursive: bool) -> Result<Vec<PathBuf>, Error> {
    if !dir.is_dir() {
        return Err(Error::InvalidDirectory(dir.to_string_lossy().to_string()));
    }

    let mut files = Vec::new();
    if recursive {
        let walker = WalkDir::new(dir)
            .max_depth(100) // 防止无限递归
            .into_iter();
        for entry in walker.filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
                files.push(entry.into_path());
            }
        }
    } else {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && has_extension(&path, extensions) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// 列出目录下的子目录名称, 目录不存在时返回空列表
pub fn list_subdirectories(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut dirs: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(|v| v.to_string()))
        .collect();
    dirs.sort();
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_extension() {
        assert!(has_extension(Path::new("a/b.JPG"), &["jpg", "png"]));
        assert!(has_extension(Path::new("b.webp"), &[".webp"]));
        assert!(!has_extension(Path::new("b.gif"), &["jpg"]));
        assert!(!has_extension(Path::new("noext"), &["jpg"]));
    }

    #[test]
    fn test_scan_files_sorted_and_filtered() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("b.png"), b"x")?;
        fs::write(dir.path().join("a.jpg"), b"x")?;
        fs::write(dir.path().join("c.txt"), b"x")?;
        fs::create_dir(dir.path().join("sub"))?;
        fs::write(dir.path().join("sub").join("d.png"), b"x")?;

        let files = scan_files(dir.path(), &["jpg", "png"], false)?;
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png"]);

        let files = scan_files(dir.path(), &["png"], true)?;
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn test_scan_files_invalid_directory() {
        let result = scan_files(Path::new("/definitely/not/here"), &["png"], false);
        assert!(matches!(result, Err(Error::InvalidDirectory(_))));
    }

    #[test]
    fn test_list_subdirectories() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::create_dir(dir.path().join("zeta"))?;
        fs::create_dir(dir.path().join("alpha"))?;
        fs::write(dir.path().join("file.txt"), b"x")?;

        assert_eq!(list_subdirectories(dir.path()), vec!["alpha", "zeta"]);
        assert!(list_subdirectories(&dir.path().join("missing")).is_empty());
        Ok(())
    }
}

//! 表格文本转 Excel
//!
//! 支持 Markdown 表格, 以及用制表符或连续空格分隔的纯文本表格

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{error, info};
use pyo3::{
    exceptions::PyRuntimeError,
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyErr, PyResult, Python,
};
use regex::Regex;
use rust_xlsxwriter::{Format, Workbook};

use crate::{
    core::category::CATEGORY_TEXT,
    error::Error,
    wrapper::{
        comfy::folder_paths::FolderPaths,
        comfyui::{types::NODE_STRING, PromptServer},
    },
};

pub const DEFAULT_EXCEL_DIR: &str = "output/excel_tables";

/// 解析后的表格
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub header: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.header.as_ref().map(|v| v.is_empty()).unwrap_or(true) && self.rows.is_empty()
    }
}

#[pyclass(subclass)]
pub struct MarkdownTableToExcel {}

impl PromptServer for MarkdownTableToExcel {}

#[pymethods]
impl MarkdownTableToExcel {
    #[new]
    fn new() -> Self {
        Self {}
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str,) {
        (NODE_STRING,)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str,) {
        ("output_path",)
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_TEXT;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Convert a markdown table, or text columns separated by tabs or multiple spaces, into an .xlsx file."
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
                    "markdown_text",
                    (NODE_STRING, {
                        let markdown_text = PyDict::new(py);
                        markdown_text.set_item("multiline", true)?;
                        markdown_text.set_item(
                            "default",
                            "| 姓名 | 年龄 |\n|------|------|\n| 张三 | 28   |",
                        )?;
                        markdown_text
                    }),
                )?;
                required.set_item(
                    "output_dir",
                    (NODE_STRING, {
                        let output_dir = PyDict::new(py);
                        output_dir.set_item("default", DEFAULT_EXCEL_DIR)?;
                        output_dir.set_item("tooltip", "Relative to the ComfyUI base directory")?;
                        output_dir
                    }),
                )?;
                required.set_item(
                    "filename",
                    (NODE_STRING, {
                        let filename = PyDict::new(py);
                        filename.set_item("default", "converted_table")?;
                        filename
                    }),
                )?;
                required
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(name = "execute")]
    fn execute(
        &mut self,
        py: Python,
        markdown_text: String,
        output_dir: String,
        filename: String,
    ) -> PyResult<(String,)> {
        let folder_paths = FolderPaths::resolve(py);
        let result = self.convert(
            folder_paths.base_path(),
            &markdown_text,
            &output_dir,
            &filename,
            &Local::now(),
        );

        match result {
            Ok(v) => Ok((v.to_string_lossy().to_string(),)),
            Err(e) => {
                error!("MarkdownTableToExcel error, {e}");
                if let Err(e) =
                    self.send_error(py, "MarkdownTableToExcel".to_string(), e.to_string())
                {
                    error!("send error failed, {e}");
                    return Err(PyErr::new::<PyRuntimeError, _>(e.to_string()));
                };
                Err(PyErr::new::<PyRuntimeError, _>(e.to_string()))
            }
        }
    }
}

impl MarkdownTableToExcel {
    fn convert(
        &self,
        base_path: &Path,
        text: &str,
        output_dir: &str,
        filename: &str,
        now: &DateTime<Local>,
    ) -> Result<PathBuf, Error> {
        let table = parse_table(text)?;
        if table.is_empty() {
            return Err(Error::InvalidParameter("no table found in the text".to_string()));
        }

        let dir = match output_dir.trim() {
            "" => base_path.join(DEFAULT_EXCEL_DIR),
            v => base_path.join(v),
        };
        std::fs::create_dir_all(&dir)?;

        let stem = match filename.trim() {
            "" => "table",
            v => v,
        };
        let path = dir.join(format!("{stem}_{}.xlsx", now.format("%Y%m%d_%H%M%S")));
        write_xlsx(&table, &path)?;

        info!(
            "wrote {} rows to {}",
            table.rows.len(),
            path.display()
        );
        Ok(path)
    }
}

/// 解析表格文本, 含 `|` 时按 Markdown 表格处理
pub fn parse_table(text: &str) -> Result<Table, Error> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();

    if lines.iter().any(|v| v.contains('|')) {
        parse_markdown(&lines)
    } else {
        parse_plain(&lines)
    }
}

/// 第一行为表头, 数据行按表头列数截断或补空
fn parse_markdown(lines: &[&str]) -> Result<Table, Error> {
    let separator = Regex::new(r"^\|?\s*:?-+:?\s*(\|\s*:?-+:?\s*)*\|?$")?;

    let mut data = lines
        .iter()
        .filter(|line| !separator.is_match(line))
        .map(|line| split_markdown_row(line));

    let Some(header) = data.next() else {
        return Ok(Table::default());
    };
    let width = header.len();
    let rows = data
        .map(|mut row| {
            row.resize(width, String::new());
            row
        })
        .collect();

    Ok(Table {
        header: Some(header),
        rows,
    })
}

fn split_markdown_row(line: &str) -> Vec<String> {
    let line = line.strip_prefix('|').unwrap_or(line);
    let line = line.strip_suffix('|').unwrap_or(line);
    line.split('|').map(|cell| cell.trim().to_string()).collect()
}

/// 前两行列数相同时第一行视为表头
fn parse_plain(lines: &[&str]) -> Result<Table, Error> {
    let splitter = Regex::new(r"\t|\s{2,}")?;
    let mut data: Vec<Vec<String>> = lines
        .iter()
        .map(|line| {
            splitter
                .split(line)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect()
        })
        .collect();

    if data.len() > 1 && data[0].len() == data[1].len() {
        let header = data.remove(0);
        return Ok(Table {
            header: Some(header),
            rows: data,
        });
    }
    Ok(Table {
        header: None,
        rows: data,
    })
}

/// 写入 xlsx, 表头加粗
pub fn write_xlsx(table: &Table, path: &Path) -> Result<(), Error> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();

    let mut row_index: u32 = 0;
    if let Some(header) = &table.header {
        for (col, cell) in header.iter().enumerate() {
            worksheet.write_string_with_format(row_index, column(col)?, cell, &bold)?;
        }
        row_index += 1;
    }
    for row in &table.rows {
        for (col, cell) in row.iter().enumerate() {
            worksheet.write_string(row_index, column(col)?, cell)?;
        }
        row_index += 1;
    }

    workbook.save(path)?;
    Ok(())
}

fn column(index: usize) -> Result<u16, Error> {
    u16::try_from(index).map_err(|_| Error::InvalidParameter(format!("too many columns, {index}")))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_parse_markdown_table() -> anyhow::Result<()> {
        let text = "| 姓名 | 年龄 | 城市 |\n| --- | :---: | --- |\n| 张三 | 28 |\n| 李四 |  | 上海 | 多余 |\n";
        let table = parse_table(text)?;
        assert_eq!(table.header, Some(strings(&["姓名", "年龄", "城市"])));
        assert_eq!(
            table.rows,
            vec![strings(&["张三", "28", ""]), strings(&["李四", "", "上海"])]
        );
        Ok(())
    }

    #[test]
    fn test_parse_plain_table() -> anyhow::Result<()> {
        let table = parse_table("name  age\nTom\t30\nAnn   25")?;
        assert_eq!(table.header, Some(strings(&["name", "age"])));
        assert_eq!(table.rows.len(), 2);

        // 前两行列数不同时没有表头
        let table = parse_table("title only\nTom  30")?;
        assert_eq!(table.header, None);
        assert_eq!(table.rows, vec![strings(&["title only"]), strings(&["Tom", "30"])]);
        Ok(())
    }

    #[test]
    fn test_parse_empty_text() -> anyhow::Result<()> {
        assert!(parse_table("  \n\n")?.is_empty());
        assert!(parse_table("|---|---|")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_convert_writes_timestamped_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let now = Local
            .with_ymd_and_hms(2024, 5, 6, 7, 8, 9)
            .single()
            .unwrap_or_else(Local::now);
        let node = MarkdownTableToExcel::new();

        let path = node.convert(dir.path(), "| a | b |\n|---|---|\n| 1 | 2 |", "tables", "", &now)?;
        assert_eq!(
            path,
            dir.path()
                .join("tables")
                .join(format!("table_{}.xlsx", now.format("%Y%m%d_%H%M%S")))
        );
        // xlsx 是 zip 格式
        assert_eq!(&std::fs::read(&path)?[..2], b"PK");

        let result = node.convert(dir.path(), "\n", "tables", "x", &now);
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        Ok(())
    }
}

//! 错误处理

#[allow(unused)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // 标准库错误处理
    #[error("io error, {0}")]
    Io(std::io::Error),
    #[error("parse int error, {0}")]
    ParseIntError(#[from] std::num::ParseIntError),
    #[error("parse float error, {0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),
    #[error("strum error, {0}")]
    ParseEnumString(String),

    #[error("serde json error, {0}")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("regex error, {0}")]
    RegexError(#[from] regex::Error),
    #[error("url parse error, {0}")]
    UrlParseError(#[from] url::ParseError),
    #[error("http error, {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("decode error, {0}")]
    Decode(String),

    #[error("the list is empty")]
    ListEmpty,

    #[error("py error, {0}")]
    PyErr(#[from] pyo3::PyErr),
    #[error("py downcast error, {0}")]
    PyDowncastError(String),

    #[error("tensor error, {0}")]
    TensorErr(#[from] candle_core::Error),
    #[error("invalid tensor shape, {0}")]
    InvalidTensorShape(String),
    #[error("numpy error, {0}")]
    NotContiguousError(#[from] numpy::NotContiguousError),

    #[error("image error, {0}")]
    ImageError(#[from] image::ImageError),

    #[error("invalid directory, {0}")]
    InvalidDirectory(String),
    #[error("invalid parameter, {0}")]
    InvalidParameter(String),
    #[error("file not found, {0}")]
    FileNotFound(String),

    // 抖音下载
    #[error("invalid account link, {0}")]
    InvalidAccountLink(String),
    #[error("cookie is invalid or expired")]
    CredentialsRejected,
    #[error("api error, status_code: {code}, {message}")]
    Api { code: i64, message: String },
    #[error("http status error, {0}")]
    HttpStatus(u16),
    #[error("empty file downloaded, {0}")]
    EmptyDownload(String),
    #[error("a download task is already running")]
    RunInProgress,

    // LUT
    #[error("lut parse error, {0}")]
    LutParse(String),

    // ffmpeg
    #[error("ffmpeg not found, {0}")]
    FfmpegNotFound(String),
    #[error("ffmpeg failed, {0}")]
    FfmpegFailed(String),

    // 表格
    #[error("xlsx error, {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("Failed to obtain semaphore license, {0}")]
    AcquireError(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

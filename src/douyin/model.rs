//! 接口数据结构
//!
//! 第三方接口字段不稳定, 缺失字段取默认值, 数字与字符串均可接受

use log::warn;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// 作品类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwemeKind {
    /// 视频
    Video,
    /// 图集
    Gallery,
    /// 其他类型, 仅保存元数据
    Other(Option<i64>),
}

impl AwemeKind {
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(0) => AwemeKind::Video,
            Some(2) | Some(68) => AwemeKind::Gallery,
            other => AwemeKind::Other(other),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UrlList {
    #[serde(default)]
    pub url_list: Option<Vec<String>>,
}

impl UrlList {
    /// 第一个可用地址
    pub fn first(&self) -> Option<&str> {
        self.url_list
            .as_ref()
            .and_then(|urls| urls.first())
            .map(String::as_str)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub play_addr: Option<UrlList>,
}

/// 作品
#[derive(Debug, Clone, Deserialize)]
pub struct Aweme {
    #[serde(deserialize_with = "string_or_number")]
    pub aweme_id: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub create_time: i64,
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub aweme_type: Option<i64>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub desc: Option<String>,
    #[serde(default)]
    pub statistics: Value,
    #[serde(default)]
    pub author: Value,
    #[serde(default)]
    pub music: Value,
    #[serde(default)]
    pub video: Option<VideoInfo>,
    #[serde(default)]
    pub images: Option<Vec<UrlList>>,
}

impl Aweme {
    pub fn kind(&self) -> AwemeKind {
        AwemeKind::from_code(self.aweme_type)
    }

    pub fn desc(&self) -> &str {
        self.desc.as_deref().unwrap_or_default()
    }

    /// 视频播放地址
    pub fn video_url(&self) -> Option<&str> {
        self.video
            .as_ref()
            .and_then(|video| video.play_addr.as_ref())
            .and_then(UrlList::first)
    }

    /// 图集地址, 保留原始序号
    pub fn image_urls(&self) -> Vec<(usize, &str)> {
        self.images
            .iter()
            .flatten()
            .enumerate()
            .filter_map(|(index, image)| image.first().map(|url| (index, url)))
            .collect()
    }
}

/// 分页游标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(String);

impl Default for Cursor {
    fn default() -> Self {
        Cursor("0".to_string())
    }
}

impl Cursor {
    pub fn new(value: impl Into<String>) -> Self {
        Cursor(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value_to_string(&value) {
            Some(v) if !v.is_empty() => Cursor(v),
            _ => Cursor::default(),
        })
    }
}

/// 作品列表接口的一页响应
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostPage {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub status_code: i64,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub status_msg: Option<String>,
    #[serde(default)]
    pub aweme_list: Option<Vec<Value>>,
    #[serde(default)]
    pub max_cursor: Cursor,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub has_more: i64,
}

impl PostPage {
    pub fn has_more(&self) -> bool {
        self.has_more != 0
    }

    /// 解析作品列表, 无法解析的作品跳过
    pub fn awemes(&self) -> Vec<Aweme> {
        self.aweme_list
            .iter()
            .flatten()
            .filter_map(|item| match serde_json::from_value::<Aweme>(item.clone()) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("skip malformed aweme, {e}");
                    None
                }
            })
            .collect()
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    value_to_string(&value)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| serde::de::Error::custom(format!("expected string or number, {value}")))
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_i64(&value).unwrap_or_default())
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_string(&value))
}

fn lenient_opt_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_i64(&value))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_kind_codes() {
        assert_eq!(AwemeKind::from_code(Some(0)), AwemeKind::Video);
        assert_eq!(AwemeKind::from_code(Some(2)), AwemeKind::Gallery);
        assert_eq!(AwemeKind::from_code(Some(68)), AwemeKind::Gallery);
        assert_eq!(AwemeKind::from_code(Some(51)), AwemeKind::Other(Some(51)));
        assert_eq!(AwemeKind::from_code(None), AwemeKind::Other(None));
    }

    #[test]
    fn test_page_lenient_fields() -> anyhow::Result<()> {
        let page: PostPage = serde_json::from_value(json!({
            "status_code": "0",
            "max_cursor": 1700000000000i64,
            "has_more": "1",
            "aweme_list": [
                {"aweme_id": 7300000000000000001u64, "create_time": "1700000000", "aweme_type": 0,
                 "desc": "hello", "video": {"play_addr": {"url_list": ["https://v/1.mp4"]}}},
                {"aweme_id": "730002", "aweme_type": "68", "desc": null,
                 "images": [{"url_list": ["https://i/1.webp"]}, {"url_list": []}, {"url_list": ["https://i/3.webp"]}]},
                {"desc": "missing id"}
            ]
        }))?;

        assert_eq!(page.status_code, 0);
        assert!(page.has_more());
        assert_eq!(page.max_cursor.as_str(), "1700000000000");

        let awemes = page.awemes();
        assert_eq!(awemes.len(), 2);
        assert_eq!(awemes[0].aweme_id, "7300000000000000001");
        assert_eq!(awemes[0].create_time, 1700000000);
        assert_eq!(awemes[0].video_url(), Some("https://v/1.mp4"));
        assert_eq!(awemes[1].kind(), AwemeKind::Gallery);
        assert_eq!(awemes[1].desc(), "");
        assert_eq!(
            awemes[1].image_urls(),
            vec![(0, "https://i/1.webp"), (2, "https://i/3.webp")]
        );
        Ok(())
    }

    #[test]
    fn test_page_missing_fields() -> anyhow::Result<()> {
        let page: PostPage = serde_json::from_str("{}")?;
        assert_eq!(page.status_code, 0);
        assert!(!page.has_more());
        assert_eq!(page.max_cursor, Cursor::default());
        assert!(page.awemes().is_empty());
        Ok(())
    }
}

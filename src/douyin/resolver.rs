//! 账号解析
//!
//! 分享短链接跳转到主页后, 取路径中 `user/` 之后的一段作为 sec_user_id

use log::debug;
use regex::Regex;
use reqwest::Client;

use crate::{douyin::client::base_headers, error::Error};

/// 从主页地址中提取 sec_user_id
pub fn extract_sec_user_id(url: &str) -> Result<String, Error> {
    let re = Regex::new(r"user/([^/?#]+)")?;
    re.captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| Error::InvalidAccountLink(url.to_string()))
}

/// 跟随跳转并解析账号
pub async fn resolve_account(client: &Client, cookie: &str, link: &str) -> Result<String, Error> {
    let link = link.trim();
    let start = url::Url::parse(link).map_err(|_| Error::InvalidAccountLink(link.to_string()))?;

    let response = client
        .get(start)
        .headers(base_headers(cookie)?)
        .send()
        .await?;
    let final_url = response.url().to_string();
    debug!("account link resolved to {final_url}");

    extract_sec_user_id(&final_url)
}

//! 作品分页抓取

use std::collections::HashSet;

use log::{debug, info, warn};
use reqwest::Client;

use crate::{
    douyin::{
        client::base_headers,
        config::CrawlConfig,
        model::{Aweme, Cursor, PostPage},
    },
    error::Error,
};

/// Cookie 失效时接口返回的状态码
pub const STATUS_CREDENTIALS_REJECTED: i64 = 8;

pub struct PostCrawler {
    client: Client,
    cookie: String,
    config: CrawlConfig,
}

impl PostCrawler {
    pub fn new(client: Client, cookie: impl Into<String>, config: CrawlConfig) -> Self {
        Self {
            client,
            cookie: cookie.into(),
            config,
        }
    }

    /// 请求一页作品
    ///
    /// 状态码 8 返回 `CredentialsRejected`, 其他非 0 状态码返回 `Api`
    pub async fn fetch_page(&self, sec_user_id: &str, cursor: &Cursor) -> Result<PostPage, Error> {
        let page_size = self.config.page_size.to_string();
        let params = [
            ("aid", "6383"),
            ("channel", "channel_pc_web"),
            ("device_platform", "web"),
            ("pc_client_type", "1"),
            ("sec_user_id", sec_user_id),
            ("count", page_size.as_str()),
            ("max_cursor", cursor.as_str()),
        ];

        let response = self
            .client
            .get(&self.config.endpoint)
            .headers(base_headers(&self.cookie)?)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(status.as_u16()));
        }

        let body = response.text().await?;
        let page: PostPage = serde_json::from_str(&body)?;

        match page.status_code {
            0 => Ok(page),
            STATUS_CREDENTIALS_REJECTED => Err(Error::CredentialsRejected),
            code => Err(Error::Api {
                code,
                message: page.status_msg.clone().unwrap_or_default(),
            }),
        }
    }

    /// 抓取最多 max_count 个作品
    ///
    /// 连续失败达到上限后返回已获取的作品, Cookie 失效时立即返回错误.
    /// 结果按 aweme_id 去重
    pub async fn crawl(&self, sec_user_id: &str, max_count: usize) -> Result<Vec<Aweme>, Error> {
        let mut awemes: Vec<Aweme> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut cursor = Cursor::default();
        let mut failures = 0;

        while awemes.len() < max_count && failures < self.config.max_failures {
            tokio::time::sleep(self.config.pacing_delay()).await;

            let page = match self.fetch_page(sec_user_id, &cursor).await {
                Ok(v) => v,
                Err(Error::CredentialsRejected) => return Err(Error::CredentialsRejected),
                Err(e) => {
                    failures += 1;
                    warn!(
                        "fetch page failed ({failures}/{}), cursor: {}, {e}",
                        self.config.max_failures,
                        cursor.as_str()
                    );
                    if failures < self.config.max_failures {
                        tokio::time::sleep(self.config.backoff(failures)).await;
                    }
                    continue;
                }
            };
            failures = 0;

            let batch = page.awemes();
            debug!(
                "fetched {} posts, cursor {} -> {}",
                batch.len(),
                cursor.as_str(),
                page.max_cursor.as_str()
            );
            for aweme in batch {
                if seen.insert(aweme.aweme_id.clone()) {
                    awemes.push(aweme);
                } else {
                    debug!("skip duplicate post {}", aweme.aweme_id);
                }
            }

            if !page.has_more() {
                break;
            }
            if !cursor_advanced(&cursor, &page.max_cursor) {
                warn!(
                    "cursor did not advance ({} -> {}), stop crawling",
                    cursor.as_str(),
                    page.max_cursor.as_str()
                );
                break;
            }
            cursor = page.max_cursor;
        }

        if failures >= self.config.max_failures {
            warn!("too many consecutive failures, return {} posts", awemes.len());
        }

        awemes.truncate(max_count);
        info!("crawled {} posts", awemes.len());
        Ok(awemes)
    }
}

/// 游标原样返回, 或在首页之后退回默认值, 都视为未前进
fn cursor_advanced(current: &Cursor, next: &Cursor) -> bool {
    if next == current {
        return false;
    }
    !(*next == Cursor::default() && *current != Cursor::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_advanced() {
        let first = Cursor::default();
        let second = Cursor::new("100");
        assert!(cursor_advanced(&first, &second));
        assert!(!cursor_advanced(&first, &first));
        assert!(!cursor_advanced(&second, &second));
        assert!(!cursor_advanced(&second, &first));
    }
}

use std::path::PathBuf;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use comfyui_creator_kit::{core::hub::HubFetcher, error::Error};

const REPO_PATH: &str = "liguanwei/luts/resolve/main/film.cube";

async fn fetch(endpoints: Vec<String>, dest: PathBuf) -> anyhow::Result<Result<PathBuf, Error>> {
    // blocking 客户端不能在异步运行时线程中使用
    let result = tokio::task::spawn_blocking(move || {
        HubFetcher::with_endpoints(endpoints).and_then(|fetcher| fetcher.fetch(REPO_PATH, &dest))
    })
    .await?;
    Ok(result)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_falls_back_to_mirror() -> anyhow::Result<()> {
    let primary = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/{REPO_PATH}")))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&primary)
        .await;
    let mirror = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/{REPO_PATH}")))
        .respond_with(ResponseTemplate::new(200).set_body_string("LUT_1D_SIZE 2\n0 0 0\n1 1 1\n"))
        .expect(1)
        .mount(&mirror)
        .await;

    let dir = tempfile::tempdir()?;
    let dest = dir.path().join("luts").join("film.cube");
    let saved = fetch(vec![primary.uri(), mirror.uri()], dest.clone()).await??;

    assert_eq!(saved, dest);
    assert!(std::fs::read_to_string(&dest)?.starts_with("LUT_1D_SIZE 2"));
    assert!(!dir.path().join("luts").join("film.cube.part").exists());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_all_endpoints_fail() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let dest = dir.path().join("film.cube");
    let result = fetch(vec![server.uri(), server.uri()], dest.clone()).await?;

    assert!(matches!(result, Err(Error::HttpStatus(404))));
    assert!(!dest.exists());
    Ok(())
}

/// 声明 64 字节但只发送部分内容就断开连接
async fn truncated_server() -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let response = "HTTP/1.1 200 OK\r\nContent-Length: 64\r\n\r\nLUT_1D";
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    Ok(format!("http://{addr}"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_truncated_body_removes_part_file() -> anyhow::Result<()> {
    let base = truncated_server().await?;

    let dir = tempfile::tempdir()?;
    let dest = dir.path().join("film.cube");
    let result = fetch(vec![base], dest.clone()).await?;

    assert!(result.is_err());
    assert!(!dest.exists());
    assert!(!dir.path().join("film.cube.part").exists());
    Ok(())
}

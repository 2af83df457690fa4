//! GitHub 仓库文档存储
//!
//! 使用 GitHub REST API 把仓库当作版本化文档存储：
//! - 单文件读写走 contents API，版本号为 blob sha
//! - 批量提交走 git data API：blob → tree → commit → 快进更新分支引用，
//!   引用更新失败时整个提交不生效
//!
//! 状态码映射：404 → 不存在，409/422 → 版本冲突，401/403/5xx → 瞬时错误，429 → 限流。

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::{is_direct_child, BatchFile, CommitId, DocumentStore, ExpectedVersion, StoredDocument, VersionToken};
use crate::config::HttpClientConfig;
use crate::error::{LeaderboardSyncError, Result};

/// GitHub 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubStoreConfig {
    /// API 基础地址，默认 https://api.github.com
    pub api_base_url: String,
    /// 仓库，形如 owner/name
    pub repo: String,
    pub branch: String,
    /// 访问令牌
    pub token: String,
}

impl Default for GitHubStoreConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            repo: String::new(),
            branch: "main".to_string(),
            token: String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentsFile {
    #[serde(default)]
    content: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: ShaOnly,
}

#[derive(Debug, Deserialize)]
struct ShaOnly {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: ShaOnly,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
    tree: ShaOnly,
}

/// GitHub contents 存储
pub struct GitHubContentsStore {
    client: Client,
    config: GitHubStoreConfig,
}

impl GitHubContentsStore {
    pub fn new(config: GitHubStoreConfig, http: &HttpClientConfig) -> Result<Self> {
        let mut builder = Client::builder().user_agent(concat!("leaderboard-sync/", env!("CARGO_PKG_VERSION")));

        if let Some(timeout) = http.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }

        if let Some(timeout) = http.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| LeaderboardSyncError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        info!("✅ GitHub 存储已创建 (repo: {}, branch: {})", config.repo, config.branch);

        Ok(Self { client, config })
    }

    fn repo_url(&self, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.repo.trim(),
            suffix
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", format!("token {}", self.config.token))
            .header("Accept", "application/vnd.github.v3+json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        self.authorized(request)
            .send()
            .await
            .map_err(|e| LeaderboardSyncError::Transient(format!("GitHub 请求失败: {}", e)))
    }

    /// 在指定 ref 上读取文件
    async fn read_at(&self, path: &str, git_ref: &str) -> Result<Option<StoredDocument>> {
        let url = self.repo_url(&format!("contents/{}", path));
        let response = self.send(self.client.get(&url).query(&[("ref", git_ref)])).await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("GitHub 文件不存在: {}", path);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(status, path, response).await);
        }

        let body: serde_json::Value = response.json().await?;
        if body.is_array() {
            return Err(LeaderboardSyncError::data_format(path, "path is a directory"));
        }
        let file: ContentsFile =
            serde_json::from_value(body).map_err(|e| LeaderboardSyncError::data_format(path, e))?;

        let cleaned: String = file.content.chars().filter(|c| !c.is_whitespace()).collect();
        let content = STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|e| LeaderboardSyncError::data_format(path, format!("base64 解码失败: {}", e)))?;

        Ok(Some(StoredDocument {
            content: Bytes::from(content),
            version: VersionToken::new(file.sha),
        }))
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(&self, suffix: &str, body: serde_json::Value) -> Result<T> {
        let response = self.send(self.client.post(self.repo_url(suffix)).json(&body)).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, suffix, response).await);
        }
        Ok(response.json().await?)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, suffix: &str) -> Result<T> {
        let response = self.send(self.client.get(self.repo_url(suffix))).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, suffix, response).await);
        }
        Ok(response.json().await?)
    }
}

/// 非 2xx 响应转换为错误
async fn status_error(status: StatusCode, path: &str, response: Response) -> LeaderboardSyncError {
    let body = response.text().await.unwrap_or_default();
    error!("❌ GitHub 请求失败: path={}, status={}, body={}", path, status, body);

    match status {
        StatusCode::NOT_FOUND => LeaderboardSyncError::NotFound(path.to_string()),
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => LeaderboardSyncError::VersionConflict {
            path: path.to_string(),
            expected: None,
            actual: None,
        },
        StatusCode::TOO_MANY_REQUESTS => LeaderboardSyncError::RateLimited(format!("{}: {}", path, body)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LeaderboardSyncError::Transient(format!("认证失败 ({}): {}", status, path))
        }
        s if s.is_server_error() => LeaderboardSyncError::Transient(format!("服务端错误 ({}): {}", s, path)),
        s => LeaderboardSyncError::Storage(format!("GitHub 返回 {}: {} ({})", s, path, body)),
    }
}

#[async_trait]
impl DocumentStore for GitHubContentsStore {
    async fn read(&self, path: &str) -> Result<Option<StoredDocument>> {
        self.read_at(path, &self.config.branch).await
    }

    async fn write(
        &self,
        path: &str,
        content: Bytes,
        expected: ExpectedVersion,
        message: &str,
    ) -> Result<VersionToken> {
        let sha = match &expected {
            ExpectedVersion::Exact(v) => Some(v.as_str().to_string()),
            ExpectedVersion::Absent => None,
            // 不可变文件覆盖写：需要当前 sha 才能更新
            ExpectedVersion::Any => self.read(path).await?.map(|d| d.version.as_str().to_string()),
        };

        let mut body = json!({
            "message": message,
            "content": STANDARD.encode(&content),
            "branch": self.config.branch,
        });
        if let Some(sha) = sha {
            body["sha"] = json!(sha);
        }

        let url = self.repo_url(&format!("contents/{}", path));
        let response = self.send(self.client.put(&url).json(&body)).await?;
        let status = response.status();
        if !status.is_success() {
            return match status_error(status, path, response).await {
                LeaderboardSyncError::VersionConflict { path, .. } => Err(LeaderboardSyncError::VersionConflict {
                    path,
                    expected: expected.token(),
                    actual: None,
                }),
                other => Err(other),
            };
        }

        let put: PutContentsResponse = response.json().await?;
        debug!("GitHub 写入完成: {} -> {}", path, put.content.sha);
        Ok(VersionToken::new(put.content.sha))
    }

    async fn batch_write(&self, files: Vec<BatchFile>, message: &str) -> Result<CommitId> {
        let branch = self.config.branch.clone();
        let head: RefResponse = self.get_json(&format!("git/ref/heads/{}", branch)).await?;
        let base_commit: CommitResponse = self.get_json(&format!("git/commits/{}", head.object.sha)).await?;

        // 在提交基准上校验版本号
        for file in &files {
            if file.expected == ExpectedVersion::Any {
                continue;
            }
            let current = self.read_at(&file.path, &head.object.sha).await?;
            if !file.expected.admits(current.as_ref().map(|d| &d.version)) {
                warn!("批量提交版本校验失败: {}", file.path);
                return Err(LeaderboardSyncError::VersionConflict {
                    path: file.path.clone(),
                    expected: file.expected.token(),
                    actual: current.map(|d| d.version),
                });
            }
        }

        let mut tree = Vec::with_capacity(files.len());
        for file in &files {
            let blob: ShaOnly = self
                .post_json(
                    "git/blobs",
                    json!({ "content": STANDARD.encode(&file.content), "encoding": "base64" }),
                )
                .await?;
            tree.push(json!({ "path": file.path, "mode": "100644", "type": "blob", "sha": blob.sha }));
        }

        let new_tree: ShaOnly = self
            .post_json("git/trees", json!({ "base_tree": base_commit.tree.sha, "tree": tree }))
            .await?;
        let commit: ShaOnly = self
            .post_json(
                "git/commits",
                json!({ "message": message, "tree": new_tree.sha, "parents": [base_commit.sha] }),
            )
            .await?;

        // 非快进更新会被拒绝（422），说明分支在此期间被推进
        let ref_path = format!("git/refs/heads/{}", branch);
        let response = self
            .send(
                self.client
                    .patch(self.repo_url(&ref_path))
                    .json(&json!({ "sha": commit.sha, "force": false })),
            )
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &ref_path, response).await);
        }

        info!("✅ GitHub 批量提交完成: {} 个文件, commit={}", files.len(), commit.sha);
        Ok(CommitId(commit.sha))
    }

    /// 通过递归 tree 列目录；contents API 的目录列表最多返回 1000 项
    async fn list(&self, dir: &str) -> Result<Vec<String>> {
        let dir = dir.trim_end_matches('/');
        let head: RefResponse = match self.get_json(&format!("git/ref/heads/{}", self.config.branch)).await {
            Ok(head) => head,
            Err(LeaderboardSyncError::NotFound(_)) => {
                debug!("分支不存在，目录为空: {}", self.config.branch);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        let commit: CommitResponse = self.get_json(&format!("git/commits/{}", head.object.sha)).await?;
        let tree: TreeResponse = self
            .get_json(&format!("git/trees/{}?recursive=1", commit.tree.sha))
            .await?;

        if tree.truncated {
            warn!("⚠️ GitHub tree 列表被截断，部分文件可能未列出: {}", dir);
        }

        Ok(tree
            .tree
            .into_iter()
            .filter(|e| e.kind == "blob" && e.path.ends_with(".json") && is_direct_child(dir, &e.path))
            .map(|e| e.path)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use httpmock::Method::PATCH;

    fn store_for(server: &MockServer) -> GitHubContentsStore {
        let config = GitHubStoreConfig {
            api_base_url: server.base_url(),
            repo: "owner/stats".to_string(),
            branch: "main".to_string(),
            token: "secret".to_string(),
        };
        GitHubContentsStore::new(config, &HttpClientConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_read_decodes_content_and_sha() {
        let server = MockServer::start_async().await;
        let encoded = STANDARD.encode(br#"{"players":[]}"#);
        // GitHub 返回的 base64 带换行
        let wrapped = format!("{}\n{}", &encoded[..8], &encoded[8..]);

        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/repos/owner/stats/contents/src/user.json")
                    .query_param("ref", "main")
                    .header("authorization", "token secret");
                then.status(200).json_body(json!({ "content": wrapped, "sha": "abc123", "type": "file" }));
            })
            .await;

        let store = store_for(&server);
        let doc = store.read("src/user.json").await.unwrap().unwrap();
        assert_eq!(&doc.content[..], br#"{"players":[]}"#);
        assert_eq!(doc.version, VersionToken::new("abc123"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_read_missing_and_auth_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/owner/stats/contents/src/leaderboard.json");
                then.status(404).json_body(json!({ "message": "Not Found" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/owner/stats/contents/src/user.json");
                then.status(401).json_body(json!({ "message": "Bad credentials" }));
            })
            .await;

        let store = store_for(&server);
        assert!(store.read("src/leaderboard.json").await.unwrap().is_none());
        assert!(store.read("src/user.json").await.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_write_conflict_carries_expected_version() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/repos/owner/stats/contents/src/user.json")
                    .json_body_partial(r#"{ "sha": "stale", "branch": "main" }"#);
                then.status(409).json_body(json!({ "message": "does not match" }));
            })
            .await;

        let store = store_for(&server);
        let err = store
            .write(
                "src/user.json",
                Bytes::from_static(b"{}"),
                ExpectedVersion::Exact(VersionToken::new("stale")),
                "update",
            )
            .await
            .unwrap_err();

        match err {
            LeaderboardSyncError::VersionConflict { expected, .. } => {
                assert_eq!(expected, Some(VersionToken::new("stale")));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_walks_recursive_tree() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/owner/stats/git/ref/heads/main");
                then.status(200).json_body(json!({ "object": { "sha": "head" } }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/owner/stats/git/commits/head");
                then.status(200).json_body(json!({ "sha": "head", "tree": { "sha": "root" } }));
            })
            .await;
        let tree_mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/repos/owner/stats/git/trees/root")
                    .query_param("recursive", "1");
                then.status(200).json_body(json!({
                    "sha": "root",
                    "truncated": false,
                    "tree": [
                        { "path": "src", "type": "tree" },
                        { "path": "src/user.json", "type": "blob" },
                        { "path": "src/match", "type": "tree" },
                        { "path": "src/match/m1.json", "type": "blob" },
                        { "path": "src/match/m2.json", "type": "blob" },
                        { "path": "src/match/README.md", "type": "blob" },
                        { "path": "src/match/old.json", "type": "tree" },
                        { "path": "src/match/old.json/m0.json", "type": "blob" }
                    ]
                }));
            })
            .await;

        let store = store_for(&server);
        assert_eq!(
            store.list("src/match/").await.unwrap(),
            vec!["src/match/m1.json".to_string(), "src/match/m2.json".to_string()]
        );
        tree_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_on_missing_branch_is_empty() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/owner/stats/git/ref/heads/main");
                then.status(404).json_body(json!({ "message": "Not Found" }));
            })
            .await;

        let store = store_for(&server);
        assert!(store.list("src/match").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_write_builds_commit_and_fast_forwards_ref() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/owner/stats/git/ref/heads/main");
                then.status(200).json_body(json!({ "object": { "sha": "base" } }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/owner/stats/git/commits/base");
                then.status(200).json_body(json!({ "sha": "base", "tree": { "sha": "tree0" } }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/repos/owner/stats/contents/src/user.json")
                    .query_param("ref", "base");
                then.status(200).json_body(json!({ "content": STANDARD.encode(b"{}"), "sha": "u1" }));
            })
            .await;
        let blobs = server
            .mock_async(|when, then| {
                when.method(POST).path("/repos/owner/stats/git/blobs");
                then.status(201).json_body(json!({ "sha": "blob" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/repos/owner/stats/git/trees")
                    .json_body_partial(r#"{ "base_tree": "tree0" }"#);
                then.status(201).json_body(json!({ "sha": "tree1" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/repos/owner/stats/git/commits")
                    .json_body_partial(r#"{ "tree": "tree1", "parents": ["base"] }"#);
                then.status(201).json_body(json!({ "sha": "commit1" }));
            })
            .await;
        let update_ref = server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/repos/owner/stats/git/refs/heads/main")
                    .json_body_partial(r#"{ "sha": "commit1", "force": false }"#);
                then.status(200).json_body(json!({ "object": { "sha": "commit1" } }));
            })
            .await;

        let store = store_for(&server);
        let files = vec![
            BatchFile::new("src/user.json", "{\"players\":[]}", ExpectedVersion::Exact(VersionToken::new("u1"))),
            BatchFile::new("src/match/m1.json", "{}", ExpectedVersion::Any),
        ];
        let commit = store.batch_write(files, "Update match data: 1 new matches").await.unwrap();

        assert_eq!(commit, CommitId("commit1".to_string()));
        blobs.assert_hits_async(2).await;
        update_ref.assert_async().await;
    }

    #[tokio::test]
    async fn test_batch_write_rejects_stale_version_before_committing() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/owner/stats/git/ref/heads/main");
                then.status(200).json_body(json!({ "object": { "sha": "base" } }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/owner/stats/git/commits/base");
                then.status(200).json_body(json!({ "sha": "base", "tree": { "sha": "tree0" } }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/owner/stats/contents/src/user.json");
                then.status(200).json_body(json!({ "content": STANDARD.encode(b"{}"), "sha": "newer" }));
            })
            .await;
        let blobs = server
            .mock_async(|when, then| {
                when.method(POST).path("/repos/owner/stats/git/blobs");
                then.status(201).json_body(json!({ "sha": "blob" }));
            })
            .await;

        let store = store_for(&server);
        let files = vec![BatchFile::new(
            "src/user.json",
            "{}",
            ExpectedVersion::Exact(VersionToken::new("u1")),
        )];
        let err = store.batch_write(files, "update").await.unwrap_err();

        assert!(err.is_conflict());
        blobs.assert_hits_async(0).await;
    }
}

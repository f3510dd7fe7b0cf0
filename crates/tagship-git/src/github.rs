//! GitHub backend over the REST git-data API.
//!
//! Every release object is created server side: blobs, trees, commits and
//! references. Calls go through an async [`reqwest::Client`] driven by a
//! runtime owned by the store, so the store itself stays synchronous.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::runtime::Runtime;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::{
    CommitInfo, FileMode, GitError, GitResult, HEADS_NAMESPACE, NewCommit, NotesProvider,
    ObjectId, ObjectStore, TagRef, TagSource, Tree, TreeEntry, TreeOverlay, tag_ref,
};

/// Default API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";
const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_RAW: &str = "application/vnd.github.raw+json";

/// A repository hosted on GitHub.
pub struct GithubStore {
    client: Client,
    runtime: Runtime,
    api_url: String,
    repository: String,
    token: String,
}

/// Builder for [`GithubStore`].
#[derive(Debug)]
pub struct GithubStoreBuilder {
    repository: String,
    token: String,
    api_url: String,
    timeout: Duration,
}

impl GithubStoreBuilder {
    /// Sets the API endpoint (GitHub Enterprise).
    #[must_use]
    pub fn api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the runtime cannot be created.
    pub fn build(self) -> GitResult<GithubStore> {
        let client = Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(self.timeout)
            .build()?;
        let runtime = Runtime::new()?;

        Ok(GithubStore {
            client,
            runtime,
            api_url: self.api_url.trim_end_matches('/').to_string(),
            repository: self.repository,
            token: self.token,
        })
    }
}

// Response bodies.

#[derive(Debug, Deserialize)]
struct Sha {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RefBody {
    object: Sha,
}

#[derive(Debug, Deserialize)]
struct MatchingRef {
    #[serde(rename = "ref")]
    name: String,
    object: Sha,
}

#[derive(Debug, Deserialize)]
struct CommitBody {
    sha: String,
    tree: Sha,
    parents: Vec<Sha>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct TreeBody {
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    mode: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GeneratedNotes {
    body: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

// Request bodies.

#[derive(Debug, Serialize)]
struct CreateBlob {
    content: String,
    encoding: &'static str,
}

impl CreateBlob {
    fn new(content: &[u8]) -> Self {
        Self {
            content: BASE64.encode(content),
            encoding: "base64",
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateTree<'a> {
    base_tree: &'a str,
    tree: Vec<CreateTreeItem<'a>>,
}

#[derive(Debug, Serialize)]
struct CreateTreeItem<'a> {
    path: &'a str,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    sha: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateCommit<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<Author<'a>>,
}

#[derive(Debug, Serialize)]
struct Author<'a> {
    name: &'a str,
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateRef<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Debug, Serialize)]
struct CreateRef<'a> {
    #[serde(rename = "ref")]
    name: &'a str,
    sha: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerateNotes<'a> {
    tag_name: &'a str,
    target_commitish: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_tag_name: Option<&'a str>,
}

/// Strips the `refs/` prefix, as the `git/ref` endpoints expect.
fn ref_path(reference: &str) -> &str {
    reference.strip_prefix("refs/").unwrap_or(reference)
}

/// Builds an API error from a failed response body.
fn api_error(status: StatusCode, body: &str) -> GitError {
    let message = serde_json::from_str::<ApiMessage>(body)
        .map(|m| m.message)
        .unwrap_or_else(|_| body.trim().to_string());
    GitError::Api {
        status: status.as_u16(),
        message,
    }
}

async fn checked(response: Response) -> GitResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(api_error(status, &body))
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> GitResult<T> {
    let response = checked(request.send().await?).await?;
    Ok(response.json().await?)
}

impl GithubStore {
    /// Creates a builder for `owner/repo` authenticated with `token`.
    #[must_use]
    pub fn builder(repository: impl Into<String>, token: impl Into<String>) -> GithubStoreBuilder {
        GithubStoreBuilder {
            repository: repository.into(),
            token: token.into(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Returns the `owner/repo` slug.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    fn url(&self, path: &str) -> String {
        format!("{}/repos/{}/{path}", self.api_url, self.repository)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.token)
            .header("Accept", ACCEPT_JSON)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.request(reqwest::Method::GET, path)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.request(reqwest::Method::POST, path)
    }

    async fn fetch_ref(&self, reference: &str) -> GitResult<ObjectId> {
        let path = format!("git/ref/{}", ref_path(reference));
        let response = self.get(&path).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(GitError::RefNotFound(reference.to_string()));
        }
        let body: RefBody = checked(response).await?.json().await?;
        Ok(ObjectId::new(body.object.sha))
    }

    async fn fetch_commit(&self, id: &ObjectId) -> GitResult<CommitInfo> {
        let response = self.get(&format!("git/commits/{id}")).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(GitError::ObjectNotFound(id.to_string()));
        }
        let body: CommitBody = checked(response).await?.json().await?;
        Ok(CommitInfo {
            id: ObjectId::new(body.sha),
            tree: ObjectId::new(body.tree.sha),
            parents: body
                .parents
                .into_iter()
                .map(|p| ObjectId::new(p.sha))
                .collect(),
            message: body.message,
        })
    }

    async fn fetch_tree(&self, id: &ObjectId) -> GitResult<Tree> {
        let response = self
            .get(&format!("git/trees/{id}"))
            .query(&[("recursive", "1")])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(GitError::ObjectNotFound(id.to_string()));
        }
        let body: TreeBody = checked(response).await?.json().await?;
        if body.truncated {
            warn!(tree = %id, "tree listing was truncated by the API");
        }

        let entries = body
            .tree
            .into_iter()
            .filter(|item| item.kind == "blob")
            .filter_map(|item| {
                let mode = FileMode::from_octal(&item.mode)?;
                Some((
                    item.path,
                    TreeEntry {
                        mode,
                        id: ObjectId::new(item.sha),
                    },
                ))
            })
            .collect();
        Ok(Tree::new(entries))
    }

    async fn fetch_file(&self, commit: &ObjectId, path: &str) -> GitResult<Option<Vec<u8>>> {
        let response = self
            .get(&format!("contents/{path}"))
            .header("Accept", ACCEPT_RAW)
            .query(&[("ref", commit.as_str())])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let bytes = checked(response).await?.bytes().await?;
        Ok(Some(bytes.to_vec()))
    }

    async fn move_ref(
        &self,
        reference: &str,
        expected: &ObjectId,
        target: &ObjectId,
    ) -> GitResult<()> {
        let current = self.fetch_ref(reference).await?;
        if &current != expected {
            return Err(GitError::RefConflict {
                reference: reference.to_string(),
                expected: expected.clone(),
                actual: current.to_string(),
            });
        }

        // A non fast-forward update is rejected since the new commit's only
        // parent is `expected`.
        let response = self
            .request(
                reqwest::Method::PATCH,
                &format!("git/refs/{}", ref_path(reference)),
            )
            .json(&UpdateRef {
                sha: target.as_str(),
                force: false,
            })
            .send()
            .await?;

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let actual = self
                .fetch_ref(reference)
                .await
                .map_or_else(|_| "unknown".to_string(), |id| id.to_string());
            return Err(GitError::RefConflict {
                reference: reference.to_string(),
                expected: expected.clone(),
                actual,
            });
        }
        checked(response).await?;
        Ok(())
    }

    async fn push_tag(&self, tag: &str, target: &ObjectId) -> GitResult<()> {
        let name = tag_ref(tag);
        let response = self
            .post("git/refs")
            .json(&CreateRef {
                name: &name,
                sha: target.as_str(),
            })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            let body = response.text().await.unwrap_or_default();
            let err = api_error(status, &body);
            if let GitError::Api { message, .. } = &err
                && message.to_ascii_lowercase().contains("already exists")
            {
                return Err(GitError::TagAlreadyExists(tag.to_string()));
            }
            return Err(err);
        }
        checked(response).await?;
        Ok(())
    }
}

impl ObjectStore for GithubStore {
    fn resolve_ref(&self, reference: &str) -> GitResult<ObjectId> {
        self.runtime.block_on(self.fetch_ref(reference))
    }

    fn read_commit(&self, id: &ObjectId) -> GitResult<CommitInfo> {
        self.runtime.block_on(self.fetch_commit(id))
    }

    fn read_tree(&self, id: &ObjectId) -> GitResult<Tree> {
        self.runtime.block_on(self.fetch_tree(id))
    }

    fn read_file(&self, commit: &ObjectId, path: &str) -> GitResult<Option<Vec<u8>>> {
        self.runtime.block_on(self.fetch_file(commit, path))
    }

    fn create_blob(&self, content: &[u8]) -> GitResult<ObjectId> {
        let request = self.post("git/blobs").json(&CreateBlob::new(content));
        let created: Sha = self.runtime.block_on(send_json(request))?;
        Ok(ObjectId::new(created.sha))
    }

    fn create_blobs(&self, contents: &[&[u8]]) -> GitResult<Vec<ObjectId>> {
        let requests: Vec<RequestBuilder> = contents
            .iter()
            .map(|content| self.post("git/blobs").json(&CreateBlob::new(content)))
            .collect();

        self.runtime.block_on(async move {
            let mut uploads = JoinSet::new();
            for (index, request) in requests.into_iter().enumerate() {
                uploads.spawn(async move { (index, send_json::<Sha>(request).await) });
            }

            let mut ids = vec![None; contents.len()];
            while let Some(joined) = uploads.join_next().await {
                let (index, created) = joined.map_err(|e| GitError::Io(e.into()))?;
                ids[index] = Some(ObjectId::new(created?.sha));
            }
            debug!(blobs = ids.len(), "blobs uploaded");

            ids.into_iter()
                .enumerate()
                .map(|(index, id)| {
                    id.ok_or_else(|| GitError::ObjectNotFound(format!("blob #{index}")))
                })
                .collect()
        })
    }

    fn create_tree(&self, base: &ObjectId, overlay: &TreeOverlay) -> GitResult<ObjectId> {
        let body = CreateTree {
            base_tree: base.as_str(),
            tree: overlay
                .entries()
                .iter()
                .map(|(path, entry)| CreateTreeItem {
                    path,
                    mode: entry.mode.as_octal(),
                    kind: "blob",
                    sha: entry.id.as_str(),
                })
                .collect(),
        };
        let request = self.post("git/trees").json(&body);
        let created: Sha = self.runtime.block_on(send_json(request))?;
        Ok(ObjectId::new(created.sha))
    }

    fn create_commit(&self, commit: &NewCommit) -> GitResult<ObjectId> {
        let body = CreateCommit {
            message: &commit.message,
            tree: commit.tree.as_str(),
            parents: commit.parents.iter().map(ObjectId::as_str).collect(),
            author: commit.author.as_ref().map(|a| Author {
                name: &a.name,
                email: &a.email,
            }),
        };
        let request = self.post("git/commits").json(&body);
        let created: Sha = self.runtime.block_on(send_json(request))?;
        Ok(ObjectId::new(created.sha))
    }

    fn update_ref(
        &self,
        reference: &str,
        expected: &ObjectId,
        target: &ObjectId,
    ) -> GitResult<()> {
        self.runtime
            .block_on(self.move_ref(reference, expected, target))
    }

    fn create_tag(&self, tag: &str, target: &ObjectId) -> GitResult<()> {
        self.runtime.block_on(self.push_tag(tag, target))
    }
}

impl TagSource for GithubStore {
    /// Lists tags starting with `v`. Annotated tags report the tag object id.
    fn list_tags(&self) -> GitResult<Vec<TagRef>> {
        let request = self.get("git/matching-refs/tags/v");
        let refs: Vec<MatchingRef> = self.runtime.block_on(send_json(request))?;
        Ok(refs
            .into_iter()
            .map(|r| TagRef::new(r.name, ObjectId::new(r.object.sha)))
            .collect())
    }
}

impl NotesProvider for GithubStore {
    fn generate_notes(
        &self,
        tag: &str,
        previous_tag: Option<&str>,
        target: &str,
    ) -> GitResult<String> {
        let body = GenerateNotes {
            tag_name: tag,
            target_commitish: target.strip_prefix(HEADS_NAMESPACE).unwrap_or(target),
            previous_tag_name: previous_tag,
        };
        let request = self.post("releases/generate-notes").json(&body);
        let notes: GeneratedNotes = self.runtime.block_on(send_json(request))?;
        Ok(notes.body)
    }
}

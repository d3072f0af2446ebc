// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Lincoln Beet Converter Contributors. All Rights Reserved.

use crate::{
    Error,
    acquire::FileStore,
    api::{DatasetID, DatasetInfo, ImageID, ImageInfo, ProjectID, ProjectInfo, TeamID, WorkspaceID},
    dataset::{Annotation, ProjectMeta},
    retry::{create_retry_policy, log_retry_configuration, timeout},
    uploader::Uploader,
};
use base64::Engine as _;
use futures::StreamExt as _;
use log::{Level, debug, error, log_enabled, trace};
use reqwest::{
    Body,
    multipart::{Form, Part},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use sha2::{Digest as _, Sha256};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt as _,
    sync::mpsc::Sender,
};
use tokio_util::codec::{BytesCodec, FramedRead};
use url::Url;

const API_PATH: &str = "public/api/v3";
const USER_AGENT: &str = "Lincoln Beet Converter";

/// Progress information for long-running operations.
///
/// Sent through a `tokio::sync::mpsc::Sender` while downloads and uploads
/// run. Downloads count bytes, the conversion counts images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Current number of completed items.
    pub current: usize,
    /// Total number of items to process.
    pub total: usize,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    #[serde(default)]
    details: Option<ErrorDetails>,
}

#[derive(Deserialize)]
struct ErrorDetails {
    message: Option<String>,
}

#[derive(Deserialize)]
struct FileStorageInfo {
    #[serde(default)]
    size: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewImage<'a> {
    name: &'a str,
    hash: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageAnnotation<'a> {
    image_id: ImageID,
    annotation: &'a Annotation,
}

/// Content hash the platform identifies uploaded images by: base64 encoded
/// SHA-256 of the file contents.
pub fn image_hash(contents: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(Sha256::digest(contents))
}

/// Client for the dataset platform web API.
///
/// Every method is a `POST {server}/public/api/v3/{method}` authenticated
/// with the `x-api-key` header. Project, dataset and annotation calls carry
/// JSON; image uploads are multipart; team file downloads are streamed.
///
/// ```rust,no_run
/// use lincoln_beet::{Client, Error};
///
/// # fn main() -> Result<(), Error> {
/// let client = Client::new("https://app.example.com")?
///     .with_token("secret")?
///     .with_team(7.into());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    url: String,
    token: String,
    team_id: Option<TeamID>,
}

impl Client {
    /// Creates a client for the platform at `server`, without credentials.
    pub fn new(server: &str) -> Result<Self, Error> {
        log_retry_configuration();

        let url = Url::parse(server)?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .retry(create_retry_policy())
            .build()?;

        Ok(Client {
            http,
            url: url.as_str().trim_end_matches('/').to_owned(),
            token: String::new(),
            team_id: None,
        })
    }

    /// Returns a new client pointed at another server with the same
    /// credentials.
    pub fn with_server(&self, server: &str) -> Result<Self, Error> {
        let url = Url::parse(server)?;
        Ok(Client {
            url: url.as_str().trim_end_matches('/').to_owned(),
            ..self.clone()
        })
    }

    /// Returns a new client authenticated with the API token.
    pub fn with_token(&self, token: &str) -> Result<Self, Error> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::EmptyToken);
        }
        Ok(Client {
            token: token.to_owned(),
            ..self.clone()
        })
    }

    /// Returns a new client whose team files are accessed through `team_id`.
    pub fn with_team(&self, team_id: TeamID) -> Self {
        Client {
            team_id: Some(team_id),
            ..self.clone()
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn team_id(&self) -> Option<TeamID> {
        self.team_id
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}/{}", self.url, API_PATH, method)
    }

    fn require_team(&self) -> Result<TeamID, Error> {
        self.team_id.ok_or_else(|| {
            Error::InvalidParameters("a team id is required to access team files".to_owned())
        })
    }

    fn post(&self, method: &str) -> Result<reqwest::RequestBuilder, Error> {
        if self.token.is_empty() {
            return Err(Error::EmptyToken);
        }
        Ok(self
            .http
            .post(self.method_url(method))
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .header("x-api-key", &self.token))
    }

    /// Calls an API method with JSON parameters and decodes the JSON result.
    ///
    /// NOTE: the higher-level [`Uploader`] and [`FileStore`] methods should
    /// normally be used instead.
    pub async fn rpc<Params, RpcResult>(
        &self,
        method: &str,
        params: &Params,
    ) -> Result<RpcResult, Error>
    where
        Params: Serialize,
        RpcResult: DeserializeOwned,
    {
        if log_enabled!(Level::Trace) {
            trace!(
                "RPC Request {}: {}",
                method,
                serde_json::ser::to_string_pretty(params)?
            );
        }

        let res = self.post(method)?.json(params).send().await?;
        self.process_response(res).await
    }

    /// Sends a multipart form to an API method, discarding the result.
    pub async fn post_multipart(&self, method: &str, form: Form) -> Result<(), Error> {
        let res = self.post(method)?.multipart(form).send().await?;
        let _: serde_json::Value = self.process_response(res).await?;
        Ok(())
    }

    async fn process_response<RpcResult>(&self, res: reqwest::Response) -> Result<RpcResult, Error>
    where
        RpcResult: DeserializeOwned,
    {
        let status = res.status();
        let body = res.bytes().await?;

        if log_enabled!(Level::Trace) {
            trace!("RPC Response: {}", String::from_utf8_lossy(&body));
        }

        if !status.is_success() {
            return Err(error_from_body(status.as_u16(), &body));
        }

        match serde_json::from_slice(&body) {
            Ok(result) => Ok(result),
            Err(err) => {
                error!("Invalid JSON Response: {}", String::from_utf8_lossy(&body));
                Err(err.into())
            }
        }
    }

    async fn upload_part(path: &Path, name: &str) -> Result<(String, Part), Error> {
        let contents = fs::read(path).await?;
        let hash = image_hash(&contents);
        let length = contents.len() as u64;
        drop(contents);

        let file = File::open(path).await?;
        let stream = FramedRead::new(file, BytesCodec::new());
        let part = Part::stream_with_length(Body::wrap_stream(stream), length)
            .file_name(name.to_owned())
            .mime_str("application/octet-stream")?;
        Ok((hash, part))
    }
}

fn error_from_body(status: u16, body: &[u8]) -> Error {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|e| e.details.and_then(|d| d.message).or(e.error))
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
    Error::RpcError(status, message)
}

impl Uploader for Client {
    async fn create_project(
        &self,
        workspace_id: WorkspaceID,
        name: &str,
    ) -> Result<ProjectInfo, Error> {
        let project: ProjectInfo = self
            .rpc(
                "projects.add",
                &json!({
                    "workspaceId": workspace_id,
                    "name": name,
                    "type": "images",
                    "changeNameIfConflict": true,
                }),
            )
            .await?;
        debug!("Created project {}", project);
        Ok(project)
    }

    async fn update_project_meta(
        &self,
        project_id: ProjectID,
        meta: &ProjectMeta,
    ) -> Result<(), Error> {
        let _: serde_json::Value = self
            .rpc(
                "projects.meta.update",
                &json!({ "id": project_id, "meta": meta }),
            )
            .await?;
        Ok(())
    }

    async fn create_dataset(
        &self,
        project_id: ProjectID,
        name: &str,
    ) -> Result<DatasetInfo, Error> {
        let dataset: DatasetInfo = self
            .rpc(
                "datasets.add",
                &json!({
                    "projectId": project_id,
                    "name": name,
                    "changeNameIfConflict": true,
                }),
            )
            .await?;
        debug!("Created dataset {}", dataset);
        Ok(dataset)
    }

    async fn upload_images(
        &self,
        dataset_id: DatasetID,
        names: &[String],
        paths: &[PathBuf],
    ) -> Result<Vec<ImageInfo>, Error> {
        if names.len() != paths.len() {
            return Err(Error::InvalidParameters(format!(
                "{} names for {} image files",
                names.len(),
                paths.len()
            )));
        }

        let mut form = Form::new();
        let mut hashes = Vec::with_capacity(paths.len());
        for (name, path) in names.iter().zip(paths) {
            let (hash, part) = Self::upload_part(path, name).await?;
            form = form.part(hash.clone(), part);
            hashes.push(hash);
        }
        self.post_multipart("images.upload", form).await?;

        let images: Vec<NewImage> = names
            .iter()
            .zip(&hashes)
            .map(|(name, hash)| NewImage { name, hash })
            .collect();
        let uploaded: Vec<ImageInfo> = self
            .rpc(
                "images.bulk.add",
                &json!({ "datasetId": dataset_id, "images": images }),
            )
            .await?;

        if uploaded.len() != names.len() {
            error!(
                "images.bulk.add returned {} images for {} requested",
                uploaded.len(),
                names.len()
            );
            return Err(Error::InvalidResponse);
        }
        Ok(uploaded)
    }

    async fn upload_annotations(
        &self,
        image_ids: &[ImageID],
        annotations: &[Annotation],
    ) -> Result<(), Error> {
        if image_ids.len() != annotations.len() {
            return Err(Error::InvalidParameters(format!(
                "{} annotations for {} images",
                annotations.len(),
                image_ids.len()
            )));
        }

        let annotations: Vec<ImageAnnotation> = image_ids
            .iter()
            .zip(annotations)
            .map(|(&image_id, annotation)| ImageAnnotation {
                image_id,
                annotation,
            })
            .collect();
        let _: serde_json::Value = self
            .rpc(
                "annotations.bulk.add",
                &json!({ "annotations": annotations }),
            )
            .await?;
        Ok(())
    }
}

impl FileStore for Client {
    async fn directory_size(&self, remote_dir: &str) -> Result<u64, Error> {
        let team_id = self.require_team()?;
        let info: FileStorageInfo = self
            .rpc(
                "file-storage.info",
                &json!({ "teamId": team_id, "path": remote_dir }),
            )
            .await?;
        Ok(info.size)
    }

    async fn download(
        &self,
        remote_path: &str,
        local_path: &Path,
        progress: Option<Sender<Progress>>,
    ) -> Result<(), Error> {
        let team_id = self.require_team()?;
        let res = self
            .post("file-storage.download")?
            .json(&json!({ "teamId": team_id, "path": remote_path }))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.bytes().await?;
            return Err(error_from_body(status.as_u16(), &body));
        }

        let total = res.content_length().unwrap_or(0) as usize;
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = File::create(local_path).await?;

        let mut current = 0;
        let mut stream = res.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            current += chunk.len();
            if let Some(progress) = &progress {
                let _ = progress
                    .send(Progress {
                        current,
                        total: total.max(current),
                    })
                    .await;
            }
        }
        file.flush().await?;

        debug!("Downloaded {} bytes to {}", current, local_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::{
        io::{AsyncBufReadExt as _, AsyncReadExt as _, AsyncWriteExt as _, BufReader},
        net::{TcpListener, TcpStream},
        sync::mpsc,
    };

    type Route = (&'static str, u16, Vec<u8>);

    /// A request seen by [`StubServer`], headers lowercased.
    struct Received {
        method: String,
        headers: Vec<String>,
        body: Vec<u8>,
    }

    /// Local HTTP server answering API methods with canned responses.
    struct StubServer {
        url: String,
        received: Arc<Mutex<Vec<Received>>>,
    }

    impl StubServer {
        async fn start(routes: Vec<Route>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let received = Arc::new(Mutex::new(Vec::new()));
            let routes = Arc::new(routes);

            let log = received.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let routes = routes.clone();
                    let log = log.clone();
                    tokio::spawn(async move {
                        let _ = respond(stream, &routes, &log).await;
                    });
                }
            });
            StubServer { url, received }
        }

        fn client(&self) -> Client {
            Client::new(&self.url)
                .unwrap()
                .with_token("secret")
                .unwrap()
                .with_team(TeamID::from(7))
        }

        fn methods(&self) -> Vec<String> {
            self.received
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.method.clone())
                .collect()
        }

        fn body(&self, method: &str) -> Vec<u8> {
            self.received
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.method == method)
                .map(|r| r.body.clone())
                .unwrap()
        }

        fn json(&self, method: &str) -> serde_json::Value {
            serde_json::from_slice(&self.body(method)).unwrap()
        }
    }

    async fn respond(
        stream: TcpStream,
        routes: &[Route],
        log: &Mutex<Vec<Received>>,
    ) -> std::io::Result<()> {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        let method = line
            .split_whitespace()
            .nth(1)
            .and_then(|path| path.rsplit('/').next())
            .unwrap_or_default()
            .to_owned();

        let mut headers = Vec::new();
        loop {
            line.clear();
            reader.read_line(&mut line).await?;
            let header = line.trim_end().to_ascii_lowercase();
            if header.is_empty() {
                break;
            }
            headers.push(header);
        }

        let mut body = Vec::new();
        if let Some(length) = headers
            .iter()
            .find_map(|h| h.strip_prefix("content-length:"))
        {
            body.resize(length.trim().parse().unwrap_or(0), 0);
            reader.read_exact(&mut body).await?;
        } else if headers.iter().any(|h| h == "transfer-encoding: chunked") {
            loop {
                line.clear();
                reader.read_line(&mut line).await?;
                let size = usize::from_str_radix(line.trim(), 16).unwrap_or(0);
                let mut chunk = vec![0; size + 2];
                reader.read_exact(&mut chunk).await?;
                if size == 0 {
                    break;
                }
                body.extend_from_slice(&chunk[..size]);
            }
        }

        let (status, response) = routes
            .iter()
            .find(|(name, ..)| *name == method)
            .map(|(_, status, response)| (*status, response.clone()))
            .unwrap_or((404, br#"{"error": "unknown method"}"#.to_vec()));
        log.lock().unwrap().push(Received {
            method,
            headers,
            body,
        });

        let mut stream = reader.into_inner();
        let head = format!(
            "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            response.len()
        );
        stream.write_all(head.as_bytes()).await?;
        stream.write_all(&response).await?;
        stream.shutdown().await
    }

    fn json_route(method: &'static str, status: u16, value: serde_json::Value) -> Route {
        (method, status, value.to_string().into_bytes())
    }

    fn write_images(dir: &Path) -> (Vec<String>, Vec<PathBuf>) {
        let names = vec!["a.png".to_owned(), "b.png".to_owned()];
        let paths: Vec<PathBuf> = names.iter().map(|n| dir.join(n)).collect();
        std::fs::write(&paths[0], b"sugar beet").unwrap();
        std::fs::write(&paths[1], b"weed").unwrap();
        (names, paths)
    }

    #[tokio::test]
    async fn test_upload_images_then_bulk_add() {
        let server = StubServer::start(vec![
            json_route("images.upload", 200, json!({})),
            json_route(
                "images.bulk.add",
                200,
                json!([{"id": 11, "name": "a.png"}, {"id": 12, "name": "b.png"}]),
            ),
        ])
        .await;
        let dir = tempfile::tempdir().unwrap();
        let (names, paths) = write_images(dir.path());

        let images = server
            .client()
            .upload_images(DatasetID::from(3), &names, &paths)
            .await
            .unwrap();

        assert_eq!(
            images.iter().map(|i| i.id()).collect::<Vec<_>>(),
            [ImageID::from(11), ImageID::from(12)]
        );
        assert_eq!(server.methods(), ["images.upload", "images.bulk.add"]);

        let hash = image_hash(b"sugar beet");
        let multipart = server.body("images.upload");
        assert!(String::from_utf8_lossy(&multipart).contains(&hash));

        let bulk = server.json("images.bulk.add");
        assert_eq!(bulk["datasetId"], 3);
        assert_eq!(bulk["images"][0]["name"], "a.png");
        assert_eq!(bulk["images"][0]["hash"], hash.as_str());
        assert_eq!(bulk["images"][1]["hash"], image_hash(b"weed").as_str());

        let received = server.received.lock().unwrap();
        assert!(
            received
                .iter()
                .all(|r| r.headers.iter().any(|h| h == "x-api-key: secret"))
        );
    }

    #[tokio::test]
    async fn test_bulk_add_count_mismatch() {
        let server = StubServer::start(vec![
            json_route("images.upload", 200, json!({})),
            json_route("images.bulk.add", 200, json!([{"id": 11, "name": "a.png"}])),
        ])
        .await;
        let dir = tempfile::tempdir().unwrap();
        let (names, paths) = write_images(dir.path());

        let result = server
            .client()
            .upload_images(DatasetID::from(3), &names, &paths)
            .await;
        assert!(matches!(result, Err(Error::InvalidResponse)), "{:?}", result);
    }

    #[tokio::test]
    async fn test_error_status_is_rpc_error() {
        let server = StubServer::start(vec![json_route(
            "datasets.add",
            400,
            json!({"error": "Validation error", "details": {"message": "project 9 not found"}}),
        )])
        .await;

        let result = server
            .client()
            .create_dataset(ProjectID::from(9), "train")
            .await;
        match result {
            Err(Error::RpcError(400, message)) => assert_eq!(message, "project 9 not found"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(server.methods(), ["datasets.add"]);

        let request = server.json("datasets.add");
        assert_eq!(request["projectId"], 9);
        assert_eq!(request["name"], "train");
        assert_eq!(request["changeNameIfConflict"], true);
    }

    #[tokio::test]
    async fn test_create_project_keeps_platform_name() {
        let server = StubServer::start(vec![json_route(
            "projects.add",
            200,
            json!({"id": 21, "name": "Lincoln Beet_001", "workspaceId": 5}),
        )])
        .await;

        let project = server
            .client()
            .create_project(WorkspaceID::from(5), "Lincoln Beet")
            .await
            .unwrap();
        assert_eq!(project.id(), ProjectID::from(21));
        assert_eq!(project.name(), "Lincoln Beet_001");
        assert_eq!(server.json("projects.add")["type"], "images");
    }

    #[tokio::test]
    async fn test_directory_size() {
        let server =
            StubServer::start(vec![json_route("file-storage.info", 200, json!({"size": 1234}))])
                .await;

        let size = server
            .client()
            .directory_size("/lincoln-beet/")
            .await
            .unwrap();
        assert_eq!(size, 1234);

        let request = server.json("file-storage.info");
        assert_eq!(request["teamId"], 7);
        assert_eq!(request["path"], "/lincoln-beet/");
    }

    #[tokio::test]
    async fn test_download_streams_to_disk() {
        let contents: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();
        let server =
            StubServer::start(vec![("file-storage.download", 200, contents.clone())]).await;
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("buffer").join("fields.zip");

        let (tx, mut rx) = mpsc::channel(4);
        let last = async {
            let mut last = None;
            while let Some(progress) = rx.recv().await {
                last = Some(progress);
            }
            last
        };
        let client = server.client();
        let (result, last) = tokio::join!(
            client.download("/lincoln-beet/fields.zip", &local, Some(tx)),
            last
        );
        result.unwrap();

        assert_eq!(std::fs::read(&local).unwrap(), contents);
        assert_eq!(
            last,
            Some(Progress {
                current: contents.len(),
                total: contents.len(),
            })
        );
        assert_eq!(
            server.json("file-storage.download")["path"],
            "/lincoln-beet/fields.zip"
        );
    }

    #[test]
    fn test_image_hash() {
        assert_eq!(
            image_hash(b"abc"),
            "ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0="
        );
    }

    #[test]
    fn test_method_url() {
        let client = Client::new("https://app.example.com/").unwrap();
        assert_eq!(client.url(), "https://app.example.com");
        assert_eq!(
            client.method_url("projects.add"),
            "https://app.example.com/public/api/v3/projects.add"
        );

        let other = client.with_server("http://localhost:8080").unwrap();
        assert_eq!(
            other.method_url("datasets.add"),
            "http://localhost:8080/public/api/v3/datasets.add"
        );
    }

    #[test]
    fn test_credentials() {
        let client = Client::new("https://app.example.com").unwrap();
        assert!(matches!(client.with_token("  "), Err(Error::EmptyToken)));
        assert!(client.with_token("secret").is_ok());
        assert_eq!(client.team_id(), None);
        assert_eq!(
            client.with_team(TeamID::from(4)).team_id(),
            Some(TeamID::from(4))
        );
        assert!(matches!(
            Client::new("not a url"),
            Err(Error::UrlParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_calls_without_token_fail_before_sending() {
        let client = Client::new("http://127.0.0.1:9").unwrap();
        let result = client.create_project(WorkspaceID::from(1), "p").await;
        assert!(matches!(result, Err(Error::EmptyToken)));
    }

    #[tokio::test]
    async fn test_team_files_require_team() {
        let client = Client::new("http://127.0.0.1:9")
            .unwrap()
            .with_token("secret")
            .unwrap();
        assert!(matches!(
            client.directory_size("/lincoln-beet/").await,
            Err(Error::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_error_from_body() {
        match error_from_body(
            400,
            br#"{"error": "Validation error", "details": {"message": "name is taken"}}"#,
        ) {
            Error::RpcError(400, message) => assert_eq!(message, "name is taken"),
            other => panic!("unexpected error: {:?}", other),
        }
        match error_from_body(502, b"Bad Gateway") {
            Error::RpcError(502, message) => assert_eq!(message, "Bad Gateway"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_annotation_payload() {
        let annotation = Annotation::new(2, 3, vec![], vec![]);
        let payload = ImageAnnotation {
            image_id: ImageID::from(5),
            annotation: &annotation,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["imageId"], 5);
        assert_eq!(value["annotation"]["size"]["height"], 2);
        assert_eq!(value["annotation"]["size"]["width"], 3);
    }
}

//! Blocking connection to an openEO back-end.

use log::{debug, info};
use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, LOCATION};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::fs::{self, File};
use std::path::Path;
use std::time::Duration;

use super::datacube::DataCube;
use super::error::{OpenEoError, Result, api_error};
use super::graph::{FlatGraph, Parameter};
use super::job::BatchJob;
use crate::config::AuthMethod;

const USER_AGENT: &str = concat!("eo-services/", env!("CARGO_PKG_VERSION"));
const MIN_API_VERSION: &[u64] = &[1, 0, 0];

#[derive(Debug, Deserialize)]
struct ApiVersion {
    url: String,
    api_version: String,
    #[serde(default = "default_production")]
    production: bool,
}

fn default_production() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct WellKnown {
    versions: Vec<ApiVersion>,
}

#[derive(Debug, Deserialize)]
struct Capabilities {
    api_version: String,
    #[serde(default)]
    backend_version: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BasicToken {
    access_token: String,
}

fn parse_version(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|part| part.parse().unwrap_or(0))
        .collect()
}

/// URL of the newest production API version at least 1.0.0.
fn pick_api_url(well_known: &WellKnown) -> Option<&str> {
    well_known
        .versions
        .iter()
        .filter(|v| v.production && parse_version(&v.api_version).as_slice() >= MIN_API_VERSION)
        .max_by(|a, b| parse_version(&a.api_version).cmp(&parse_version(&b.api_version)))
        .map(|v| v.url.trim_end_matches('/'))
}

/// Job id from `OpenEO-Identifier`, or the last segment of `Location`.
fn job_id_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(id) = headers
        .get("OpenEO-Identifier")
        .and_then(|v| v.to_str().ok())
    {
        return Some(id.to_string());
    }

    headers
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|location| location.trim_end_matches('/').rsplit('/').next())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Settings of a batch job besides its process graph.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub title: String,
    pub format: String,
    pub format_options: Value,
    pub job_options: Option<Value>,
}

impl JobSpec {
    pub fn new(title: &str, format: &str) -> Self {
        Self {
            title: title.to_string(),
            format: format.to_string(),
            format_options: json!({}),
            job_options: None,
        }
    }

    pub fn with_format_options(mut self, options: Value) -> Self {
        self.format_options = options;
        self
    }

    pub fn with_job_options(mut self, options: Value) -> Self {
        self.job_options = Some(options);
        self
    }
}

fn job_body(process_graph: FlatGraph, spec: &JobSpec) -> Value {
    let mut body = Map::new();
    body.insert("title".to_string(), Value::from(spec.title.as_str()));
    body.insert("process".to_string(), json!({"process_graph": process_graph}));
    if let Some(options) = &spec.job_options {
        body.insert("job_options".to_string(), options.clone());
    }
    Value::Object(body)
}

fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(api_error(status.as_u16(), &body))
}

pub struct Connection {
    client: Client,
    root_url: String,
    token: Option<String>,
}

impl Connection {
    /// Resolves the API root of `url` and checks that it answers.
    pub fn connect(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        let url = url.trim_end_matches('/');

        let root_url = match client
            .get(format!("{}/.well-known/openeo", url))
            .send()
            .and_then(Response::error_for_status)
        {
            Ok(response) => {
                let well_known: WellKnown = response.json()?;
                pick_api_url(&well_known)
                    .ok_or_else(|| OpenEoError::NoUsableApiVersion(url.to_string()))?
                    .to_string()
            }
            Err(e) => {
                debug!("No well-known document at {} ({}), using it as API root", url, e);
                url.to_string()
            }
        };

        let capabilities: Capabilities = check(client.get(&root_url).send()?)?.json()?;
        info!(
            "Connected to {} ({}, openEO API {}, back-end {})",
            root_url,
            capabilities.title.as_deref().unwrap_or("untitled"),
            capabilities.api_version,
            capabilities.backend_version.as_deref().unwrap_or("unknown")
        );

        Ok(Self {
            client,
            root_url,
            token: None,
        })
    }

    pub fn authenticate(&mut self, auth: Option<&AuthMethod>) -> Result<()> {
        match auth {
            Some(AuthMethod::Basic { username, password }) => {
                self.authenticate_basic(username, password)
            }
            Some(AuthMethod::Bearer { token }) => {
                self.authenticate_bearer(token);
                Ok(())
            }
            None => {
                info!("No credentials configured, continuing unauthenticated");
                Ok(())
            }
        }
    }

    pub fn authenticate_basic(&mut self, username: &str, password: &str) -> Result<()> {
        let response = self
            .client
            .get(self.url("/credentials/basic"))
            .basic_auth(username, Some(password))
            .send()?;
        let token: BasicToken = check(response)?.json()?;
        self.token = Some(format!("basic//{}", token.access_token));
        info!("Authenticated as {}", username);
        Ok(())
    }

    /// Uses a pre-obtained token, e.g. `oidc/<provider>/<access token>`.
    pub fn authenticate_bearer(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.root_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub(crate) fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(Method::GET, &self.url(path)).send()?;
        Ok(check(response)?.json()?)
    }

    /// GET of a full URL, used for result assets that may live on another host.
    pub(crate) fn get_absolute(&self, href: &str) -> Result<Response> {
        check(self.request(Method::GET, href).send()?)
    }

    pub(crate) fn post_json(&self, path: &str, body: &Value) -> Result<Response> {
        let builder = self.request(Method::POST, &self.url(path));
        let builder = if body.is_null() { builder } else { builder.json(body) };
        check(builder.send()?)
    }

    fn put_json(&self, path: &str, body: &Value) -> Result<Response> {
        check(self.request(Method::PUT, &self.url(path)).json(body).send()?)
    }

    /// Runs `cube` synchronously and writes the result to `path`.
    pub fn download(&self, cube: &DataCube, path: &Path, format: &str) -> Result<()> {
        let cube = cube.ensure_save_result(format, json!({}));
        let body = json!({"process": {"process_graph": cube.flat_graph()}});

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        info!("Executing process graph synchronously");
        let mut response = self.post_json("/result", &body)?;
        let mut file = File::create(path)?;
        let bytes = response.copy_to(&mut file)?;
        info!("Wrote {} bytes to {}", bytes, path.display());
        Ok(())
    }

    pub fn create_job(&self, cube: &DataCube, spec: &JobSpec) -> Result<BatchJob<'_>> {
        let cube = cube.ensure_save_result(&spec.format, spec.format_options.clone());
        let response = self.post_json("/jobs", &job_body(cube.flat_graph(), spec))?;
        let job_id = job_id_from_headers(response.headers()).ok_or(OpenEoError::MissingJobId)?;
        info!("Created job {} ({})", job_id, spec.title);
        Ok(BatchJob::new(self, job_id))
    }

    /// Stores a process graph as a user-defined process under `process_id`.
    pub fn save_user_defined_process(
        &self,
        process_id: &str,
        process_graph: FlatGraph,
        parameters: &[Parameter],
        description: &str,
        public: bool,
    ) -> Result<()> {
        let body = json!({
            "process_graph": process_graph,
            "parameters": parameters,
            "description": description,
            "public": public,
        });
        self.put_json(&format!("/process_graphs/{}", process_id), &body)?;
        info!("Saved user-defined process {}", process_id);
        Ok(())
    }
}

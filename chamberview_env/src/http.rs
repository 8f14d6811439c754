//! Production `SimulationService` over HTTP + JSON.

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use crate::error::EnvError;
use crate::service::SimulationService;
use crate::types::{ChamberId, InitInfo, SimulationStep, UserInfo};

/// HTTP client for a ball-machine style server.
///
/// No request timeout is configured: a hung fetch only delays the cycle it
/// belongs to.
#[derive(Debug, Clone)]
pub struct HttpService {
    client: Client,
    base: Url,
}

impl HttpService {
    /// Creates a service rooted at `base` (e.g. `http://localhost:8000/`).
    pub fn new(base: &str) -> Result<Self, EnvError> {
        let mut base = Url::parse(base).map_err(|e| EnvError::InvalidRequest(e.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client: Client::new(),
            base,
        })
    }
    
    /// Returns the base URL.
    pub fn base(&self) -> &Url {
        &self.base
    }
    
    fn url(&self, path: &str) -> Result<Url, EnvError> {
        self.base
            .join(path)
            .map_err(|e| EnvError::InvalidRequest(e.to_string()))
    }
    
    /// `<base>/<id>/chamber.wasm`, with the id escaped as a single segment.
    fn artifact_url(&self, id: &ChamberId) -> Result<Url, EnvError> {
        if matches!(id.as_str(), "" | "." | "..") {
            return Err(EnvError::InvalidRequest(format!("unusable chamber id {:?}", id.as_str())));
        }
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| EnvError::InvalidRequest(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .push(id.as_str())
            .push("chamber.wasm");
        Ok(url)
    }
    
    async fn get(&self, url: Url) -> Result<Response, EnvError> {
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        check_status(response)
    }
    
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, EnvError> {
        let body = self.get(url).await?.bytes().await.map_err(transport_error)?;
        Ok(serde_json::from_slice(&body)?)
    }
    
    async fn put_number(&self, path: &str, value: impl std::fmt::Display) -> Result<(), EnvError> {
        let response = self
            .client
            .put(self.url(path)?)
            .body(value.to_string())
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).map(|_| ())
    }
}

fn transport_error(err: reqwest::Error) -> EnvError {
    if err.is_decode() {
        EnvError::decode(err)
    } else {
        EnvError::network(err.to_string())
    }
}

fn check_status(response: Response) -> Result<Response, EnvError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(EnvError::Status(status.as_u16()))
    }
}

#[async_trait]
impl SimulationService for HttpService {
    async fn init_info(&self) -> Result<InitInfo, EnvError> {
        self.get_json(self.url("init_info")?).await
    }
    
    async fn simulation_state(&self, since: u64) -> Result<Vec<SimulationStep>, EnvError> {
        let mut url = self.url("simulation_state")?;
        url.query_pairs_mut().append_pair("since", &since.to_string());
        self.get_json(url).await
    }
    
    async fn chamber_artifact(&self, id: &ChamberId) -> Result<Vec<u8>, EnvError> {
        let url = self.artifact_url(id)?;
        let body = self.get(url).await?.bytes().await.map_err(transport_error)?;
        Ok(body.to_vec())
    }
    
    async fn user_info(&self) -> Result<UserInfo, EnvError> {
        self.get_json(self.url("userinfo")?).await
    }
    
    async fn set_num_balls(&self, num_balls: u64) -> Result<(), EnvError> {
        self.put_number("num_balls", num_balls).await
    }
    
    async fn set_chambers_per_row(&self, chambers_per_row: usize) -> Result<(), EnvError> {
        self.put_number("chambers_per_row", chambers_per_row).await
    }
    
    async fn reset(&self) -> Result<(), EnvError> {
        self.get(self.url("reset")?).await.map(|_| ())
    }
}

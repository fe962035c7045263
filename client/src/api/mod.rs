//! Tracker API client.

use std::error::Error as StdError;

use anyhow::Result;
use displaydoc::Display;
use reqwest::{Client as HttpClient, Response, StatusCode, Url};

use depot::api::{CreateOpenResponse, GetDevicesResponse, GetHostsResponse, GetPathsResponse};
use depot::key::Key;

/// The tracker API client.
#[derive(Debug, Clone)]
pub struct TrackerClient {
    /// Base endpoint of the tracker.
    endpoint: Url,

    /// An initialized HTTP client.
    client: HttpClient,
}

/// An API error.
#[derive(Debug, Display)]
pub enum ApiError {
    /// HTTP {0}: {1}
    Unstructured(StatusCode, String),
}

impl StdError for ApiError {}

impl ApiError {
    async fn try_from_response(response: Response) -> Result<Self> {
        let status = response.status();
        let text = response.text().await?;

        Ok(Self::Unstructured(status, text))
    }
}

impl TrackerClient {
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            client: HttpClient::builder().build()?,
        })
    }

    /// Returns the underlying HTTP client, for talking to storage nodes.
    pub fn http_client(&self) -> HttpClient {
        self.client.clone()
    }

    /// Checks tracker liveness.
    pub async fn ping(&self) -> Result<String> {
        let endpoint = self.endpoint.join("ping")?;
        let res = self.client.get(endpoint).send().await?;

        if res.status().is_success() {
            Ok(res.text().await?)
        } else {
            Err(ApiError::try_from_response(res).await?.into())
        }
    }

    /// Reserves a placement for a new upload.
    pub async fn create_open(&self, size: Option<u64>) -> Result<CreateOpenResponse> {
        let endpoint = self.endpoint.join("create-open")?;

        let mut form: Vec<(&str, String)> = Vec::new();
        if let Some(size) = size {
            form.push(("size", size.to_string()));
        }

        let res = self.client.post(endpoint).form(&form).send().await?;

        if res.status().is_success() {
            Ok(res.json().await?)
        } else {
            Err(ApiError::try_from_response(res).await?.into())
        }
    }

    /// Commits an upload.
    pub async fn create_close(&self, fid: i64, devid: i32, key: &Key, size: u64) -> Result<()> {
        let endpoint = self.endpoint.join("create-close")?;

        let form = [
            ("fid", fid.to_string()),
            ("devid", devid.to_string()),
            ("key", key.as_str().to_string()),
            ("size", size.to_string()),
        ];

        let res = self.client.post(endpoint).form(&form).send().await?;

        if res.status().is_success() {
            Ok(())
        } else {
            Err(ApiError::try_from_response(res).await?.into())
        }
    }

    /// Returns every reachable URL for an object, best placement first.
    pub async fn get_paths(&self, key: &Key) -> Result<Vec<String>> {
        let endpoint = self.endpoint.join("get-paths")?;

        let res = self
            .client
            .get(endpoint)
            .query(&[("key", key.as_str())])
            .send()
            .await?;

        if res.status().is_success() {
            let response: GetPathsResponse = res.json().await?;
            Ok(response.paths)
        } else {
            Err(ApiError::try_from_response(res).await?.into())
        }
    }

    /// Deletes an object.
    pub async fn delete(&self, key: &Key) -> Result<()> {
        let endpoint = self.endpoint.join("delete")?;

        let res = self
            .client
            .post(endpoint)
            .form(&[("key", key.as_str())])
            .send()
            .await?;

        if res.status().is_success() {
            Ok(())
        } else {
            Err(ApiError::try_from_response(res).await?.into())
        }
    }

    /// Lists devices.
    pub async fn get_devices(&self) -> Result<GetDevicesResponse> {
        let endpoint = self.endpoint.join("get-devices")?;
        let res = self.client.get(endpoint).send().await?;

        if res.status().is_success() {
            Ok(res.json().await?)
        } else {
            Err(ApiError::try_from_response(res).await?.into())
        }
    }

    /// Lists hosts.
    pub async fn get_hosts(&self) -> Result<GetHostsResponse> {
        let endpoint = self.endpoint.join("get-hosts")?;
        let res = self.client.get(endpoint).send().await?;

        if res.status().is_success() {
            Ok(res.json().await?)
        } else {
            Err(ApiError::try_from_response(res).await?.into())
        }
    }
}

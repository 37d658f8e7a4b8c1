//! HTTP client for the platform's v3 API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::wire::{
    AppResource, BuildResource, CreateBuildRequest, CreateDeploymentRequest,
    DeploymentRelationships, DropletResource, ErrorsBody, GuidRef, Relationship, ResourceList,
    RootInfo, StackResource, UpdateLifecycleRequest,
};
use super::Platform;
use crate::error::{Error, Result};
use crate::model::{Application, Build, Droplet, PlatformVersion, RestartStrategy, Stack};

/// Connection settings for [`HttpPlatform`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// API endpoint, e.g. `https://api.example.com`.
    pub api_url: String,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub token: Option<String>,
    /// Restricts application lookups to one space.
    #[serde(default)]
    pub space_guid: Option<String>,
    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl PlatformConfig {
    /// Creates a configuration for `api_url` with default settings.
    #[must_use]
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            token: None,
            space_guid: None,
            request_timeout: default_request_timeout(),
        }
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Scopes application lookups to a space.
    #[must_use]
    pub fn with_space(mut self, space_guid: impl Into<String>) -> Self {
        self.space_guid = Some(space_guid.into());
        self
    }
}

/// Platform client speaking the v3 REST API.
#[derive(Debug, Clone)]
pub struct HttpPlatform {
    client: Client,
    base_url: String,
    token: Option<String>,
    space_guid: Option<String>,
}

impl HttpPlatform {
    /// Creates a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &PlatformConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::transport_with_source("failed to create HTTP client", e))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            space_guid: config.space_guid.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.client.request(method, url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        let response = req
            .send()
            .await
            .map_err(|e| Error::transport_with_source("failed to send request", e))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorsBody>(&body)
            .ok()
            .and_then(|b| b.message())
            .unwrap_or(body);
        Err(Error::api(status, message))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.request(Method::GET, path)).await?;
        decode(response, path).await
    }

    async fn send_json<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<Response> {
        self.send(self.request(method, path).json(body)).await
    }

    async fn post_action(&self, app_guid: &str, action: &str) -> Result<()> {
        let path = format!("/v3/apps/{app_guid}/actions/{action}");
        self.send(self.request(Method::POST, &path)).await?;
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(response: Response, path: &str) -> Result<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::transport_with_source(format!("failed to read {path}"), e))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::Serialization {
        message: format!("failed to parse response from {path}: {e}"),
    })
}

#[async_trait]
impl Platform for HttpPlatform {
    #[tracing::instrument(skip(self))]
    async fn find_app(&self, name: &str) -> Result<Application> {
        let mut query = vec![("names", name)];
        if let Some(space) = &self.space_guid {
            query.push(("space_guids", space.as_str()));
        }

        let req = self.request(Method::GET, "/v3/apps").query(&query);
        let list: ResourceList<AppResource> = decode(self.send(req).await?, "/v3/apps").await?;
        // `names` is a comma-separated filter, so keep exact matches only.
        let mut apps = list.resources.into_iter().filter(|app| app.name == name);
        let app = apps
            .next()
            .ok_or_else(|| Error::not_found("application", name))?;
        if apps.next().is_some() {
            return Err(Error::InvalidInput(format!(
                "application name {name} matches more than one space; set a space GUID"
            )));
        }
        app.try_into()
    }

    #[tracing::instrument(skip(self))]
    async fn find_stack(&self, name: &str) -> Result<Stack> {
        let req = self
            .request(Method::GET, "/v3/stacks")
            .query(&[("names", name)]);
        let list: ResourceList<StackResource> = decode(self.send(req).await?, "/v3/stacks").await?;
        list.resources
            .into_iter()
            .find(|stack| stack.name == name)
            .map(Stack::from)
            .ok_or_else(|| Error::not_found("stack", name))
    }

    async fn set_app_stack(&self, app_guid: &str, stack: &str) -> Result<()> {
        let body = UpdateLifecycleRequest::buildpack_stack(stack);
        self.send_json(Method::PATCH, &format!("/v3/apps/{app_guid}"), &body)
            .await?;
        Ok(())
    }

    async fn current_droplet(&self, app_guid: &str) -> Result<Droplet> {
        let droplet: DropletResource = self
            .get_json(&format!("/v3/apps/{app_guid}/droplets/current"))
            .await
            .map_err(|e| match e {
                Error::Api { status: 404, .. } => Error::not_found("droplet", app_guid),
                other => other,
            })?;
        droplet.try_into()
    }

    async fn create_build(&self, package_guid: &str) -> Result<Build> {
        let body = CreateBuildRequest {
            package: GuidRef {
                guid: package_guid.to_string(),
            },
        };
        let response = self.send_json(Method::POST, "/v3/builds", &body).await?;
        let build: BuildResource = decode(response, "/v3/builds").await?;
        Ok(build.into())
    }

    async fn get_build(&self, build_guid: &str) -> Result<Build> {
        let build: BuildResource = self.get_json(&format!("/v3/builds/{build_guid}")).await?;
        Ok(build.into())
    }

    async fn set_current_droplet(&self, app_guid: &str, droplet_guid: &str) -> Result<()> {
        let body = Relationship {
            data: GuidRef {
                guid: droplet_guid.to_string(),
            },
        };
        let path = format!("/v3/apps/{app_guid}/relationships/current_droplet");
        self.send_json(Method::PATCH, &path, &body).await?;
        Ok(())
    }

    async fn restart_app(&self, app_guid: &str, strategy: RestartStrategy) -> Result<()> {
        match strategy {
            RestartStrategy::Standard => self.post_action(app_guid, "restart").await,
            RestartStrategy::ZeroDowntime => {
                let body = CreateDeploymentRequest {
                    strategy: "rolling",
                    relationships: DeploymentRelationships {
                        app: Relationship {
                            data: GuidRef {
                                guid: app_guid.to_string(),
                            },
                        },
                    },
                };
                self.send_json(Method::POST, "/v3/deployments", &body)
                    .await?;
                Ok(())
            }
        }
    }

    async fn start_app(&self, app_guid: &str) -> Result<()> {
        self.post_action(app_guid, "start").await
    }

    async fn stop_app(&self, app_guid: &str) -> Result<()> {
        self.post_action(app_guid, "stop").await
    }

    async fn api_version(&self) -> Result<PlatformVersion> {
        let root: RootInfo = self.get_json("/").await?;
        root.links.cloud_controller_v3.meta.version.parse()
    }
}

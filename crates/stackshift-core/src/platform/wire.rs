//! JSON shapes of the platform's v3 API.
//!
//! Only the fields the migrator reads are modelled; unknown fields are ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{AppState, Application, Build, BuildState, Droplet, Stack};

/// A page of resources. Name-filtered lookups fit in the first page.
#[derive(Debug, Deserialize)]
pub struct ResourceList<T> {
    /// Resources on this page.
    pub resources: Vec<T>,
}

/// A reference to another resource by GUID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidRef {
    /// The referenced resource's GUID.
    pub guid: String,
}

/// A relationship wrapper: `{"data": {"guid": ...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    /// The related resource.
    pub data: GuidRef,
}

/// A hyperlink.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Link {
    /// Absolute URL.
    #[serde(default)]
    pub href: String,
}

/// `GET /v3/apps/:guid`.
#[derive(Debug, Deserialize)]
pub struct AppResource {
    /// App GUID.
    pub guid: String,
    /// App name.
    pub name: String,
    /// `STARTED` or `STOPPED`.
    pub state: String,
    /// Lifecycle, carrying the stack name.
    pub lifecycle: Lifecycle,
    /// Relationships, carrying the owning space.
    pub relationships: AppRelationships,
}

/// App lifecycle block.
#[derive(Debug, Serialize, Deserialize)]
pub struct Lifecycle {
    /// Lifecycle type (`buildpack`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Lifecycle data.
    pub data: LifecycleData,
}

/// App lifecycle data.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LifecycleData {
    /// Stack name.
    #[serde(default)]
    pub stack: Option<String>,
}

/// App relationships.
#[derive(Debug, Deserialize)]
pub struct AppRelationships {
    /// Owning space.
    pub space: Relationship,
}

impl TryFrom<AppResource> for Application {
    type Error = Error;

    fn try_from(app: AppResource) -> Result<Self> {
        let state: AppState = app.state.parse()?;
        let stack = app.lifecycle.data.stack.ok_or_else(|| {
            Error::InvalidInput(format!("application {} has no stack in its lifecycle", app.name))
        })?;
        Ok(Self {
            guid: app.guid,
            name: app.name,
            state,
            stack,
            space_guid: app.relationships.space.data.guid,
        })
    }
}

/// `GET /v3/stacks`.
#[derive(Debug, Deserialize)]
pub struct StackResource {
    /// Stack GUID.
    pub guid: String,
    /// Stack name.
    pub name: String,
}

impl From<StackResource> for Stack {
    fn from(stack: StackResource) -> Self {
        Self {
            guid: stack.guid,
            name: stack.name,
        }
    }
}

/// `GET /v3/apps/:guid/droplets/current`.
#[derive(Debug, Deserialize)]
pub struct DropletResource {
    /// Droplet GUID.
    pub guid: String,
    /// Stack the droplet was built for.
    #[serde(default)]
    pub stack: Option<String>,
    /// Links, including the originating package.
    pub links: DropletLinks,
}

/// Droplet links.
#[derive(Debug, Deserialize)]
pub struct DropletLinks {
    /// The package this droplet was built from.
    #[serde(default)]
    pub package: Option<Link>,
}

impl TryFrom<DropletResource> for Droplet {
    type Error = Error;

    fn try_from(droplet: DropletResource) -> Result<Self> {
        let href = droplet
            .links
            .package
            .map(|l| l.href)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                Error::InvalidInput(format!("droplet {} has no package link", droplet.guid))
            })?;
        let package_guid = guid_from_href(&href)?;
        Ok(Self {
            guid: droplet.guid,
            stack: droplet.stack,
            package_guid,
        })
    }
}

/// Extracts the trailing GUID from a resource URL such as
/// `https://api.example.com/v3/packages/<guid>`.
pub fn guid_from_href(href: &str) -> Result<String> {
    href.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.contains(':'))
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidInput(format!("no resource guid in link {href}")))
}

/// `GET /v3/builds/:guid`.
#[derive(Debug, Deserialize)]
pub struct BuildResource {
    /// Build GUID.
    pub guid: String,
    /// `STAGING`, `STAGED` or `FAILED`.
    pub state: BuildState,
    /// The produced droplet, once staged.
    #[serde(default)]
    pub droplet: Option<GuidRef>,
    /// Failure description.
    #[serde(default)]
    pub error: Option<String>,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<BuildResource> for Build {
    fn from(build: BuildResource) -> Self {
        Self {
            guid: build.guid,
            state: build.state,
            droplet_guid: build.droplet.map(|d| d.guid),
            error: build.error,
            created_at: build.created_at,
        }
    }
}

/// `PATCH /v3/apps/:guid` body that changes only the lifecycle stack.
#[derive(Debug, Serialize)]
pub struct UpdateLifecycleRequest {
    /// New lifecycle.
    pub lifecycle: Lifecycle,
}

impl UpdateLifecycleRequest {
    /// Builds a buildpack lifecycle update for `stack`.
    #[must_use]
    pub fn buildpack_stack(stack: &str) -> Self {
        Self {
            lifecycle: Lifecycle {
                kind: "buildpack".to_string(),
                data: LifecycleData {
                    stack: Some(stack.to_string()),
                },
            },
        }
    }
}

/// `POST /v3/builds` body.
#[derive(Debug, Serialize)]
pub struct CreateBuildRequest {
    /// The package to build.
    pub package: GuidRef,
}

/// `POST /v3/deployments` body for a rolling restart.
#[derive(Debug, Serialize)]
pub struct CreateDeploymentRequest {
    /// `rolling`.
    pub strategy: &'static str,
    /// The app being deployed.
    pub relationships: DeploymentRelationships,
}

/// Deployment relationships.
#[derive(Debug, Serialize)]
pub struct DeploymentRelationships {
    /// The app being deployed.
    pub app: Relationship,
}

/// `GET /` root document.
#[derive(Debug, Deserialize)]
pub struct RootInfo {
    /// Top-level links.
    pub links: RootLinks,
}

/// Root links.
#[derive(Debug, Deserialize)]
pub struct RootLinks {
    /// The v3 API entry.
    pub cloud_controller_v3: ApiLink,
}

/// A versioned API link.
#[derive(Debug, Deserialize)]
pub struct ApiLink {
    /// Link metadata.
    pub meta: ApiMeta,
}

/// API link metadata.
#[derive(Debug, Deserialize)]
pub struct ApiMeta {
    /// Semantic version string.
    pub version: String,
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorsBody {
    /// Individual errors.
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

/// A single platform error.
#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    /// Human-readable detail.
    #[serde(default)]
    pub detail: String,
    /// Error title, e.g. `CF-UnprocessableEntity`.
    #[serde(default)]
    pub title: String,
    /// Numeric error code.
    #[serde(default)]
    pub code: i64,
}

impl ErrorsBody {
    /// Renders the errors as one message, or `None` if there are none.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        Some(
            self.errors
                .iter()
                .map(|e| format!("{} ({}): {}", e.title, e.code, e.detail))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

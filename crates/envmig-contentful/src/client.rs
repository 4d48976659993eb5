//! HTTP client for the Contentful Management API

use crate::wire::{
    AliasBody, AliasDto, ApiKeyBody, ApiKeyDto, Collection, EntryBody, EntryDto, EnvironmentBody,
    EnvironmentDto, ErrorBody, Link, LocaleDto, SpaceDto,
};
use async_trait::async_trait;
use envmig_core::{
    Alias, ApiKey, BackendError, Entry, Environment, EnvironmentId, Locale, ManagementApi,
    MigrateConfig, Secret, Space,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Media type of management requests
pub const CONTENT_TYPE_V1: &str = "application/vnd.contentful.management.v1+json";

/// Header carrying the expected resource version
pub const VERSION_HEADER: &str = "X-Contentful-Version";

/// Header naming the environment a new environment is cloned from
pub const SOURCE_ENVIRONMENT_HEADER: &str = "X-Contentful-Source-Environment";

const PAGE_LIMIT: usize = 100;

fn transport(e: reqwest::Error) -> BackendError {
    BackendError::Transport(e.to_string())
}

/// Attach `body` as JSON, keeping the management media type
fn with_body<B: Serialize>(
    request: RequestBuilder,
    body: &B,
) -> Result<RequestBuilder, BackendError> {
    let bytes = serde_json::to_vec(body).map_err(|e| BackendError::Decode(e.to_string()))?;
    Ok(request.body(bytes))
}

/// Space-scoped management client
#[derive(Debug, Clone)]
pub struct ContentfulClient {
    http: reqwest::Client,
    base_url: String,
    space_id: String,
}

impl ContentfulClient {
    /// Create a client for `space_id` authenticated with `token`
    ///
    /// # Errors
    /// `BackendError::Transport` if the token is not a valid header value or
    /// the HTTP client cannot be built
    pub fn new(base_url: &str, space_id: &str, token: &Secret) -> Result<Self, BackendError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
            .map_err(|_| {
                BackendError::Transport("management token is not a valid header value".to_string())
            })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_V1));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("envmig/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(transport)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            space_id: space_id.to_string(),
        })
    }

    /// Create a client from run configuration
    ///
    /// # Errors
    /// See [`ContentfulClient::new`]
    pub fn from_config(config: &MigrateConfig) -> Result<Self, BackendError> {
        Self::new(&config.api_base_url, &config.space_id, &config.management_token)
    }

    /// Space this client is bound to
    #[inline]
    #[must_use]
    pub fn space_id(&self) -> &str {
        &self.space_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/spaces/{}{}", self.base_url, self.space_id, path)
    }

    fn environment_url(&self, environment: &EnvironmentId, path: &str) -> String {
        self.url(&format!("/environments/{environment}{path}"))
    }

    /// Send `request`, mapping non-success statuses to errors
    async fn execute(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> Result<Response, BackendError> {
        let request = request.build().map_err(transport)?;
        tracing::debug!(method = %request.method(), url = %request.url(), "Management request");

        let response = self.http.execute(request).await.map_err(transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(BackendError::not_found(resource));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|e| e.message)
            .unwrap_or(body);
        tracing::debug!(status = status.as_u16(), %message, "Management request rejected");
        Err(BackendError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> Result<T, BackendError> {
        self.execute(request, resource)
            .await?
            .json::<T>()
            .await
            .map_err(|e| BackendError::Decode(format!("{resource}: {e}")))
    }

    /// Fetch every page of a collection
    async fn collect<T: DeserializeOwned + Send>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        resource: &str,
    ) -> Result<Vec<T>, BackendError> {
        let mut items = Vec::new();
        loop {
            let request = self
                .http
                .get(url)
                .query(query)
                .query(&[("skip", items.len()), ("limit", PAGE_LIMIT)]);
            let page: Collection<T> = self.send(request, resource).await?;

            let fetched = page.items.len();
            items.extend(page.items);
            if fetched == 0 || items.len() >= page.total {
                return Ok(items);
            }
        }
    }
}

#[async_trait]
impl ManagementApi for ContentfulClient {
    async fn space(&self) -> Result<Space, BackendError> {
        let resource = format!("space {}", self.space_id);
        let dto: SpaceDto = self.send(self.http.get(self.url("")), &resource).await?;
        Ok(dto.into())
    }

    async fn environment(&self, id: &EnvironmentId) -> Result<Environment, BackendError> {
        let dto: EnvironmentDto = self
            .send(self.http.get(self.environment_url(id, "")), &format!("environment {id}"))
            .await?;
        Ok(dto.into())
    }

    async fn create_environment(
        &self,
        id: &EnvironmentId,
        name: &str,
        source: Option<EnvironmentId>,
    ) -> Result<Environment, BackendError> {
        let mut request =
            with_body(self.http.put(self.environment_url(id, "")), &EnvironmentBody { name })?;
        if let Some(source) = &source {
            request = request.header(SOURCE_ENVIRONMENT_HEADER, source.as_str());
        }

        let dto: EnvironmentDto = self.send(request, &format!("environment {id}")).await?;
        Ok(dto.into())
    }

    async fn delete_environment(&self, id: &EnvironmentId) -> Result<(), BackendError> {
        self.execute(self.http.delete(self.environment_url(id, "")), &format!("environment {id}"))
            .await?;
        Ok(())
    }

    async fn api_keys(&self) -> Result<Vec<ApiKey>, BackendError> {
        let keys: Vec<ApiKeyDto> = self.collect(&self.url("/api_keys"), &[], "api keys").await?;
        Ok(keys.into_iter().map(ApiKey::from).collect())
    }

    async fn update_api_key(&self, key: &ApiKey) -> Result<ApiKey, BackendError> {
        let request = self
            .http
            .put(self.url(&format!("/api_keys/{}", key.id)))
            .header(VERSION_HEADER, key.version);
        let request = with_body(request, &ApiKeyBody::from(key))?;

        let dto: ApiKeyDto = self.send(request, &format!("api key {}", key.id)).await?;
        Ok(dto.into())
    }

    async fn locales(&self, environment: &EnvironmentId) -> Result<Vec<Locale>, BackendError> {
        let locales: Vec<LocaleDto> = self
            .collect(
                &self.environment_url(environment, "/locales"),
                &[],
                &format!("locales of {environment}"),
            )
            .await?;
        Ok(locales.into_iter().map(Locale::from).collect())
    }

    async fn entries(
        &self,
        environment: &EnvironmentId,
        content_type: &str,
    ) -> Result<Vec<Entry>, BackendError> {
        let entries: Vec<EntryDto> = self
            .collect(
                &self.environment_url(environment, "/entries"),
                &[("content_type", content_type)],
                &format!("{content_type} entries of {environment}"),
            )
            .await?;
        Ok(entries.into_iter().map(Entry::from).collect())
    }

    async fn update_entry(
        &self,
        environment: &EnvironmentId,
        entry: &Entry,
    ) -> Result<Entry, BackendError> {
        let request = self
            .http
            .put(self.environment_url(environment, &format!("/entries/{}", entry.id)))
            .header(VERSION_HEADER, entry.version);
        let request = with_body(request, &EntryBody { fields: &entry.fields })?;

        let dto: EntryDto = self.send(request, &format!("entry {}", entry.id)).await?;
        Ok(dto.into())
    }

    async fn publish_entry(
        &self,
        environment: &EnvironmentId,
        entry: &Entry,
    ) -> Result<Entry, BackendError> {
        let request = self
            .http
            .put(self.environment_url(environment, &format!("/entries/{}/published", entry.id)))
            .header(VERSION_HEADER, entry.version);

        let dto: EntryDto = self.send(request, &format!("entry {}", entry.id)).await?;
        Ok(dto.into())
    }

    async fn alias(&self, name: &str) -> Result<Alias, BackendError> {
        let dto: AliasDto = self
            .send(
                self.http.get(self.url(&format!("/environment_aliases/{name}"))),
                &format!("environment alias {name}"),
            )
            .await?;
        Ok(dto.into())
    }

    async fn update_alias(&self, alias: &Alias) -> Result<Alias, BackendError> {
        let request = self
            .http
            .put(self.url(&format!("/environment_aliases/{}", alias.id)))
            .header(VERSION_HEADER, alias.version);
        let request = with_body(
            request,
            &AliasBody {
                environment: Link::environment(&alias.environment),
            },
        )?;

        let dto: AliasDto = self
            .send(request, &format!("environment alias {}", alias.id))
            .await?;
        Ok(dto.into())
    }
}

//! Thin async HTTP layer over the ARM management plane: a shared
//! `reqwest::Client`, a cached bearer token for the SP under test, and a
//! retrying request builder.
//!
//! Grounded on the teacher's `backend.rs` (`Backend`/`RequestBuilder`),
//! generalized from PIM's fixed `Microsoft.Authorization` operation set
//! to the handful of ARM endpoints this crate needs (role definitions,
//! role assignments, resource groups, deployments, what-if), and from
//! the teacher's `az`-CLI-sourced token to one minted straight from the
//! SP's own client-secret credential (see `auth.rs`).

use crate::{auth, models::config::ServicePrincipal};
use anyhow::{bail, Context, Result};
use azure_identity::ClientSecretCredential;
use derive_setters::Setters;
use exponential_backoff::Backoff;
use reqwest::{Client, Method, Request, StatusCode};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, trace};

const RETRY_COUNT: u32 = 10;
const API_ROOT: &str = "https://management.azure.com";

pub struct Backend {
    pub(crate) client: Client,
    credential: Arc<ClientSecretCredential>,
    token: Mutex<Option<String>>,
}

impl Backend {
    /// # Errors
    /// Will return `Err` if a credential cannot be built for the SP.
    pub fn new(sp: &ServicePrincipal) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            credential: auth::credential(sp)?,
            token: Mutex::new(None),
        })
    }

    /// Fetches (and caches) a management-plane bearer token for the SP.
    /// The token is not refreshed mid-run: a run's longest sleeps (90s
    /// RBAC-propagation, repeated 5s waits) stay well inside an ARM
    /// token's normal lifetime, and a stale token simply surfaces as a
    /// 401 that the retry loop below will not paper over, which is the
    /// correct failure mode for a tool whose entire job is diagnosing
    /// authorization failures.
    pub(crate) async fn get_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if let Some(token) = token.as_ref() {
            return Ok(token.clone());
        }
        let fresh = auth::management_token(&self.credential).await?;
        *token = Some(fresh.clone());
        Ok(fresh)
    }

    pub(crate) async fn retry_request(
        &self,
        request: &Request,
        validate: Option<for<'a> fn(StatusCode, &'a Value) -> Result<()>>,
    ) -> Result<Value> {
        let backoff = Backoff::new(RETRY_COUNT, Duration::from_secs(1), None);
        for duration in backoff {
            let Some(request) = request.try_clone() else {
                bail!("unable to clone request");
            };

            let response = self.client.execute(request).await;
            if let Ok(response) = response {
                let status = response.status();

                debug!("got status sending request: {status:?}");
                if status == StatusCode::TOO_MANY_REQUESTS {
                    bail!("rate limited");
                }

                let body = response.text().await?;
                trace!("response body: {body:#?}");
                let body: Value = if body.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(&body)?
                };

                if let Some(validate) = validate {
                    validate(status, &body)?;
                    return Ok(body);
                }

                if status.is_success() {
                    return Ok(body);
                }
            }

            if let Some(duration) = duration {
                debug!("waiting {duration:?} before retrying");
                tokio::time::sleep(duration).await;
            } else {
                debug!("no more retries left");
            }
        }
        bail!("exhausted retries");
    }

    pub(crate) fn request(&self, method: Method, path: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, method, path.into())
    }
}

#[derive(Setters)]
#[setters(strip_option)]
pub(crate) struct RequestBuilder<'a> {
    backend: &'a Backend,
    method: Method,
    path: String,
    api_version: &'static str,
    #[setters(skip)]
    query: Option<Vec<(String, String)>>,
    json: Option<Value>,
    validate: Option<fn(StatusCode, &Value) -> Result<()>>,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new(backend: &'a Backend, method: Method, path: String) -> Self {
        Self {
            backend,
            method,
            path,
            api_version: "2022-04-01",
            query: None,
            json: None,
            validate: None,
        }
    }

    pub(crate) fn query<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .get_or_insert_with(Vec::new)
            .push((key.into(), value.into()));
        self
    }

    pub(crate) async fn send(self) -> Result<Value> {
        let Self {
            backend,
            method,
            path,
            api_version,
            query,
            json,
            validate,
        } = self;

        let url = format!("{API_ROOT}{path}");

        let mut builder = backend
            .client
            .request(method, url)
            .query(&[("api-version", api_version)])
            .bearer_auth(backend.get_token().await.context("fetching bearer token")?);

        if let Some(query) = query {
            builder = builder.query(&query);
        }
        if let Some(json) = json {
            builder = builder.json(&json);
        }

        let request = builder.build()?;
        backend.retry_request(&request, validate).await
    }
}

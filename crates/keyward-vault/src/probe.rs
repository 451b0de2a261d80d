// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound liveness check against a provider endpoint.
//!
//! The secret is placed in a request header and nothing else: it is never
//! logged and never outlives the request.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use async_trait::async_trait;
use keyward_core::{KeywardError, Provider};
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

/// Anthropic API version sent with probe requests.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Checks whether a credential is accepted by its provider.
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    /// Issue one authenticated request. `endpoint` overrides the provider
    /// default when set.
    async fn check(
        &self,
        provider: Provider,
        endpoint: Option<&str>,
        secret: &SecretString,
    ) -> Result<(), KeywardError>;
}

/// Default model-listing endpoint for each provider.
pub fn default_endpoint(provider: Provider) -> Option<&'static str> {
    match provider {
        Provider::OpenAI => Some("https://api.openai.com/v1/models"),
        Provider::Anthropic => Some("https://api.anthropic.com/v1/models"),
        Provider::Google => Some("https://generativelanguage.googleapis.com/v1beta/models"),
        Provider::Groq => Some("https://api.groq.com/openai/v1/models"),
        Provider::OpenRouter => Some("https://openrouter.ai/api/v1/auth/key"),
        Provider::Mistral => Some("https://api.mistral.ai/v1/models"),
        Provider::Custom => None,
    }
}

fn header_value(value: &str) -> Result<HeaderValue, KeywardError> {
    let mut header = HeaderValue::from_str(value).map_err(|_| {
        KeywardError::InvalidFormat("credential is not a valid header value".into())
    })?;
    header.set_sensitive(true);
    Ok(header)
}

/// Authentication headers for `provider`.
fn auth_headers(provider: Provider, secret: &SecretString) -> Result<HeaderMap, KeywardError> {
    let key = secret.expose_secret();
    let mut headers = HeaderMap::new();
    match provider {
        Provider::Anthropic => {
            headers.insert("x-api-key", header_value(key)?);
            headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        }
        Provider::Google => {
            headers.insert("x-goog-api-key", header_value(key)?);
        }
        Provider::OpenAI
        | Provider::Groq
        | Provider::OpenRouter
        | Provider::Mistral
        | Provider::Custom => {
            headers.insert(
                reqwest::header::AUTHORIZATION,
                header_value(&format!("Bearer {key}"))?,
            );
        }
    }
    Ok(headers)
}

/// [`ConnectionProbe`] that issues a `GET` with reqwest.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    endpoints: HashMap<Provider, String>,
}

impl HttpProbe {
    /// Build a probe. `endpoints` maps provider names to URL overrides;
    /// unknown names are rejected.
    pub fn new(endpoints: &BTreeMap<String, String>) -> Result<Self, KeywardError> {
        let endpoints = endpoints
            .iter()
            .map(|(name, url)| {
                Provider::from_str(name)
                    .map(|provider| (provider, url.clone()))
                    .map_err(|_| {
                        KeywardError::Config(format!(
                            "unknown provider `{name}` in connection.endpoints"
                        ))
                    })
            })
            .collect::<Result<_, _>>()?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| KeywardError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self { client, endpoints })
    }

    fn resolve(&self, provider: Provider, endpoint: Option<&str>) -> Result<String, KeywardError> {
        endpoint
            .map(str::to_string)
            .or_else(|| self.endpoints.get(&provider).cloned())
            .or_else(|| default_endpoint(provider).map(str::to_string))
            .ok_or_else(|| {
                KeywardError::Validation(format!("no endpoint configured for {provider}"))
            })
    }
}

#[async_trait]
impl ConnectionProbe for HttpProbe {
    async fn check(
        &self,
        provider: Provider,
        endpoint: Option<&str>,
        secret: &SecretString,
    ) -> Result<(), KeywardError> {
        let url = self.resolve(provider, endpoint)?;
        let response = self
            .client
            .get(&url)
            .headers(auth_headers(provider, secret)?)
            .send()
            .await
            .map_err(|e| KeywardError::Provider {
                message: format!("request to {provider} failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(%provider, status = %status, "connection probe response");
        if status.is_success() {
            Ok(())
        } else {
            Err(KeywardError::Provider {
                message: format!("{provider} returned {status}"),
                source: None,
            })
        }
    }
}

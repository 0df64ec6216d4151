//! Photo publishing through the Instagram Graph API.
//!
//! Publishing is two calls: create a media container from a public image
//! URL, then publish that container.

use crate::config::InstagramConfig;
use crate::error::{Error, Result};
use crate::http::HttpClient;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

pub struct InstagramClient {
    http: HttpClient,
    graph_url: String,
    user_id: String,
    access_token: String,
}

#[derive(Serialize)]
struct CreateContainer<'a> {
    image_url: &'a str,
    caption: &'a str,
    access_token: &'a str,
}

#[derive(Serialize)]
struct PublishContainer<'a> {
    creation_id: &'a str,
    access_token: &'a str,
}

#[derive(Deserialize)]
struct GraphId {
    id: String,
}

impl InstagramClient {
    pub fn new(graph_url: String, user_id: String, access_token: String) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new("toolrelay/0.1.0")?,
            graph_url: graph_url.trim_end_matches('/').to_string(),
            user_id,
            access_token,
        })
    }

    /// Build from config, reading credentials from the configured env vars.
    pub fn from_config(config: &InstagramConfig) -> Result<Self> {
        let user_id = read_env(&config.user_id_env)?;
        let access_token = read_env(&config.access_token_env)?;
        Self::new(config.graph_url.clone(), user_id, access_token)
    }

    /// Post an image with a caption. Returns the published media id, or
    /// `None` if any step failed (the failure is logged).
    pub async fn post_image(&self, image_url: &str, caption: &str) -> Option<String> {
        match self.try_post_image(image_url, caption).await {
            Ok(id) => {
                info!(media_id = %id, "published Instagram post");
                Some(id)
            }
            Err(e) => {
                error!("Error posting to Instagram: {e}");
                None
            }
        }
    }

    async fn try_post_image(&self, image_url: &str, caption: &str) -> Result<String> {
        let image = self
            .http
            .get_bytes(image_url)
            .await
            .map_err(|e| Error::http(format!("Failed to fetch image from URL: {e}")))?;
        if image.is_empty() {
            return Err(Error::http("Failed to fetch image from URL: empty body"));
        }

        let container = self
            .post_graph(
                "media",
                &CreateContainer {
                    image_url,
                    caption,
                    access_token: &self.access_token,
                },
            )
            .await?;

        self.post_graph(
            "media_publish",
            &PublishContainer {
                creation_id: &container,
                access_token: &self.access_token,
            },
        )
        .await
    }

    async fn post_graph<T: Serialize>(&self, edge: &str, payload: &T) -> Result<String> {
        let url = format!("{}/{}/{edge}", self.graph_url, self.user_id);
        let body = serde_json::to_string(payload)
            .map_err(|e| Error::parse(format!("serialize request: {e}")))?;
        let raw = self.http.post_json_raw(&url, &body, &[]).await?;
        parse_graph_id(&raw)
    }
}

fn read_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::config(format!("{name} not set"))),
    }
}

fn parse_graph_id(raw: &str) -> Result<String> {
    serde_json::from_str::<GraphId>(raw)
        .map(|g| g.id)
        .map_err(|e| Error::parse(format!("parse Graph API response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_id_is_extracted() {
        assert_eq!(parse_graph_id(r#"{"id":"17895695668004550"}"#).unwrap(), "17895695668004550");
        assert!(parse_graph_id(r#"{"error":{"message":"bad token"}}"#).is_err());
    }

    #[test]
    fn missing_credentials_are_a_config_error() {
        let config = InstagramConfig {
            user_id_env: "TOOLRELAY_TEST_UNSET_IG_USER".into(),
            access_token_env: "TOOLRELAY_TEST_UNSET_IG_TOKEN".into(),
            ..InstagramConfig::default()
        };
        let err = InstagramClient::from_config(&config).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("TOOLRELAY_TEST_UNSET_IG_USER"));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client =
            InstagramClient::new("http://localhost:1/".into(), "42".into(), "t".into()).unwrap();
        assert_eq!(client.graph_url, "http://localhost:1");
    }
}

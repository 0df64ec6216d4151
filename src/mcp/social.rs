use crate::tools::instagram::InstagramClient;
use crate::tools::weather;
use rmcp::handler::server::tool::{Parameters, ToolRouter};
use rmcp::model::{Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ServerHandler, schemars, tool, tool_handler, tool_router};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct WeatherRequest {
    #[schemars(description = "City to get the weather for")]
    pub city: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct InstagramPostRequest {
    #[schemars(description = "Public URL of the image to post")]
    pub url: String,
    #[schemars(description = "Caption for the post")]
    pub caption: String,
}

/// Weather and Instagram tool server.
#[derive(Clone)]
pub struct SocialService {
    instagram: Option<Arc<InstagramClient>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl SocialService {
    /// `instagram` is `None` when credentials are missing; posting then
    /// always reports failure.
    pub fn new(instagram: Option<Arc<InstagramClient>>) -> Self {
        Self {
            instagram,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(name = "getWeather", description = "Get the weather for a city.")]
    async fn get_weather(
        &self,
        Parameters(WeatherRequest { city }): Parameters<WeatherRequest>,
    ) -> String {
        info!(%city, "weather requested");
        weather::describe(&city)
    }

    #[tool(
        name = "createInstagramPost",
        description = "Post an image from a public URL to Instagram with a caption."
    )]
    async fn create_instagram_post(
        &self,
        Parameters(InstagramPostRequest { url, caption }): Parameters<InstagramPostRequest>,
    ) -> String {
        let published = match &self.instagram {
            Some(client) => client.post_image(&url, &caption).await,
            None => None,
        };
        post_outcome(published.is_some()).to_string()
    }
}

fn post_outcome(published: bool) -> &'static str {
    if published {
        "Post published on instagram"
    } else {
        "Failed to post to Instagram"
    }
}

#[tool_handler]
impl ServerHandler for SocialService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "social".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::from_build_env()
            },
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some("Weather lookup and Instagram posting.".to_string()),
            ..Default::default()
        }
    }
}

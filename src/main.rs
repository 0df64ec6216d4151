use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use toolrelay::chat::ChatSession;
use toolrelay::config::{self, Config};
use toolrelay::llm;
use toolrelay::mcp::client::{Endpoint, RemoteTools, ToolProvider};
use toolrelay::mcp::files::FileService;
use toolrelay::mcp::serve::{serve_sse, serve_stdio, serve_streamable};
use toolrelay::mcp::session::SessionRegistry;
use toolrelay::mcp::social::SocialService;
use toolrelay::mcp::weather::{WEATHER_TOOL, WeatherService};
use toolrelay::tools::instagram::InstagramClient;
use tracing::{info, warn};

/// Build an LlmClient from config + optional CLI overrides.
fn build_llm_client(
    llm_config: &config::LlmConfig,
    provider: Option<String>,
    model: Option<String>,
) -> Result<llm::LlmClient> {
    let provider = provider
        .map(|p| llm::Provider::from_name(&p))
        .unwrap_or_else(|| llm_config.provider.clone());
    // A provider override without a model override gets that provider's default model.
    let model = match model {
        Some(m) => m,
        None if provider != llm_config.provider => provider.default_model().to_string(),
        None => llm_config.model.clone(),
    };
    let client = llm::LlmClient::from_config(
        provider,
        model,
        llm_config.max_tokens,
        llm_config.api_key_env.clone(),
        llm_config.base_url.clone(),
    )?;
    Ok(client)
}

/// Missing config file means defaults; a broken one is an error.
fn load_config(path: &Path) -> Result<Config> {
    let cfg = if path.exists() {
        Config::load(path)?
    } else {
        Config::default()
    };
    cfg.validate()?;
    Ok(cfg)
}

fn bind_addr(server: &config::ServerConfig, port: Option<u16>) -> Result<SocketAddr> {
    let ip: IpAddr = server
        .host
        .parse()
        .with_context(|| format!("invalid server.host {:?}", server.host))?;
    Ok(SocketAddr::new(ip, port.unwrap_or(server.port)))
}

#[derive(Parser)]
#[command(
    name = "toolrelay",
    about = "MCP tool servers (files, weather, Instagram) and an LLM chat client that calls them"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = "toolrelay.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum ServerTransport {
    Stdio,
    Sse,
    Http,
}

#[derive(Clone, Copy, ValueEnum)]
enum ClientTransport {
    Sse,
    Http,
    Stdio,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run one of the tool servers
    Serve {
        #[command(subcommand)]
        server: ServerKind,
    },

    /// Chat with the model; the model may call the server's tools
    Chat {
        /// How to reach the tool server
        #[arg(long, value_enum, default_value_t = ClientTransport::Sse)]
        transport: ClientTransport,

        /// Server URL (defaults to chat.sse_url / chat.http_url)
        #[arg(long)]
        url: Option<String>,

        /// LLM provider override: gemini, anthropic, openrouter, openai
        #[arg(long)]
        provider: Option<String>,

        /// LLM model override
        #[arg(long)]
        model: Option<String>,

        /// Model calls allowed per message
        #[arg(long)]
        max_steps: Option<u32>,

        /// Server command for --transport stdio (defaults to `toolrelay serve files`)
        #[arg(last = true)]
        server_command: Vec<String>,
    },

    /// Connect to the weather server, call get-weather and print notifications
    Probe {
        /// Server URL (defaults to chat.http_url)
        #[arg(long)]
        url: Option<String>,

        #[arg(long, default_value = "Karachi")]
        city: String,
    },
}

#[derive(clap::Subcommand)]
enum ServerKind {
    /// File-management tools: writeFile, readFile, listDirectory, moveFile, getFileInfo
    Files {
        #[arg(long, value_enum, default_value_t = ServerTransport::Stdio)]
        transport: ServerTransport,

        /// Port for sse/http (overrides MCP_PORT and server.port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Weather and Instagram tools: getWeather, createInstagramPost
    Social {
        #[arg(long, value_enum, default_value_t = ServerTransport::Sse)]
        transport: ServerTransport,

        #[arg(long)]
        port: Option<u16>,
    },

    /// get-weather over streamable HTTP with session tracking and notifications
    Weather {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout belongs to the stdio transport
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("toolrelay=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.command {
        Command::Serve { server } => run_server(server, &cfg).await?,
        Command::Chat {
            transport,
            url,
            provider,
            model,
            max_steps,
            server_command,
        } => {
            let endpoint = match transport {
                ClientTransport::Sse => Endpoint::Sse {
                    url: url.unwrap_or_else(|| cfg.chat.sse_url.clone()),
                },
                ClientTransport::Http => Endpoint::Http {
                    url: url.unwrap_or_else(|| cfg.chat.http_url.clone()),
                },
                ClientTransport::Stdio => stdio_endpoint(server_command)?,
            };
            let llm = build_llm_client(&cfg.llm, provider, model)?;
            info!(provider = ?llm.provider(), model = llm.model(), "using model");

            let remote = RemoteTools::connect(&endpoint).await?;
            let tools = remote.list_tools().await?;
            info!(
                tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                "tools available"
            );

            let mut session = ChatSession::new(
                llm,
                remote,
                cfg.chat.system_prompt.clone(),
                max_steps.unwrap_or(cfg.chat.max_steps),
            );
            session
                .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
                .await?;
            session.into_provider().close().await?;
        }
        Command::Probe { url, city } => {
            let url = url.unwrap_or_else(|| cfg.chat.http_url.clone());
            let remote = RemoteTools::connect(&Endpoint::Http { url }).await?;

            for tool in remote.list_tools().await? {
                println!("tool: {} - {}", tool.name, tool.description);
            }
            let output = remote
                .call_tool(WEATHER_TOOL, json!({ "city": city }))
                .await?;
            println!("{}", output.to_model_text());

            info!("listening for notifications, Ctrl-C to quit");
            tokio::select! {
                done = remote.wait_for_completion() => done?,
                _ = tokio::signal::ctrl_c() => info!("interrupted"),
            }
        }
    }

    Ok(())
}

fn stdio_endpoint(server_command: Vec<String>) -> Result<Endpoint> {
    let mut parts = server_command.into_iter();
    match parts.next() {
        Some(command) => Ok(Endpoint::Stdio {
            command,
            args: parts.collect(),
        }),
        None => {
            let exe = std::env::current_exe().context("cannot locate own executable")?;
            Ok(Endpoint::Stdio {
                command: exe.to_string_lossy().into_owned(),
                args: vec!["serve".into(), "files".into()],
            })
        }
    }
}

async fn run_server(server: ServerKind, cfg: &Config) -> Result<()> {
    let every = Duration::from_secs(cfg.server.tool_list_interval_secs);
    match server {
        ServerKind::Files { transport, port } => match transport {
            ServerTransport::Stdio => serve_stdio(FileService::new()).await?,
            ServerTransport::Sse => serve_sse(bind_addr(&cfg.server, port)?, FileService::new).await?,
            ServerTransport::Http => {
                serve_streamable(
                    bind_addr(&cfg.server, port)?,
                    FileService::new,
                    Arc::new(SessionRegistry::new()),
                    every,
                )
                .await?
            }
        },
        ServerKind::Social { transport, port } => {
            let instagram = match InstagramClient::from_config(&cfg.instagram) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!("Instagram disabled: {e}");
                    None
                }
            };
            let factory = move || SocialService::new(instagram.clone());
            match transport {
                ServerTransport::Stdio => serve_stdio(factory()).await?,
                ServerTransport::Sse => serve_sse(bind_addr(&cfg.server, port)?, factory).await?,
                ServerTransport::Http => {
                    serve_streamable(
                        bind_addr(&cfg.server, port)?,
                        factory,
                        Arc::new(SessionRegistry::new()),
                        every,
                    )
                    .await?
                }
            }
        }
        ServerKind::Weather { port } => {
            let registry = Arc::new(SessionRegistry::new());
            let factory = {
                let registry = registry.clone();
                move || WeatherService::new(registry.clone())
            };
            serve_streamable(bind_addr(&cfg.server, port)?, factory, registry, every).await?
        }
    }
    Ok(())
}

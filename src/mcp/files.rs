use crate::tools::fs::{self, FileOperationResult};
use rmcp::handler::server::tool::{Parameters, ToolRouter};
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ServerHandler, schemars, tool, tool_handler, tool_router};
use std::path::Path;

use super::McpError;

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WriteFileRequest {
    #[schemars(description = "Path of the file to write")]
    pub file_path: String,
    #[schemars(description = "Text content to write")]
    pub content: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FilePathRequest {
    #[schemars(description = "Path of the file")]
    pub file_path: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListDirectoryRequest {
    #[schemars(description = "Path of the directory to list")]
    pub dir_path: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MoveFileRequest {
    #[schemars(description = "Current path of the file")]
    pub old_path: String,
    #[schemars(description = "Destination path")]
    pub new_path: String,
}

/// File-management tool server.
#[derive(Clone)]
pub struct FileService {
    tool_router: ToolRouter<Self>,
}

impl Default for FileService {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_router]
impl FileService {
    pub fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "writeFile",
        description = "Write text to a file, creating parent directories when needed."
    )]
    async fn write_file(
        &self,
        Parameters(WriteFileRequest { file_path, content }): Parameters<WriteFileRequest>,
    ) -> Result<CallToolResult, McpError> {
        let result = fs::write_file(Path::new(&file_path), &content).await;
        Ok(to_call_result(&result, result.message.clone()))
    }

    #[tool(name = "readFile", description = "Read a text file and return its content.")]
    async fn read_file(
        &self,
        Parameters(FilePathRequest { file_path }): Parameters<FilePathRequest>,
    ) -> Result<CallToolResult, McpError> {
        let result = fs::read_file(Path::new(&file_path)).await;
        Ok(to_call_result(&result, result.render(Some("Content"))))
    }

    #[tool(
        name = "listDirectory",
        description = "List the entries of a directory, tagged [DIR] or [FILE]."
    )]
    async fn list_directory(
        &self,
        Parameters(ListDirectoryRequest { dir_path }): Parameters<ListDirectoryRequest>,
    ) -> Result<CallToolResult, McpError> {
        let result = fs::list_directory(Path::new(&dir_path)).await;
        Ok(to_call_result(&result, result.render(Some("LIST"))))
    }

    #[tool(name = "moveFile", description = "Move or rename a file.")]
    async fn move_file(
        &self,
        Parameters(MoveFileRequest { old_path, new_path }): Parameters<MoveFileRequest>,
    ) -> Result<CallToolResult, McpError> {
        let result = fs::move_file(Path::new(&old_path), Path::new(&new_path)).await;
        Ok(to_call_result(&result, result.render(None)))
    }

    #[tool(
        name = "getFileInfo",
        description = "Report size, timestamps, type and permissions of a file or directory."
    )]
    async fn get_file_info(
        &self,
        Parameters(FilePathRequest { file_path }): Parameters<FilePathRequest>,
    ) -> Result<CallToolResult, McpError> {
        let result = fs::file_info(Path::new(&file_path)).await;
        Ok(to_call_result(&result, result.render(Some("INFO"))))
    }
}

fn to_call_result(result: &FileOperationResult, text: String) -> CallToolResult {
    if result.success {
        CallToolResult::success(vec![Content::text(text)])
    } else {
        CallToolResult::error(vec![Content::text(result.message.clone())])
    }
}

#[tool_handler]
impl ServerHandler for FileService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "filesystem".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::from_build_env()
            },
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Tools for writing, reading, listing, moving and inspecting local files."
                    .to_string(),
            ),
            ..Default::default()
        }
    }
}

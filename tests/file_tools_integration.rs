use rmcp::ServiceExt;
use serde_json::json;
use toolrelay::mcp::client::{RemoteTools, ToolProvider};
use toolrelay::mcp::files::FileService;
use toolrelay::tools::fs;

async fn connect_file_server() -> RemoteTools {
    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        let server = FileService::new().serve(server_io).await?;
        server.waiting().await?;
        anyhow::Ok(())
    });
    RemoteTools::over(client_io).await.unwrap()
}

#[tokio::test]
async fn write_creates_parents_and_read_returns_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/deeper/note.txt");

    let written = fs::write_file(&path, "hello").await;
    assert!(written.success, "write failed: {}", written.message);
    assert_eq!(
        written.message,
        format!("File successfully written to {}", path.display())
    );

    let read = fs::read_file(&path).await;
    assert!(read.success);
    assert_eq!(read.data.as_deref(), Some("hello"));
}

#[tokio::test]
async fn read_missing_file_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.txt");
    let read = fs::read_file(&path).await;
    assert!(!read.success);
    assert_eq!(read.message, format!("File not found: {}", path.display()));
}

#[tokio::test]
async fn move_file_relocates_and_reports_missing_source() {
    let dir = tempfile::tempdir().unwrap();
    let from = dir.path().join("a.txt");
    let to = dir.path().join("moved/b.txt");
    std::fs::write(&from, "x").unwrap();

    let moved = fs::move_file(&from, &to).await;
    assert!(moved.success, "move failed: {}", moved.message);
    assert!(!from.exists());
    assert_eq!(std::fs::read_to_string(&to).unwrap(), "x");

    let again = fs::move_file(&from, &to).await;
    assert!(!again.success);
    assert!(again.message.starts_with("Source file does not exist:"));
}

#[tokio::test]
async fn list_directory_is_sorted_and_tagged() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("b.txt"), "").unwrap();
    std::fs::write(dir.path().join("a.txt"), "").unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();

    let listed = fs::list_directory(dir.path()).await;
    assert!(listed.success);
    assert_eq!(
        listed.data.as_deref(),
        Some("[FILE] a.txt\n[FILE] b.txt\n[DIR] sub")
    );

    let file = dir.path().join("a.txt");
    let not_dir = fs::list_directory(&file).await;
    assert!(!not_dir.success);
    assert_eq!(
        not_dir.message,
        format!("Path is not a directory: {}", file.display())
    );

    let missing = fs::list_directory(&dir.path().join("nope")).await;
    assert!(missing.message.starts_with("Directory does not exist:"));
}

#[tokio::test]
async fn file_info_reports_size_and_kind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("five.txt");
    std::fs::write(&path, "12345").unwrap();

    let info = fs::file_info(&path).await;
    assert!(info.success);
    let data = info.data.unwrap();
    assert!(data.contains("size: 5"), "{data}");
    assert!(data.contains("isFile: true"));
    assert!(data.contains("isDirectory: false"));
    assert!(data.lines().any(|l| l.starts_with("modified: ")));
}

#[tokio::test]
async fn server_declares_the_five_file_tools() {
    let remote = connect_file_server().await;
    let mut names: Vec<String> = remote
        .list_tools()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    names.sort();
    assert_eq!(
        names,
        ["getFileInfo", "listDirectory", "moveFile", "readFile", "writeFile"]
    );

    let tools = remote.list_tools().await.unwrap();
    let write = tools.iter().find(|t| t.name == "writeFile").unwrap();
    assert!(write.input_schema["properties"]["filePath"].is_object());
    assert!(write.input_schema["properties"]["content"].is_object());
    remote.close().await.unwrap();
}

#[tokio::test]
async fn server_round_trip_renders_results() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docs/readme.md");
    let path_str = path.to_string_lossy().to_string();
    let remote = connect_file_server().await;

    let written = remote
        .call_tool(
            "writeFile",
            json!({"filePath": path_str, "content": "# hi"}),
        )
        .await
        .unwrap();
    assert!(!written.is_error);
    assert_eq!(
        written.to_model_text(),
        format!("File successfully written to {path_str}")
    );

    let read = remote
        .call_tool("readFile", json!({"filePath": path_str}))
        .await
        .unwrap();
    assert_eq!(
        read.to_model_text(),
        format!("Message: File successfully read from {path_str} \nContent: # hi")
    );

    let listed = remote
        .call_tool(
            "listDirectory",
            json!({"dirPath": dir.path().join("docs").to_string_lossy()}),
        )
        .await
        .unwrap();
    assert!(listed.to_model_text().ends_with("\nLIST: [FILE] readme.md"));

    let missing = remote
        .call_tool(
            "readFile",
            json!({"filePath": dir.path().join("gone.txt").to_string_lossy()}),
        )
        .await
        .unwrap();
    assert!(missing.is_error);
    assert!(missing.to_model_text().starts_with("File not found:"));

    remote.close().await.unwrap();
}

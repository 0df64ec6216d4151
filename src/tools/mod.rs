// Local operations behind the MCP tools: filesystem, weather, Instagram.

pub mod fs;
pub mod instagram;
pub mod weather;

// tools.rs — Bridge mediator tools into the isolate.
//
// Each aggregated tool becomes a synchronous ToolFn: package the script's
// map argument as a JSON-RPC tools/call, block on the mediator's answer,
// render the content blocks as text. The block_on is safe because tool
// functions only ever run on blocking threads, never on a runtime worker.

use rmcp::model::{CallToolRequestParams, CallToolResult, RawContent};
use rmcp::service::{Peer, RoleClient};
use tokio::runtime::Handle;

use crate::isolate::ToolFn;

/// Build one ToolFn per exposed mediator tool.
pub fn mediator_tools(
    peer: Peer<RoleClient>,
    runtime: Handle,
    tool_names: Vec<String>,
) -> Vec<(String, ToolFn)> {
    tool_names
        .into_iter()
        .map(|name| {
            let peer = peer.clone();
            let runtime = runtime.clone();
            let tool = name.clone();
            let f: ToolFn = Box::new(move |arguments| {
                let peer = peer.clone();
                let params = CallToolRequestParams {
                    meta: None,
                    name: tool.clone().into(),
                    arguments: Some(arguments),
                    task: None,
                };
                let result = runtime
                    .block_on(async move { peer.call_tool(params).await })
                    .map_err(|error| format!("tool '{tool}' failed: {error}"))?;

                let text = render_result(&result);
                if result.is_error.unwrap_or(false) {
                    // Denied or failed calls abort the script with the
                    // mediator's explanation.
                    Err(text)
                } else {
                    Ok(text)
                }
            });
            (name, f)
        })
        .collect()
}

/// Flatten a tool result into text for the script.
fn render_result(result: &CallToolResult) -> String {
    let mut parts: Vec<String> = result
        .content
        .iter()
        .filter_map(|content| match &content.raw {
            RawContent::Text(text) => Some(text.text.clone()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        if let Some(structured) = &result.structured_content {
            parts.push(structured.to_string());
        }
    }
    parts.join("\n")
}

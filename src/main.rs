//! mcpez CLI binary entry point.

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use futures::stream::{self, StreamExt};
use mcpez::cli::{ChatArgs, Cli, Commands, ServerArgs};
use mcpez::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("MCPEZ_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Chat(args) => handle_chat(args).await,
        Commands::Tools(args) => handle_tools(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn handle_chat(args: ChatArgs) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut engine = ChatEngine::new(ChatConfig::from_env()?);
    if let Some(system) = &args.system {
        engine = engine.with_system_prompt(system.clone());
    }
    if let Some(router) = args.servers.connect().await? {
        engine = engine.with_tool_executor(router);
    }

    let bus = engine
        .create_with(&args.prompt, &Attachments::new(), args.create_options())
        .await?;

    let mut names = vec![
        channel::CONTENT,
        channel::TOOL_REQUEST,
        channel::TOOL_RESPONSE,
        channel::FINAL,
    ];
    if args.show_reasoning {
        names.push("reasoning");
    }
    let channels = names
        .into_iter()
        .map(|name| bus.on(name))
        .collect::<mcpez::Result<Vec<_>>>()?;
    let mut events = stream::select_all(channels);

    let mut streamed = false;
    while let Some(item) = events.next().await {
        let event = item.map_err(|e| e.to_string())?;
        match event.as_ref() {
            StreamEvent::Content { content, .. } => {
                streamed = true;
                print!("{content}");
                let _ = std::io::stdout().flush();
            }
            StreamEvent::ToolRequest { tool_calls, .. } => {
                for call in tool_calls {
                    eprintln!("\n⚡ {}({}) [{}]", call.function.name, call.function.arguments, call.id);
                }
            }
            StreamEvent::ToolResponse { tool_results, .. } => {
                for result in tool_results {
                    eprintln!("  ↳ {}", truncate(&result.text(), 200));
                }
            }
            StreamEvent::Final { message } => {
                if !streamed {
                    print!("{}", message.text());
                }
            }
            StreamEvent::Filtered { delta, .. } => {
                if let Some(text) = delta.pointer("/choices/0/delta/reasoning").and_then(|v| v.as_str()) {
                    eprint!("{text}");
                }
            }
            StreamEvent::ToolCalls { .. } => {}
        }
    }

    println!();
    Ok(())
}

async fn handle_tools(args: ServerArgs) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = if args.is_empty() {
        ServerArgs {
            default_servers: true,
            ..args
        }
    } else {
        args
    };
    let Some(router) = args.connect().await? else {
        return Ok(());
    };
    print_catalogue(&router);
    Ok(())
}

fn print_catalogue(router: &Arc<ToolRouter>) {
    for tool in router.tools() {
        let function = tool.get("function").unwrap_or(&tool);
        let name = mcpez::mcp::schema::tool_name(&tool).unwrap_or_default();
        let description = function.get("description").and_then(|d| d.as_str()).unwrap_or("");
        let server = router.server_for(name).unwrap_or("?");
        println!("{name:<32} {server:<16} {description}");
    }
}

/// Cut `text` to at most `max` bytes on a char boundary.
fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

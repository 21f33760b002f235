//! Terminal chat client: streams one prompt to a local Ollama server or the
//! OpenAI API and prints the reply as it arrives.

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use tracing::debug;

use termchat_stream::prelude::*;
use termchat_stream::render::{DisplaySink, InlineStyle, RenderBlock, RenderSnapshot};
use termchat_stream::vendors::ollama::OllamaProvider;
use termchat_stream::vendors::openai::OpenAiProvider;

#[derive(Parser, Debug)]
#[command(name = "termchat", about = "Stream a chat reply to your terminal")]
struct Cli {
    /// Prompt to send.
    prompt: String,

    /// Model to use. Prefix with `openai/` to route to OpenAI; anything else
    /// targets the local Ollama server.
    #[arg(short, long, default_value = "llama3")]
    model: String,

    /// Optional system prompt.
    #[arg(short, long)]
    system: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    /// Re-render the accumulated reply as markdown instead of printing raw
    /// deltas.
    #[arg(long)]
    markdown: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    termchat_stream::init_observability();
    let cli = Cli::parse();

    let mut builder = ChatClient::builder()
        .register_provider(Arc::new(OllamaProvider::from_env()?));
    if std::env::var("OPENAI_API_KEY")
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false)
    {
        builder = builder.register_provider(Arc::new(OpenAiProvider::from_env()?));
    }
    let client = builder.build()?;

    let model = ModelRef::parse(&cli.model);
    debug!(provider = %model.provider, model = %model.model, "dispatching prompt");

    let mut request = client
        .request(model)
        .user_text(&cli.prompt)
        .timeout(Duration::from_secs(cli.timeout_secs));
    if let Some(system) = &cli.system {
        request = request.system_prompt(system);
    }

    let handle = request
        .start_stream()
        .await
        .context("failed to start stream")?;

    if cli.markdown {
        let mut sink = AnsiSink::default();
        termchat_stream::render_stream(handle, &mut sink).await?;
        return Ok(());
    }

    stream_raw(handle).await
}

async fn stream_raw(mut handle: StreamHandle) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    while let Some(delta) = handle.next_delta().await {
        if delta.is_final {
            break;
        }
        stdout.write_all(delta.text.as_bytes())?;
        stdout.flush()?;
    }
    handle.finish().await?;
    println!();
    Ok(())
}

/// Repaints the whole reply on every snapshot using ANSI styling.
///
/// Clears from the previous paint position rather than the whole screen so
/// scrollback above the reply is preserved.
#[derive(Default)]
struct AnsiSink {
    painted_lines: usize,
}

impl DisplaySink for AnsiSink {
    fn paint(&mut self, snapshot: &RenderSnapshot) {
        let out = format_snapshot(snapshot);
        if self.painted_lines > 0 {
            // move back to the start of the previous paint and clear down
            print!("\x1b[{}F\x1b[0J", self.painted_lines);
        }
        print!("{out}");
        let _ = std::io::stdout().flush();
        self.painted_lines = out.lines().count();
    }
}

fn format_snapshot(snapshot: &RenderSnapshot) -> String {
    let mut out = String::new();
    for block in &snapshot.blocks {
        match block {
            RenderBlock::Heading { level, spans } => {
                out.push_str(&"#".repeat(usize::from(*level)));
                out.push(' ');
                out.push_str("\x1b[1m");
                push_spans(&mut out, spans);
                out.push_str("\x1b[0m\n\n");
            }
            RenderBlock::Paragraph { spans } => {
                push_spans(&mut out, spans);
                out.push_str("\n\n");
            }
            RenderBlock::CodeBlock { text, .. } => {
                for line in text.lines() {
                    out.push_str("    \x1b[2m");
                    out.push_str(line);
                    out.push_str("\x1b[0m\n");
                }
                out.push('\n');
            }
            RenderBlock::List { ordered, items } => {
                for (i, item) in items.iter().enumerate() {
                    if *ordered {
                        out.push_str(&format!("{}. ", i + 1));
                    } else {
                        out.push_str("- ");
                    }
                    push_spans(&mut out, item);
                    out.push('\n');
                }
                out.push('\n');
            }
            RenderBlock::BlockQuote { spans } => {
                out.push_str("> ");
                push_spans(&mut out, spans);
                out.push_str("\n\n");
            }
            RenderBlock::Rule => out.push_str("---\n\n"),
        }
    }
    out
}

fn push_spans(out: &mut String, spans: &[termchat_stream::render::InlineSpan]) {
    for span in spans {
        let code = style_code(&span.style);
        if code.is_empty() {
            out.push_str(&span.text);
        } else {
            out.push_str(&format!("\x1b[{code}m{}\x1b[0m", span.text));
        }
    }
}

fn style_code(style: &InlineStyle) -> String {
    let mut codes: Vec<&str> = Vec::new();
    if style.bold {
        codes.push("1");
    }
    if style.italic {
        codes.push("3");
    }
    if style.strikethrough {
        codes.push("9");
    }
    if style.code {
        codes.push("7");
    }
    codes.join(";")
}

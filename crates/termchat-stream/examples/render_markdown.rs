//! Offline demo: feed markdown in chunks and print the evolving snapshot.

use termchat_stream::render::{RenderBlock, render};

fn main() {
    let chunks = [
        "# Greet",
        "ing\n\nHello **ter",
        "minal** reader.\n\n```sh\necho hi",
        "\n```\n",
    ];

    let mut accumulated = String::new();
    for chunk in chunks {
        accumulated.push_str(chunk);
        let snapshot = render(&accumulated);
        println!("--- after {:?} ---", chunk);
        for block in &snapshot.blocks {
            match block {
                RenderBlock::Heading { level, spans } => {
                    println!("[h{level}] {}", text_of(spans));
                }
                RenderBlock::Paragraph { spans } => println!("[p] {}", text_of(spans)),
                RenderBlock::CodeBlock { language, text } => {
                    println!("[code {:?}] {}", language, text.trim_end());
                }
                RenderBlock::List { ordered, items } => {
                    for item in items {
                        let marker = if *ordered { "1." } else { "-" };
                        println!("[li] {marker} {}", text_of(item));
                    }
                }
                RenderBlock::BlockQuote { spans } => println!("[q] {}", text_of(spans)),
                RenderBlock::Rule => println!("[hr]"),
            }
        }
    }
}

fn text_of(spans: &[termchat_stream::render::InlineSpan]) -> String {
    spans.iter().map(|s| s.text.as_str()).collect()
}

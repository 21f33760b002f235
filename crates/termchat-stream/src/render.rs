//! Incremental markdown renderer.
//!
//! `render` is a pure function over the accumulated text and is recomputed
//! from scratch after every applied delta. Reparsing the whole text is the
//! simplest policy that stays correct for syntactically incomplete markdown:
//! an unterminated code fence or emphasis marker renders best-effort now and
//! converges to the exact final rendering once the text completes.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::errors::ChatError;
use crate::run::StreamHandle;

/// Inline style flags for one span of text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InlineStyle {
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
    pub strikethrough: bool,
}

/// A run of text sharing one inline style.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineSpan {
    pub text: String,
    pub style: InlineStyle,
}

impl InlineSpan {
    fn new(text: impl Into<String>, style: InlineStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

/// One display-ready block of the rendered output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderBlock {
    Heading { level: u8, spans: Vec<InlineSpan> },
    Paragraph { spans: Vec<InlineSpan> },
    CodeBlock { language: Option<String>, text: String },
    List { ordered: bool, items: Vec<Vec<InlineSpan>> },
    BlockQuote { spans: Vec<InlineSpan> },
    Rule,
}

/// The display output for the accumulated text at one point in time.
///
/// Snapshots have no identity beyond the stream they were derived from and
/// are never persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderSnapshot {
    pub blocks: Vec<RenderBlock>,
}

impl RenderSnapshot {
    /// Flattens the snapshot back to plain text, one blank line between
    /// blocks. Mostly useful for tests and simple sinks.
    pub fn plain_text(&self) -> String {
        let mut parts = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            match block {
                RenderBlock::Heading { spans, .. }
                | RenderBlock::Paragraph { spans }
                | RenderBlock::BlockQuote { spans } => parts.push(spans_text(spans)),
                RenderBlock::CodeBlock { text, .. } => parts.push(text.clone()),
                RenderBlock::List { items, .. } => {
                    let lines: Vec<String> =
                        items.iter().map(|item| spans_text(item)).collect();
                    parts.push(lines.join("\n"));
                }
                RenderBlock::Rule => parts.push("---".into()),
            }
        }
        parts.join("\n\n")
    }
}

fn spans_text(spans: &[InlineSpan]) -> String {
    spans.iter().map(|s| s.text.as_str()).collect()
}

struct ListCtx {
    ordered: bool,
    items: Vec<Vec<InlineSpan>>,
}

#[derive(Default)]
struct SnapshotBuilder {
    blocks: Vec<RenderBlock>,
    spans: Vec<InlineSpan>,
    bold: usize,
    italic: usize,
    strike: usize,
    code_block: Option<(Option<String>, String)>,
    heading: Option<u8>,
    quote_depth: usize,
    lists: Vec<ListCtx>,
    item_depth: usize,
}

impl SnapshotBuilder {
    fn style(&self) -> InlineStyle {
        InlineStyle {
            bold: self.bold > 0,
            italic: self.italic > 0,
            code: false,
            strikethrough: self.strike > 0,
        }
    }

    fn push_text(&mut self, text: &str, style: InlineStyle) {
        if text.is_empty() {
            return;
        }
        if let Some(last) = self.spans.last_mut()
            && last.style == style
        {
            last.text.push_str(text);
            return;
        }
        self.spans.push(InlineSpan::new(text, style));
    }

    fn close_spans(&mut self) {
        let spans = std::mem::take(&mut self.spans);
        if spans.is_empty() {
            return;
        }
        if self.item_depth > 0 {
            if let Some(ctx) = self.lists.last_mut()
                && let Some(item) = ctx.items.last_mut()
            {
                item.extend(spans);
            }
        } else if self.quote_depth > 0 {
            self.blocks.push(RenderBlock::BlockQuote { spans });
        } else {
            self.blocks.push(RenderBlock::Paragraph { spans });
        }
    }

    fn finish(mut self) -> RenderSnapshot {
        // the parser closes open tags at end of input, but flush defensively
        if let Some((language, text)) = self.code_block.take() {
            self.blocks.push(RenderBlock::CodeBlock { language, text });
        }
        self.close_spans();
        while let Some(ctx) = self.lists.pop() {
            self.blocks.push(RenderBlock::List {
                ordered: ctx.ordered,
                items: ctx.items,
            });
        }
        RenderSnapshot {
            blocks: self.blocks,
        }
    }
}

/// Renders the accumulated text to its display-ready representation.
///
/// Pure: the same input always yields the same snapshot, so repainting an
/// unchanged snapshot is always safe for the display collaborator.
pub fn render(text: &str) -> RenderSnapshot {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(text, options);

    let mut b = SnapshotBuilder::default();
    for event in parser {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                b.heading = Some(level as u8);
            }
            Event::End(TagEnd::Heading(_)) => {
                let level = b.heading.take().unwrap_or(1);
                let spans = std::mem::take(&mut b.spans);
                b.blocks.push(RenderBlock::Heading { level, spans });
            }
            Event::Start(Tag::Paragraph) => {}
            Event::End(TagEnd::Paragraph) => b.close_spans(),
            Event::Start(Tag::BlockQuote) => b.quote_depth += 1,
            Event::End(TagEnd::BlockQuote) => b.quote_depth = b.quote_depth.saturating_sub(1),
            Event::Start(Tag::List(start)) => b.lists.push(ListCtx {
                ordered: start.is_some(),
                items: Vec::new(),
            }),
            Event::End(TagEnd::List(_)) => {
                if let Some(ctx) = b.lists.pop() {
                    if let Some(parent) = b.lists.last_mut() {
                        // nested lists flatten into the enclosing list
                        parent.items.extend(ctx.items);
                    } else {
                        b.blocks.push(RenderBlock::List {
                            ordered: ctx.ordered,
                            items: ctx.items,
                        });
                    }
                }
            }
            Event::Start(Tag::Item) => {
                b.item_depth += 1;
                if let Some(ctx) = b.lists.last_mut() {
                    ctx.items.push(Vec::new());
                }
            }
            Event::End(TagEnd::Item) => {
                let spans = std::mem::take(&mut b.spans);
                if let Some(ctx) = b.lists.last_mut()
                    && let Some(item) = ctx.items.last_mut()
                {
                    item.extend(spans);
                }
                b.item_depth = b.item_depth.saturating_sub(1);
            }
            Event::Start(Tag::CodeBlock(kind)) => {
                let language = match kind {
                    CodeBlockKind::Fenced(info) => {
                        let lang = info.split_whitespace().next().unwrap_or_default();
                        (!lang.is_empty()).then(|| lang.to_string())
                    }
                    CodeBlockKind::Indented => None,
                };
                b.code_block = Some((language, String::new()));
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((language, text)) = b.code_block.take() {
                    b.blocks.push(RenderBlock::CodeBlock { language, text });
                }
            }
            Event::Start(Tag::Strong) => b.bold += 1,
            Event::End(TagEnd::Strong) => b.bold = b.bold.saturating_sub(1),
            Event::Start(Tag::Emphasis) => b.italic += 1,
            Event::End(TagEnd::Emphasis) => b.italic = b.italic.saturating_sub(1),
            Event::Start(Tag::Strikethrough) => b.strike += 1,
            Event::End(TagEnd::Strikethrough) => b.strike = b.strike.saturating_sub(1),
            Event::Text(text) => {
                if let Some((_, code)) = b.code_block.as_mut() {
                    code.push_str(&text);
                } else {
                    let style = b.style();
                    b.push_text(&text, style);
                }
            }
            Event::Code(text) => {
                let style = InlineStyle {
                    code: true,
                    ..b.style()
                };
                b.push_text(&text, style);
            }
            Event::Html(text) | Event::InlineHtml(text) => {
                let style = b.style();
                b.push_text(&text, style);
            }
            Event::SoftBreak => {
                let style = b.style();
                b.push_text(" ", style);
            }
            Event::HardBreak => {
                let style = b.style();
                b.push_text("\n", style);
            }
            Event::Rule => b.blocks.push(RenderBlock::Rule),
            Event::TaskListMarker(checked) => {
                let style = b.style();
                b.push_text(if checked { "[x] " } else { "[ ] " }, style);
            }
            // links, images, tables and footnotes keep their text children
            _ => {}
        }
    }
    b.finish()
}

/// Display collaborator: paints snapshots in the order they are produced.
///
/// Implementations must tolerate being handed the same snapshot shape twice
/// (idempotent repaint).
pub trait DisplaySink {
    fn paint(&mut self, snapshot: &RenderSnapshot);
}

/// Drives a stream to its terminal state, re-rendering the accumulated text
/// after every applied delta and painting each snapshot in arrival order.
///
/// Returns what `StreamHandle::finish` returns for the same handle.
pub async fn render_stream(
    mut handle: StreamHandle,
    sink: &mut dyn DisplaySink,
) -> Result<String, ChatError> {
    let mut accumulated = String::new();
    while let Some(delta) = handle.next_delta().await {
        accumulated.push_str(&delta.text);
        sink.paint(&render(&accumulated));
        if delta.is_final {
            break;
        }
    }
    handle.finish().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_is_pure_and_idempotent() {
        let text = "# Hi\n\nSome **bold** text with `code`.\n";
        assert_eq!(render(text), render(text));
    }

    #[test]
    fn heading_and_paragraph_structure() {
        let snapshot = render("# Title\n\nBody **bold** tail.");
        assert_eq!(snapshot.blocks.len(), 2);
        assert!(matches!(
            &snapshot.blocks[0],
            RenderBlock::Heading { level: 1, spans } if spans_text(spans) == "Title"
        ));
        match &snapshot.blocks[1] {
            RenderBlock::Paragraph { spans } => {
                assert_eq!(spans.len(), 3);
                assert!(!spans[0].style.bold);
                assert!(spans[1].style.bold);
                assert_eq!(spans[1].text, "bold");
                assert_eq!(spans_text(spans), "Body bold tail.");
            }
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    #[test]
    fn inline_code_spans_are_marked() {
        let snapshot = render("run `cargo check` now");
        match &snapshot.blocks[0] {
            RenderBlock::Paragraph { spans } => {
                let code: Vec<&InlineSpan> =
                    spans.iter().filter(|s| s.style.code).collect();
                assert_eq!(code.len(), 1);
                assert_eq!(code[0].text, "cargo check");
            }
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    #[test]
    fn fenced_code_block_keeps_language_and_text() {
        let snapshot = render("```rust\nfn main() {}\n```\n");
        assert_eq!(
            snapshot.blocks,
            vec![RenderBlock::CodeBlock {
                language: Some("rust".into()),
                text: "fn main() {}\n".into(),
            }]
        );
    }

    #[test]
    fn unterminated_code_fence_is_tolerated() {
        let partial = render("intro\n\n```rust\nfn main() {");
        assert!(partial
            .blocks
            .iter()
            .any(|b| matches!(b, RenderBlock::CodeBlock { language: Some(l), .. } if l == "rust")));
    }

    #[test]
    fn unterminated_emphasis_is_tolerated() {
        // an unclosed marker renders as literal text rather than erroring
        let partial = render("some **bo");
        assert_eq!(partial.plain_text(), "some **bo");

        let complete = render("some **bold**");
        match &complete.blocks[0] {
            RenderBlock::Paragraph { spans } => {
                assert!(spans.iter().any(|s| s.style.bold && s.text == "bold"));
            }
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    #[test]
    fn every_streaming_prefix_renders_and_converges() {
        let full = "# Title\n\nA **bold** list:\n\n- one\n- two\n\n```sh\nls -l\n```\n";
        let mut last = RenderSnapshot::default();
        let mut buf = String::new();
        for ch in full.chars() {
            buf.push(ch);
            last = render(&buf);
        }
        assert_eq!(last, render(full));
    }

    #[test]
    fn lists_and_quotes_and_rules() {
        let snapshot = render("> wisdom\n\n- a\n- b\n\n1. x\n\n---\n");
        assert!(matches!(
            &snapshot.blocks[0],
            RenderBlock::BlockQuote { spans } if spans_text(spans) == "wisdom"
        ));
        assert!(matches!(
            &snapshot.blocks[1],
            RenderBlock::List { ordered: false, items } if items.len() == 2
        ));
        assert!(matches!(
            &snapshot.blocks[2],
            RenderBlock::List { ordered: true, items } if items.len() == 1
        ));
        assert!(matches!(&snapshot.blocks[3], RenderBlock::Rule));
    }

    #[test]
    fn plain_text_flattens_blocks() {
        let snapshot = render("# T\n\nbody\n\n- a\n- b\n");
        assert_eq!(snapshot.plain_text(), "T\n\nbody\n\na\nb");
    }

    mod streaming {
        use super::*;
        use crate::client::ChatClient;
        use crate::errors::ProviderError;
        use crate::model::{ModelRef, ProviderId};
        use crate::provider::{
            ProviderAdapter, ProviderEvent, ProviderRequest, ProviderStreamHandle,
        };
        use crate::session::SessionConfig;
        use crate::stream::Delta;
        use futures::stream;
        use std::sync::Arc;

        struct ScriptedProvider {
            chunks: Vec<&'static str>,
        }

        #[async_trait::async_trait]
        impl ProviderAdapter for ScriptedProvider {
            fn id(&self) -> ProviderId {
                ProviderId::new("fake")
            }

            async fn start_stream(
                &self,
                _req: ProviderRequest,
            ) -> Result<ProviderStreamHandle, ProviderError> {
                let mut events: Vec<Result<ProviderEvent, ProviderError>> = self
                    .chunks
                    .iter()
                    .enumerate()
                    .map(|(i, c)| Ok(ProviderEvent::Delta(Delta::fragment(i as u64, *c))))
                    .collect();
                events.push(Ok(ProviderEvent::Completed));
                Ok(ProviderStreamHandle {
                    stream: Box::pin(stream::iter(events)),
                })
            }
        }

        #[derive(Default)]
        struct CollectingSink {
            snapshots: Vec<RenderSnapshot>,
        }

        impl DisplaySink for CollectingSink {
            fn paint(&mut self, snapshot: &RenderSnapshot) {
                self.snapshots.push(snapshot.clone());
            }
        }

        #[tokio::test]
        async fn snapshots_are_painted_in_delta_order_and_converge() {
            let chunks = vec!["# He", "llo\n\nwor", "ld **done**"];
            let client = ChatClient::builder()
                .register_provider(Arc::new(ScriptedProvider {
                    chunks: chunks.clone(),
                }))
                .build()
                .expect("build");
            let handle = client
                .session(SessionConfig::titled("t"))
                .request(ModelRef::new("fake", "m"))
                .user_text("hi")
                .start_stream()
                .await
                .expect("start");

            let mut sink = CollectingSink::default();
            let text = render_stream(handle, &mut sink)
                .await
                .expect("render stream");

            let full: String = chunks.concat();
            assert_eq!(text, full);
            // one snapshot per delta, terminal delta included
            assert_eq!(sink.snapshots.len(), chunks.len() + 1);
            assert_eq!(sink.snapshots.last(), Some(&render(&full)));
            // the terminal delta is empty, so the last two snapshots repeat
            assert_eq!(
                sink.snapshots[chunks.len() - 1],
                sink.snapshots[chunks.len()]
            );
        }
    }
}

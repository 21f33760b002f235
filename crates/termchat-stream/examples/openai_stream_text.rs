use std::sync::Arc;

use termchat_stream::prelude::*;
use termchat_stream::vendors::openai::OpenAiProvider;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ChatError> {
    let client = ChatClient::builder()
        .register_provider(Arc::new(OpenAiProvider::from_env()?))
        .build()?;

    let mut handle = client
        .session(SessionConfig::titled("stream"))
        .request(ModelRef::parse("openai/gpt-4o-mini"))
        .system_prompt("Reply briefly.")
        .user_text("Stream a greeting.")
        .start_stream()
        .await?;

    while let Some(delta) = handle.next_delta().await {
        print!("{}", delta.text);
        if delta.is_final {
            println!();
        }
    }

    let _ = handle.finish().await?;
    Ok(())
}

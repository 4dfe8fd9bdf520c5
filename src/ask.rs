//! `rbi ask`: query a bridge's history from the terminal.

use std::io::Write;

use anyhow::Result;
use futures_util::StreamExt;

use crate::app::Services;
use crate::config::Config;
use crate::gateway::ConversationTurn;

pub async fn run_ask(
    config: &Config,
    bridge_id: &str,
    question: &str,
    k: Option<usize>,
    stream: bool,
) -> Result<()> {
    let services = Services::open(config).await?;
    let turn = ConversationTurn {
        bridge_id: bridge_id.to_string(),
        history: Vec::new(),
        question: question.to_string(),
        k,
    };

    if stream {
        let mut fragments = services.gateway.chat_stream(&turn).await?;
        let mut stdout = std::io::stdout();
        while let Some(fragment) = fragments.next().await {
            stdout.write_all(fragment?.as_bytes())?;
            stdout.flush()?;
        }
        println!();
        return Ok(());
    }

    let response = services.gateway.ask(&turn).await?;
    println!("{}", response.answer);

    if !response.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, s) in response.sources.iter().enumerate() {
            println!(
                "  [{}] {:.3}  [{}] {} ({}): {}",
                i + 1,
                s.similarity,
                s.platform,
                s.sender,
                s.timestamp.format("%Y-%m-%d %H:%M"),
                s.content.replace('\n', " ")
            );
        }
    }
    Ok(())
}

//! `qh ask`.

use anyhow::Result;

use crate::context::AppContext;

/// Answer `question` from `index` and print the answer, optionally
/// followed by the chunks it was drawn from.
pub async fn run_ask(
    ctx: &AppContext,
    question: &str,
    index: &str,
    top_k: Option<usize>,
    show_sources: bool,
) -> Result<()> {
    let answer = ctx.ask(question, index, top_k).await?;
    println!("{}", answer.answer.trim_end());

    if show_sources {
        println!();
        println!("Sources ({}):", answer.sources.len());
        for (rank, source) in answer.sources.iter().enumerate() {
            let preview: String = source.text.chars().take(160).collect();
            let preview = preview.replace('\n', " ");
            println!(
                "{}. [chunk {} | {:.3}] {}",
                rank + 1,
                source.chunk_index,
                source.score,
                preview
            );
        }
    }
    Ok(())
}

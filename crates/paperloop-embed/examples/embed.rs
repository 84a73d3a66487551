use paperloop_core::traits::Embedder;
use paperloop_embed::{cosine_similarity, get_default_embedder};

fn main() -> anyhow::Result<()> {
    let embedder = get_default_embedder()?;
    let texts = vec!["parameter-efficient fine-tuning".to_string(), "low-rank adaptation of language models".to_string()];
    let embs = embedder.embed_batch(&texts)?;
    println!("B={} dim={} cos={:.4}", embs.len(), embedder.dim(), cosine_similarity(&embs[0], &embs[1]));
    Ok(())
}

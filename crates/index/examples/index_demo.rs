use index::{EmbeddingIndex, IndexConfig, IndexError, Metric};

fn main() -> Result<(), IndexError> {
    let index = EmbeddingIndex::in_memory(IndexConfig::new().with_dimension(4))?;

    // Two enrolled faces pointing in clearly different directions.
    let alice = [0.9, 0.1, 0.3, 0.2];
    let bob = [0.1, 0.8, -0.2, 0.5];
    let digest = index.add("id-alice", &alice)?;
    index.add("id-bob", &bob)?;
    println!("Enrolled {} identities (alice digest {digest}).", index.len());

    // A fresh capture of alice: close to, but not equal to, the enrolled vector.
    let capture = [0.88, 0.12, 0.31, 0.18];
    let hits = index.search(&capture, 2)?;
    println!("Cosine hits: {hits:#?}");

    let best = index.nearest(&capture)?;
    println!("Nearest: {:?} ({:.4})", best.identity_id, best.score);

    index.remove("id-bob")?;
    println!("After removal: {:?}", index.identities());

    let l2 = EmbeddingIndex::in_memory(
        IndexConfig::new()
            .with_dimension(4)
            .with_metric(Metric::Euclidean),
    )?;
    l2.add("id-alice", &alice)?;
    println!("Squared L2 to capture: {:.5}", l2.nearest(&capture)?.score);

    Ok(())
}

use std::collections::HashMap;

use embedkit_core::{batched, EmbeddingModel, Embeddings, Error, Result};

/// Backend stub: fixed vector per known text, batching requests like a real provider.
struct StubModel {
    table: HashMap<&'static str, Vec<f32>>,
    batch_size: usize,
}

impl EmbeddingModel for StubModel {
    fn model_name(&self) -> &str { "stub" }
    fn context_length(&self) -> usize { 16 }
    fn embedding_dims(&self) -> Result<usize> { Ok(2) }
    fn embed(&self, texts: &[String]) -> Result<Embeddings> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in batched(texts, self.batch_size)? {
            for text in batch {
                let v = self.table.get(text.as_str()).ok_or_else(|| Error::Backend(format!("unknown text {text}")))?;
                out.push(v.clone());
            }
        }
        Ok(out)
    }
}

fn stub(batch_size: usize) -> StubModel {
    let table = HashMap::from([("hello", vec![1.0, 0.0]), ("world", vec![0.0, 1.0])]);
    StubModel { table, batch_size }
}

#[test]
fn embedding_fn_returns_vectors_in_input_order() {
    let model = stub(1);
    let f = model.embedding_fn();
    let out = f(&["hello".to_string(), "world".to_string()]).expect("embed");
    assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);

    let out = f(&["world".to_string(), "hello".to_string(), "world".to_string()]).expect("embed");
    assert_eq!(out, vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.0, 1.0]], "no deduplication");
}

#[test]
fn boxed_models_forward_every_call() {
    let model: Box<dyn EmbeddingModel> = Box::new(stub(4));
    assert_eq!(model.model_name(), "stub");
    assert_eq!(model.embedding_dims().expect("dims"), 2);
    let out = model.embedding_fn()(&["hello".to_string()]).expect("embed");
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].len(), model.embedding_dims().expect("dims"));
}

#[test]
fn failing_text_fails_the_whole_call() {
    let model = stub(2);
    let err = model.embed(&["hello".to_string(), "nope".to_string()]).unwrap_err();
    assert!(matches!(err, Error::Backend(_)));
}

#[test]
fn zero_batch_size_surfaces_as_config_error() {
    let model = stub(0);
    assert!(matches!(model.embed(&["hello".to_string()]), Err(Error::InvalidConfig(_))));
}

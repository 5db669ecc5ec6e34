use crate::error::Result;
use crate::types::Embeddings;

/// A callable produced by [`EmbeddingModel::embedding_fn`].
///
/// Maps an ordered list of texts to one vector per text, in input order.
pub type EmbeddingFn<'a> = Box<dyn Fn(&[String]) -> Result<Embeddings> + Send + Sync + 'a>;

pub trait EmbeddingModel: Send + Sync {
    /// Identifier of the backing model (e.g. `text-embedding-ada-002`).
    fn model_name(&self) -> &str;
    /// Maximum number of tokens accepted per input.
    fn context_length(&self) -> usize;
    /// Embedding dimensionality, stable for the life of the instance.
    fn embedding_dims(&self) -> Result<usize>;
    /// Embed `texts`, returning exactly one vector per text in the same order.
    ///
    /// A call either fully succeeds or fails; partial results are never returned.
    fn embed(&self, texts: &[String]) -> Result<Embeddings>;

    fn embedding_fn(&self) -> EmbeddingFn<'_> {
        Box::new(move |texts: &[String]| self.embed(texts))
    }
}

impl<M: EmbeddingModel + ?Sized> EmbeddingModel for Box<M> {
    fn model_name(&self) -> &str { (**self).model_name() }
    fn context_length(&self) -> usize { (**self).context_length() }
    fn embedding_dims(&self) -> Result<usize> { (**self).embedding_dims() }
    fn embed(&self, texts: &[String]) -> Result<Embeddings> { (**self).embed(texts) }
}

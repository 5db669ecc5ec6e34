//! Value types shared by every embedding provider.

/// A single embedding vector. Its length is fixed per model and equals the
/// provider's reported dimensionality.
pub type Embedding = Vec<f32>;

/// One embedding per input text, index-aligned with the input.
pub type Embeddings = Vec<Embedding>;

/// Token ids produced by a provider's tokenizer.
pub type TokenIds = Vec<u32>;

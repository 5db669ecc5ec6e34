#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod batch;
pub mod config;
pub mod error;
pub mod retry;
pub mod shutdown;
pub mod traits;
pub mod types;

pub use batch::batched;
pub use error::{Error, Result};
pub use traits::{EmbeddingFn, EmbeddingModel};
pub use types::{Embedding, Embeddings, TokenIds};

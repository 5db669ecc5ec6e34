use candle_core::{Device, Tensor};
use tokenizers::Encoding;

/// Stack padded encodings into `(input_ids, attention_mask)` tensors of shape `[B, T]`.
/// All encodings must share one length (batch-longest padding).
pub fn encodings_to_tensors(encodings: &[Encoding], device: &Device) -> candle_core::Result<(Tensor, Tensor)> {
    let ids = encodings.iter().map(|e| Tensor::new(e.get_ids(), device)).collect::<candle_core::Result<Vec<_>>>()?;
    let masks = encodings.iter().map(|e| Tensor::new(e.get_attention_mask(), device)).collect::<candle_core::Result<Vec<_>>>()?;
    Ok((Tensor::stack(&ids, 0)?, Tensor::stack(&masks, 0)?))
}

use candle_core::{DType, IndexOp, Tensor};
use serde::Deserialize;

/// How token states are reduced to one vector per text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pooling {
    /// First (`[CLS]`) token.
    Cls,
    #[default]
    Mean,
}

#[derive(Debug, Deserialize)]
struct PoolingConfig {
    #[serde(default)]
    pooling_mode_cls_token: bool,
    #[serde(default)]
    pooling_mode_mean_tokens: bool,
}

impl Pooling {
    /// Read a sentence-transformers `1_Pooling/config.json`. Missing or
    /// unreadable configs mean mean pooling.
    pub fn from_config(raw: Option<&str>) -> Self {
        match raw.and_then(|raw| serde_json::from_str::<PoolingConfig>(raw).ok()) {
            Some(PoolingConfig { pooling_mode_cls_token: true, pooling_mode_mean_tokens: false }) => Self::Cls,
            _ => Self::Mean,
        }
    }

    /// `[B,T,H] -> [B,H]`, L2-normalized.
    pub fn apply(self, hidden: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Self::Cls => cls_l2(hidden),
            Self::Mean => masked_mean_l2(hidden, attention_mask),
        }
    }
}

/// Mean of the unmasked token states, L2-normalized: `[B,T,H] -> [B,H]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let (_batch, _time, _hidden_dim) = hidden.dims3()?;

    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let mask_broadcast = mask.unsqueeze(2)?.broadcast_as(hidden.shape())?;
    let masked = (hidden * &mask_broadcast)?;
    let sum = masked.sum(1)?;
    let lengths = mask.sum(1)?.unsqueeze(1)?;
    let mean = sum.broadcast_div(&lengths)?;
    l2_normalize(&mean)
}

/// First token state of each row, L2-normalized: `[B,T,H] -> [B,H]`.
pub fn cls_l2(hidden: &Tensor) -> candle_core::Result<Tensor> {
    let (_batch, _time, _hidden_dim) = hidden.dims3()?;
    l2_normalize(&hidden.i((.., 0))?)
}

fn l2_normalize(rows: &Tensor) -> candle_core::Result<Tensor> {
    let eps_val = match rows.dtype() { DType::F16 => 1e-6f64, _ => 1e-12f64 };
    let norm = (rows.sqr()?.sum_keepdim(1)?.sqrt()? + eps_val)?;
    rows.broadcast_div(&norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn masked_tokens_do_not_contribute() {
        let dev = Device::Cpu;
        // Two tokens with hidden dim 4; second token is masked out.
        let h = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0,
                                     5.0, 6.0, 7.0, 8.0],
                                   (1, 2, 4), &dev).unwrap();
        let mask = Tensor::from_slice(&[1u32, 0u32], (1, 2), &dev).unwrap();
        let out = masked_mean_l2(&h, &mask).unwrap();
        let v: Vec<Vec<f32>> = out.to_vec2().unwrap();
        let norm: f32 = (1.0f32 + 4.0 + 9.0 + 16.0).sqrt();
        let expected = [1.0 / norm, 2.0 / norm, 3.0 / norm, 4.0 / norm];
        for (a, b) in v[0].iter().copied().zip(expected) {
            assert!((a - b).abs() < 1e-5, "a={a} b={b}");
        }
    }

    #[test]
    fn cls_pooling_takes_the_first_token_whatever_the_mask() {
        let dev = Device::Cpu;
        let h = Tensor::from_slice(&[3.0f32, 4.0, 9.0, 9.0, 0.0, 2.0, 5.0, 5.0], (2, 2, 2), &dev).unwrap();
        let mask = Tensor::from_slice(&[1u32, 1, 1, 0], (2, 2), &dev).unwrap();
        let rows: Vec<Vec<f32>> = Pooling::Cls.apply(&h, &mask).unwrap().to_vec2().unwrap();
        let expected = [[0.6f32, 0.8], [0.0, 1.0]];
        for (row, want) in rows.iter().zip(expected) {
            for (a, b) in row.iter().copied().zip(want) {
                assert!((a - b).abs() < 1e-5, "a={a} b={b}");
            }
        }
    }

    #[test]
    fn pooling_mode_comes_from_the_pooling_config() {
        let cls = r#"{"word_embedding_dimension": 1024, "pooling_mode_cls_token": true, "pooling_mode_mean_tokens": false}"#;
        assert_eq!(Pooling::from_config(Some(cls)), Pooling::Cls);
        let mean = r#"{"pooling_mode_cls_token": false, "pooling_mode_mean_tokens": true}"#;
        assert_eq!(Pooling::from_config(Some(mean)), Pooling::Mean);
        assert_eq!(Pooling::from_config(Some("not json")), Pooling::Mean);
        assert_eq!(Pooling::from_config(None), Pooling::Mean);
    }

    #[test]
    fn each_row_is_unit_length() {
        let dev = Device::Cpu;
        let h = Tensor::from_slice(&[3.0f32, 4.0, 1.0, 1.0, 0.0, 2.0, 5.0, 5.0], (2, 2, 2), &dev).unwrap();
        let mask = Tensor::from_slice(&[1u32, 1, 1, 0], (2, 2), &dev).unwrap();
        let rows: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();
        for row in rows {
            let norm: f32 = row.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5, "norm={norm}");
        }
    }
}

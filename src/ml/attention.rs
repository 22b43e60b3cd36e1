// ============================================================
// Layer 5 — Multi-Head Self-Attention with Fixed-Weight Mode
// ============================================================
// Standard mode:
//   A = softmax(Q Kᵀ / √d_head)            per head, [B, H, N, N]
//   out = W_o · concat_h(dropout(A) · V)
//
// Fixed-weight mode ("test_weight_matrix"):
//   Q and K are never computed. Each block replays the matrix it
//   stored last time `fix_weights` was called (the batch-mean of
//   its standard-mode A), broadcast over the batch:
//   out = W_o · concat_h(A_fixed · V)
//
// The stored matrix is a non-trainable parameter so it travels
// with the model record and survives `valid()`.
//
// Reference: Vaswani et al. (2017) Attention Is All You Need
//            Dosovitskiy et al. (2021) An Image is Worth 16x16 Words

use burn::{
    module::Param,
    nn::{Dropout, DropoutConfig, Initializer, Linear, LinearConfig},
    prelude::*,
    tensor::activation::softmax,
};
use std::{fmt, str::FromStr};

/// How attention probabilities are obtained in a forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttentionMode {
    /// softmax(QKᵀ/√d) computed from the input
    #[default]
    Standard,
    /// Replay the stored fixed attention matrices
    FixedWeights,
}

impl AttentionMode {
    pub const ALL: [AttentionMode; 2] = [AttentionMode::Standard, AttentionMode::FixedWeights];
}

impl fmt::Display for AttentionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttentionMode::Standard     => write!(f, "standard"),
            AttentionMode::FixedWeights => write!(f, "test_weight_matrix"),
        }
    }
}

impl FromStr for AttentionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(AttentionMode::Standard),
            "test_weight_matrix" | "fixed" => Ok(AttentionMode::FixedWeights),
            other => Err(format!(
                "unknown attention mode '{other}' (expected 'standard' or 'test_weight_matrix')"
            )),
        }
    }
}

#[derive(Config, Debug)]
pub struct AttentionConfig {
    pub dim:       usize,
    pub heads:     usize,
    pub dim_head:  usize,
    /// Number of tokens attended over (patches + class token)
    pub seq_len:   usize,
    #[config(default = 0.0)]
    pub dropout:   f64,
}

impl AttentionConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Attention<B> {
        let inner = self.heads * self.dim_head;
        let uniform = 1.0 / self.seq_len as f64;
        Attention {
            to_qkv:  LinearConfig::new(self.dim, inner * 3).with_bias(false).init(device),
            to_out:  LinearConfig::new(inner, self.dim).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            fixed_weights: Initializer::Constant { value: uniform }
                .init([self.heads, self.seq_len, self.seq_len], device)
                .set_require_grad(false),
            heads:    self.heads,
            dim_head: self.dim_head,
        }
    }
}

#[derive(Module, Debug)]
pub struct Attention<B: Backend> {
    pub to_qkv:        Linear<B>,
    pub to_out:        Linear<B>,
    pub dropout:       Dropout,
    /// [heads, seq_len, seq_len], rows sum to 1
    pub fixed_weights: Param<Tensor<B, 3>>,
    pub heads:         usize,
    pub dim_head:      usize,
}

pub struct AttentionOutput<B: Backend> {
    /// [batch, seq_len, dim]
    pub context: Tensor<B, 3>,
    /// Attention probabilities before dropout: [batch, heads, seq_len, seq_len]
    pub weights: Tensor<B, 4>,
}

impl<B: Backend> Attention<B> {
    pub fn forward(&self, x: Tensor<B, 3>, mode: AttentionMode) -> AttentionOutput<B> {
        let [batch, seq_len, _] = x.dims();

        let inner = self.heads * self.dim_head;

        // [batch, seq, 3 * inner] laid out as q | k | v
        let qkv = self.to_qkv.forward(x);
        let v = self.split_heads(qkv.clone().narrow(2, 2 * inner, inner));

        let weights = match mode {
            AttentionMode::Standard => {
                let q = self.split_heads(qkv.clone().narrow(2, 0, inner));
                let k = self.split_heads(qkv.narrow(2, inner, inner));
                let scores = q
                    .matmul(k.transpose())
                    .div_scalar((self.dim_head as f32).sqrt());
                softmax(scores, 3)
            }
            AttentionMode::FixedWeights => {
                let [heads, n, _] = self.fixed_weights.dims();
                self.fixed_weights
                    .val()
                    .unsqueeze::<4>()
                    .expand([batch, heads, n, n])
            }
        };

        let context = self.dropout.forward(weights.clone()).matmul(v);
        let context = context
            .swap_dims(1, 2)
            .reshape([batch, seq_len, inner]);

        AttentionOutput { context: self.to_out.forward(context), weights }
    }

    /// Store the batch mean of `weights` ([batch, heads, n, n]) as this
    /// block's fixed attention matrix.
    pub fn fix_weights(mut self, weights: Tensor<B, 4>) -> Self {
        let [_, heads, n, _] = weights.dims();
        let mean = weights.detach().mean_dim(0).reshape([heads, n, n]);
        self.fixed_weights = self.fixed_weights.map(|_| mean).set_require_grad(false);
        self
    }

    /// [batch, seq, heads*dim_head] → [batch, heads, seq, dim_head]
    fn split_heads(&self, x: Tensor<B, 3>) -> Tensor<B, 4> {
        let [batch, seq_len, _] = x.dims();
        x.reshape([batch, seq_len, self.heads, self.dim_head])
            .swap_dims(1, 2)
    }
}

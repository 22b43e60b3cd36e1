use burn::{
    module::Param,
    nn::{
        Dropout, DropoutConfig,
        Gelu,
        Initializer,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};

use crate::ml::attention::{Attention, AttentionConfig, AttentionMode};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct ViTConfig {
    /// [height, width]
    pub image_size:  [usize; 2],
    /// [height, width]
    pub patch_size:  [usize; 2],
    pub num_classes: usize,
    pub dim:         usize,
    pub depth:       usize,
    pub heads:       usize,
    pub mlp_dim:     usize,
    #[config(default = 3)]
    pub channels:    usize,
    #[config(default = 64)]
    pub dim_head:    usize,
    #[config(default = 0.1)]
    pub dropout:     f64,
    #[config(default = 0.1)]
    pub emb_dropout: f64,
    /// Pool by averaging all tokens instead of taking the class token
    #[config(default = false)]
    pub mean_pool:   bool,
}

impl ViTConfig {
    /// Check the architecture is buildable before allocating anything.
    pub fn validate(&self) -> anyhow::Result<()> {
        let [h, w]   = self.image_size;
        let [ph, pw] = self.patch_size;
        if ph == 0 || pw == 0 || h % ph != 0 || w % pw != 0 {
            anyhow::bail!(
                "Image size {}x{} must be divisible by the patch size {}x{}",
                h, w, ph, pw
            );
        }
        for (name, v) in [
            ("num_classes", self.num_classes),
            ("dim", self.dim),
            ("depth", self.depth),
            ("heads", self.heads),
            ("mlp_dim", self.mlp_dim),
            ("dim_head", self.dim_head),
            ("channels", self.channels),
        ] {
            if v == 0 {
                anyhow::bail!("{name} must be greater than zero");
            }
        }
        for (name, p) in [("dropout", self.dropout), ("emb_dropout", self.emb_dropout)] {
            if !(0.0..1.0).contains(&p) {
                anyhow::bail!("{name} must be in [0, 1), got {p}");
            }
        }
        Ok(())
    }

    pub fn num_patches(&self) -> usize {
        (self.image_size[0] / self.patch_size[0]) * (self.image_size[1] / self.patch_size[1])
    }

    /// Tokens per image: one per patch plus the class token.
    pub fn seq_len(&self) -> usize {
        self.num_patches() + 1
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> VisionTransformer<B> {
        let patch_dim = self.channels * self.patch_size[0] * self.patch_size[1];
        let patch_embedding = PatchEmbedding {
            norm_in:      LayerNormConfig::new(patch_dim).init(device),
            projection:   LinearConfig::new(patch_dim, self.dim).init(device),
            norm_out:     LayerNormConfig::new(self.dim).init(device),
            patch_height: self.patch_size[0],
            patch_width:  self.patch_size[1],
        };

        let normal = Initializer::Normal { mean: 0.0, std: 1.0 };
        let blocks = (0..self.depth)
            .map(|_| self.build_block(device))
            .collect();

        VisionTransformer {
            patch_embedding,
            cls_token:     normal.init([1, 1, self.dim], device),
            pos_embedding: normal.init([1, self.seq_len(), self.dim], device),
            emb_dropout:   DropoutConfig::new(self.emb_dropout).init(),
            blocks,
            final_norm:    LayerNormConfig::new(self.dim).init(device),
            head:          LinearConfig::new(self.dim, self.num_classes).init(device),
            mean_pool:     self.mean_pool,
        }
    }

    fn build_block<B: Backend>(&self, device: &B::Device) -> TransformerBlock<B> {
        let attention = AttentionConfig::new(self.dim, self.heads, self.dim_head, self.seq_len())
            .with_dropout(self.dropout)
            .init(device);
        TransformerBlock {
            attn_norm: LayerNormConfig::new(self.dim).init(device),
            attention,
            ff_norm:   LayerNormConfig::new(self.dim).init(device),
            ff_in:     LinearConfig::new(self.dim, self.mlp_dim).init(device),
            ff_out:    LinearConfig::new(self.mlp_dim, self.dim).init(device),
            gelu:      Gelu::new(),
            dropout:   DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// Cuts images into non-overlapping patches and projects each to `dim`.
#[derive(Module, Debug)]
pub struct PatchEmbedding<B: Backend> {
    pub norm_in:      LayerNorm<B>,
    pub projection:   Linear<B>,
    pub norm_out:     LayerNorm<B>,
    pub patch_height: usize,
    pub patch_width:  usize,
}

impl<B: Backend> PatchEmbedding<B> {
    /// images: [batch, c, h, w] → [batch, num_patches, dim]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        let patches = patchify(images, self.patch_height, self.patch_width);
        let x = self.norm_in.forward(patches);
        let x = self.projection.forward(x);
        self.norm_out.forward(x)
    }
}

/// `b c (h p1) (w p2) -> b (h w) (p1 p2 c)`
pub fn patchify<B: Backend>(images: Tensor<B, 4>, ph: usize, pw: usize) -> Tensor<B, 3> {
    let [batch, channels, height, width] = images.dims();
    let (gh, gw) = (height / ph, width / pw);
    images
        .reshape([batch, channels, gh, ph, gw, pw])
        .permute([0, 2, 4, 3, 5, 1])
        .reshape([batch, gh * gw, ph * pw * channels])
}

/// Pre-norm encoder block: x + Attn(LN(x)), then x + FF(LN(x)).
#[derive(Module, Debug)]
pub struct TransformerBlock<B: Backend> {
    pub attn_norm: LayerNorm<B>,
    pub attention: Attention<B>,
    pub ff_norm:   LayerNorm<B>,
    pub ff_in:     Linear<B>,
    pub ff_out:    Linear<B>,
    pub gelu:      Gelu,
    pub dropout:   Dropout,
}

impl<B: Backend> TransformerBlock<B> {
    /// Returns the block output and the attention probabilities it used.
    pub fn forward(&self, x: Tensor<B, 3>, mode: AttentionMode) -> (Tensor<B, 3>, Tensor<B, 4>) {
        let attn = self.attention.forward(self.attn_norm.forward(x.clone()), mode);
        let x = x + attn.context;

        let ff = self.ff_in.forward(self.ff_norm.forward(x.clone()));
        let ff = self.dropout.forward(self.gelu.forward(ff));
        let ff = self.dropout.forward(self.ff_out.forward(ff));

        (x + ff, attn.weights)
    }
}

#[derive(Module, Debug)]
pub struct VisionTransformer<B: Backend> {
    pub patch_embedding: PatchEmbedding<B>,
    pub cls_token:       Param<Tensor<B, 3>>,
    pub pos_embedding:   Param<Tensor<B, 3>>,
    pub emb_dropout:     Dropout,
    pub blocks:          Vec<TransformerBlock<B>>,
    pub final_norm:      LayerNorm<B>,
    pub head:            Linear<B>,
    pub mean_pool:       bool,
}

pub struct ViTOutput<B: Backend> {
    /// [batch, num_classes]
    pub logits:    Tensor<B, 2>,
    /// One [batch, heads, n, n] tensor per block
    pub attention: Vec<Tensor<B, 4>>,
}

impl<B: Backend> VisionTransformer<B> {
    /// images: [batch, c, h, w] → logits: [batch, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>, mode: AttentionMode) -> Tensor<B, 2> {
        self.forward_with_attention(images, mode).logits
    }

    pub fn forward_with_attention(&self, images: Tensor<B, 4>, mode: AttentionMode) -> ViTOutput<B> {
        let x = self.patch_embedding.forward(images);
        let [batch, _, dim] = x.dims();

        let cls = self.cls_token.val().expand([batch, 1, dim]);
        let x = Tensor::cat(vec![cls, x], 1) + self.pos_embedding.val();
        let mut x = self.emb_dropout.forward(x);

        let mut attention = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let (out, weights) = block.forward(x, mode);
            x = out;
            attention.push(weights);
        }
        let x = self.final_norm.forward(x); // [batch, n, dim]

        let pooled = if self.mean_pool {
            x.mean_dim(1)
        } else {
            x.narrow(1, 0, 1)
        }
        .reshape([batch, dim]);

        ViTOutput { logits: self.head.forward(pooled), attention }
    }

    /// Cross-entropy loss plus the logits it was computed from.
    pub fn forward_loss(
        &self,
        images:  Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
        mode:    AttentionMode,
    ) -> (Tensor<B, 1>, ViTOutput<B>) {
        let output = self.forward_with_attention(images, mode);
        let ce = burn::nn::loss::CrossEntropyLossConfig::new()
            .init(&output.logits.device());
        (ce.forward(output.logits.clone(), targets), output)
    }

    /// Store each block's batch-mean attention as its fixed matrix.
    /// `attention` must come from a standard-mode pass of this model.
    pub fn fix_attention_weights(mut self, attention: Vec<Tensor<B, 4>>) -> Self {
        self.blocks = self
            .blocks
            .into_iter()
            .zip(attention)
            .map(|(mut block, weights)| {
                block.attention = block.attention.fix_weights(weights);
                block
            })
            .collect();
        self
    }

    /// Parameters updated by the optimizer (excludes the fixed attention buffers).
    pub fn num_trainable_params(&self) -> usize {
        let fixed: usize = self
            .blocks
            .iter()
            .map(|b| b.attention.fixed_weights.shape().num_elements())
            .sum();
        self.num_params() - fixed
    }
}

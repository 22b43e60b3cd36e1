use burn::data::dataset::Dataset;

use crate::domain::image::LabeledImage;

/// In-memory image dataset backing a burn DataLoader.
pub struct ImageDataset {
    images: Vec<LabeledImage>,
}

impl ImageDataset {
    pub fn new(images: Vec<LabeledImage>) -> Self { Self { images } }

    pub fn image_count(&self) -> usize { self.images.len() }

    /// Number of images per label, for labels `0..num_classes`.
    pub fn class_counts(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0; num_classes];
        for img in &self.images {
            if let Some(c) = counts.get_mut(img.label) {
                *c += 1;
            }
        }
        counts
    }
}

impl Dataset<LabeledImage> for ImageDataset {
    fn get(&self, index: usize) -> Option<LabeledImage> {
        self.images.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.images.len()
    }
}

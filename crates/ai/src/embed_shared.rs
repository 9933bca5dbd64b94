use stratamem_shared::{APP_ENV, AppError};

/// Threshold for determining if L2 normalization is needed.
const L2_NORM_TOLERANCE: f32 = 1e-6;

/// Process an embedding vector to exactly `EMBED_DIM` dimensions, L2 normalized.
///
/// - If dim > target: truncate and L2 normalize
/// - If dim == target: normalize only if not already normalized
/// - If dim < target: error
pub fn process_embedding(mut vec: Vec<f32>) -> Result<Vec<f32>, AppError> {
  let target = APP_ENV.embed_dim;
  match vec.len() {
    d if d > target => {
      vec.truncate(target);
      l2_normalize(&mut vec);
      Ok(vec)
    }
    d if d == target => {
      let norm_sq: f32 = vec.iter().map(|x| x * x).sum();
      if (norm_sq - 1.0).abs() > L2_NORM_TOLERANCE {
        l2_normalize(&mut vec);
      }
      Ok(vec)
    }
    d => Err(AppError::new(anyhow::anyhow!(
      "embedding dimension {} is less than required {}",
      d,
      target
    ))),
  }
}

/// L2 normalize a vector in-place.
fn l2_normalize(vec: &mut [f32]) {
  let norm_sq: f32 = vec.iter().map(|x| x * x).sum();
  let norm = norm_sq.sqrt();
  if norm > 1e-12 {
    for x in vec.iter_mut() {
      *x /= norm;
    }
  }
}

use candle_core::{Device, Tensor};
use rayon::prelude::*;

use crate::{
    embedding::Embedding,
    error::{Error, Result},
};

/// One search hit: the insertion position of the matched vector and its
/// cosine similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub position: usize,
    pub score: f32,
}

/// In-memory exact inner-product index over unit-normalised embeddings.
///
/// Built once from a complete set of embeddings and immutable afterwards.
/// Vectors are identified by insertion position.
///
/// # Examples
///
/// ```
/// use docrag::VectorIndex;
///
/// let index = VectorIndex::build(vec![
///     vec![1.0, 0.0, 0.0],
///     vec![0.0, 1.0, 0.0],
///     vec![0.0, 0.0, 1.0],
/// ])
/// .unwrap();
///
/// let hits = index.search(&[1.0, 0.0, 0.0], 1).unwrap();
/// assert_eq!(hits[0].position, 0);
/// assert!((hits[0].score - 1.0).abs() < 1e-6);
/// ```
#[derive(Debug)]
pub struct VectorIndex {
    /// `[len, dimension]` matrix of unit rows; `None` for an empty index.
    matrix: Option<Tensor>,
    len: usize,
    dimension: usize,
}

impl VectorIndex {
    /// Build an index from embeddings that all share one dimension.
    ///
    /// The first embedding fixes the dimension; any other length is a
    /// [`Error::DimensionMismatch`]. NaN or infinite components are an
    /// [`Error::NonFiniteEmbedding`]. An empty input builds an empty index.
    pub fn build(embeddings: Vec<Embedding>) -> Result<Self> {
        let Some(first) = embeddings.first() else {
            return Ok(Self {
                matrix: None,
                len: 0,
                dimension: 0,
            });
        };

        let dimension = first.len();
        if dimension == 0 {
            return Err(Error::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }
        if let Some(position) = embeddings.iter().position(|e| !all_finite(e)) {
            return Err(Error::NonFiniteEmbedding(format!("at position {position}")));
        }

        let len = embeddings.len();
        let mut data: Vec<f32> = embeddings.into_iter().flatten().collect();
        data.par_chunks_mut(dimension).for_each(normalize);

        let matrix = Tensor::from_vec(data, (len, dimension), &Device::Cpu)?;

        Ok(Self {
            matrix: Some(matrix),
            len,
            dimension,
        })
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Dimension of the indexed vectors, or `None` for an empty index.
    pub fn dimension(&self) -> Option<usize> {
        (self.len > 0).then_some(self.dimension)
    }

    /// Return up to `k` hits ordered by descending score, ties broken by
    /// ascending position.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let Some(matrix) = &self.matrix else {
            return Ok(Vec::new());
        };
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if !all_finite(query) {
            return Err(Error::NonFiniteEmbedding("for the query".to_string()));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut unit = query.to_vec();
        normalize(&mut unit);
        let query = Tensor::from_vec(unit, (1, self.dimension), &Device::Cpu)?;

        // [1, D] @ [D, N] -> [1, N]
        let scores = query
            .matmul(&matrix.t()?)?
            .squeeze(0)?
            .to_vec1::<f32>()?;

        let mut hits: Vec<SearchHit> = scores
            .into_iter()
            .enumerate()
            // -0.0 + 0.0 is 0.0, so total_cmp ties agree with ==.
            .map(|(position, score)| SearchHit {
                position,
                score: score + 0.0,
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score.total_cmp(&a.score).then(a.position.cmp(&b.position))
        });
        hits.truncate(k);

        Ok(hits)
    }
}

fn all_finite(v: &[f32]) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
///
/// The norm is accumulated in `f64`; squaring large `f32` components
/// overflows to infinity.
fn normalize(v: &mut [f32]) {
    let norm = v
        .iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt();
    if norm > 0.0 {
        v.iter_mut()
            .for_each(|x| *x = (f64::from(*x) / norm) as f32);
    }
}

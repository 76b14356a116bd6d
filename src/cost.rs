use std::fmt;

/// Cost functions selectable for a factorization run.
///
/// The plain variants ([`EuclideanDistance`](CostFunction::EuclideanDistance),
/// [`KLDivergence`](CostFunction::KLDivergence)) support any convolutive
/// depth; the sparse, continuous and normalized variants are defined for a
/// depth of 1 only and are rejected otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CostFunction {
    /// Squared Euclidean distance (Lee-Seung updates).
    EuclideanDistance,
    /// Extended Kullback-Leibler divergence.
    KLDivergence,
    /// Squared Euclidean distance with a normalized-length sparsity term
    /// on the activations.
    EuclideanDistanceSparse,
    /// Extended KL divergence with a normalized-length sparsity term.
    KLDivergenceSparse,
    /// Squared Euclidean distance with unit-norm basis columns and an
    /// L1 sparsity term (Eggert-Korner).
    EuclideanDistanceSparseNormalized,
    /// Extended KL divergence with a temporal-continuity term on the
    /// activations (Virtanen).
    KLDivergenceContinuous,
}

impl CostFunction {
    /// Stable human-readable label for the cost function.
    ///
    /// These labels are part of the public contract; they are suitable for
    /// display and for storing alongside decomposition results.
    pub fn name(self) -> &'static str {
        match self {
            CostFunction::EuclideanDistance => "Squared Euclidean distance",
            CostFunction::KLDivergence => "Extended KL divergence",
            CostFunction::EuclideanDistanceSparse => {
                "Squared Euclidean distance + sparseness constraint"
            }
            CostFunction::KLDivergenceSparse => "Extended KL divergence + sparseness constraint",
            CostFunction::EuclideanDistanceSparseNormalized => {
                "Squared ED (normalized basis) + sparseness"
            }
            CostFunction::KLDivergenceContinuous => {
                "Extended KL divergence + continuity constraint"
            }
        }
    }
}

impl fmt::Display for CostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

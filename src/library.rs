use faer::Mat;
use rayon::prelude::*;

use crate::basis::UnaryTerm;
use crate::types::SysIdError;
use crate::utils::column;

/// Two-argument library term evaluated on an input pair (a, b).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairTerm {
    /// a sin(b)
    ASinB,
    /// a cos(b)
    ACosB,
    /// b sin(a)
    BSinA,
    /// b cos(a)
    BCosA,
}

impl PairTerm {
    pub const ALL: [PairTerm; 4] = [
        PairTerm::ASinB,
        PairTerm::ACosB,
        PairTerm::BSinA,
        PairTerm::BCosA,
    ];

    pub fn eval(&self, a: f64, b: f64) -> f64 {
        match self {
            PairTerm::ASinB => a * b.sin(),
            PairTerm::ACosB => a * b.cos(),
            PairTerm::BSinA => b * a.sin(),
            PairTerm::BCosA => b * a.cos(),
        }
    }

    /// Partial derivatives (∂/∂a, ∂/∂b).
    pub fn gradient(&self, a: f64, b: f64) -> (f64, f64) {
        match self {
            PairTerm::ASinB => (b.sin(), a * b.cos()),
            PairTerm::ACosB => (b.cos(), -a * b.sin()),
            PairTerm::BSinA => (b * a.cos(), a.sin()),
            PairTerm::BCosA => (-b * a.sin(), a.cos()),
        }
    }

    pub fn name(&self, a: &str, b: &str) -> String {
        match self {
            PairTerm::ASinB => format!("{a} sin({b})"),
            PairTerm::ACosB => format!("{a} cos({b})"),
            PairTerm::BSinA => format!("{b} sin({a})"),
            PairTerm::BCosA => format!("{b} cos({a})"),
        }
    }
}

/// Feature library Θ over `n_inputs` variables.
///
/// Maps an input vector z = [x; u] to the feature vector Θ(z). Unary terms
/// are applied to every input in turn. Interaction terms are applied to every
/// input pair (a, b) with a before b.
#[derive(Debug, Clone)]
pub struct FeatureLibrary {
    unary: Vec<UnaryTerm>,
    pairs: Vec<PairTerm>,
    n_inputs: usize,
}

impl FeatureLibrary {
    pub fn new(unary: Vec<UnaryTerm>, pairs: Vec<PairTerm>, n_inputs: usize) -> Self {
        Self {
            unary,
            pairs,
            n_inputs,
        }
    }

    pub fn n_inputs(&self) -> usize {
        self.n_inputs
    }

    fn n_pairs(&self) -> usize {
        self.n_inputs * self.n_inputs.saturating_sub(1) / 2
    }

    /// Total number of library features.
    pub fn n_features(&self) -> usize {
        self.unary.len() * self.n_inputs + self.pairs.len() * self.n_pairs()
    }

    fn check_input(&self, z: &[f64]) -> Result<(), SysIdError> {
        if z.len() != self.n_inputs {
            return Err(SysIdError::DimensionMismatch {
                what: "library input",
                expected: self.n_inputs,
                got: z.len(),
            });
        }
        Ok(())
    }

    /// Evaluate Θ(z).
    pub fn evaluate(&self, z: &[f64]) -> Result<Vec<f64>, SysIdError> {
        self.check_input(z)?;

        let mut theta = Vec::with_capacity(self.n_features());
        for term in &self.unary {
            theta.extend(z.iter().map(|&v| term.eval(v)));
        }
        for term in &self.pairs {
            for j in 0..self.n_inputs {
                for k in (j + 1)..self.n_inputs {
                    theta.push(term.eval(z[j], z[k]));
                }
            }
        }
        Ok(theta)
    }

    /// Evaluate Θ on every column of `z` (n_inputs × n_samples).
    ///
    /// Columns are evaluated in parallel. Returns n_features × n_samples.
    pub fn evaluate_matrix(&self, z: &Mat<f64>) -> Result<Mat<f64>, SysIdError> {
        if z.nrows() != self.n_inputs {
            return Err(SysIdError::DimensionMismatch {
                what: "library input rows",
                expected: self.n_inputs,
                got: z.nrows(),
            });
        }

        let columns = (0..z.ncols())
            .into_par_iter()
            .map(|t| self.evaluate(&column(z, t)))
            .collect::<Result<Vec<_>, SysIdError>>()?;

        let mut theta = Mat::<f64>::zeros(self.n_features(), z.ncols());
        for (t, col) in columns.into_iter().enumerate() {
            for (row, val) in col.into_iter().enumerate() {
                theta[(row, t)] = val;
            }
        }
        Ok(theta)
    }

    /// Analytic Jacobian ∂Θ/∂z (n_features × n_inputs).
    pub fn jacobian(&self, z: &[f64]) -> Result<Mat<f64>, SysIdError> {
        self.check_input(z)?;

        let mut jac = Mat::<f64>::zeros(self.n_features(), self.n_inputs);
        let mut row = 0;
        for term in &self.unary {
            for (j, &v) in z.iter().enumerate() {
                jac[(row, j)] = term.derivative(v);
                row += 1;
            }
        }
        for term in &self.pairs {
            for j in 0..self.n_inputs {
                for k in (j + 1)..self.n_inputs {
                    let (da, db) = term.gradient(z[j], z[k]);
                    jac[(row, j)] = da;
                    jac[(row, k)] = db;
                    row += 1;
                }
            }
        }
        Ok(jac)
    }

    /// Feature names, e.g. `x0`, `sin(1 x0)`, `x0^2`, `x0 sin(u0)`.
    pub fn feature_names(&self, inputs: &[String]) -> Result<Vec<String>, SysIdError> {
        if inputs.len() != self.n_inputs {
            return Err(SysIdError::DimensionMismatch {
                what: "input names",
                expected: self.n_inputs,
                got: inputs.len(),
            });
        }

        let mut names = Vec::with_capacity(self.n_features());
        for term in &self.unary {
            names.extend(inputs.iter().map(|v| term.name(v)));
        }
        for term in &self.pairs {
            for j in 0..self.n_inputs {
                for k in (j + 1)..self.n_inputs {
                    names.push(term.name(&inputs[j], &inputs[k]));
                }
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_near(a: f64, b: f64, eps: f64) {
        assert!(
            (a - b).abs() < eps,
            "expected {a} ≈ {b} (diff = {})",
            (a - b).abs()
        );
    }

    fn full_library(n_inputs: usize) -> FeatureLibrary {
        FeatureLibrary::new(
            vec![
                UnaryTerm::Identity,
                UnaryTerm::Sin(1),
                UnaryTerm::Cos(1),
                UnaryTerm::Power(2),
            ],
            PairTerm::ALL.to_vec(),
            n_inputs,
        )
    }

    #[test]
    fn test_feature_count() {
        // 4 unary * 3 inputs + 4 pair terms * 3 pairs
        assert_eq!(full_library(3).n_features(), 24);
        // a single input has no pairs
        assert_eq!(full_library(1).n_features(), 4);
    }

    #[test]
    fn test_evaluate_order() {
        let lib = full_library(2);
        let theta = lib.evaluate(&[0.5, 2.0]).unwrap();
        assert_eq!(theta.len(), 12);
        assert_near(theta[0], 0.5, 1e-12);
        assert_near(theta[1], 2.0, 1e-12);
        assert_near(theta[2], 0.5_f64.sin(), 1e-12);
        assert_near(theta[5], 2.0_f64.cos(), 1e-12);
        assert_near(theta[7], 4.0, 1e-12);
        // pair terms on (z0, z1)
        assert_near(theta[8], 0.5 * 2.0_f64.sin(), 1e-12);
        assert_near(theta[9], 0.5 * 2.0_f64.cos(), 1e-12);
        assert_near(theta[10], 2.0 * 0.5_f64.sin(), 1e-12);
        assert_near(theta[11], 2.0 * 0.5_f64.cos(), 1e-12);
    }

    #[test]
    fn test_jacobian_matches_finite_differences() {
        let lib = full_library(3);
        let z = [0.3, -1.2, 0.8];
        let jac = lib.jacobian(&z).unwrap();
        let h = 1e-6;

        for j in 0..3 {
            let mut zp = z;
            let mut zm = z;
            zp[j] += h;
            zm[j] -= h;
            let fp = lib.evaluate(&zp).unwrap();
            let fm = lib.evaluate(&zm).unwrap();
            for f in 0..lib.n_features() {
                let fd = (fp[f] - fm[f]) / (2.0 * h);
                assert_near(jac[(f, j)], fd, 1e-6);
            }
        }
    }

    #[test]
    fn test_evaluate_matrix_columns() {
        let lib = full_library(2);
        let z = Mat::<f64>::from_fn(2, 3, |i, j| (i + j) as f64 * 0.25);
        let theta = lib.evaluate_matrix(&z).unwrap();
        assert_eq!((theta.nrows(), theta.ncols()), (12, 3));
        let col2 = lib.evaluate(&[z[(0, 2)], z[(1, 2)]]).unwrap();
        for (f, v) in col2.iter().enumerate() {
            assert_near(theta[(f, 2)], *v, 1e-12);
        }
    }

    #[test]
    fn test_evaluate_matrix_many_columns() {
        let lib = full_library(3);
        let z = Mat::<f64>::from_fn(3, 257, |i, t| ((i + 1) as f64 * 0.013 * t as f64).sin());
        let theta = lib.evaluate_matrix(&z).unwrap();
        assert_eq!(theta.ncols(), 257);
        for t in [0, 128, 256] {
            let col = lib.evaluate(&column(&z, t)).unwrap();
            for (f, v) in col.iter().enumerate() {
                assert_eq!(theta[(f, t)], *v);
            }
        }
    }

    #[test]
    fn test_feature_names() {
        let lib = full_library(2);
        let names = lib
            .feature_names(&["x0".to_string(), "u0".to_string()])
            .unwrap();
        assert_eq!(names[0], "x0");
        assert_eq!(names[2], "sin(1 x0)");
        assert_eq!(names[5], "cos(1 u0)");
        assert_eq!(names[6], "x0^2");
        assert_eq!(names[8], "x0 sin(u0)");
        assert_eq!(names[11], "u0 cos(x0)");
    }

    #[test]
    fn test_wrong_input_length() {
        let lib = full_library(2);
        assert!(lib.evaluate(&[1.0]).is_err());
        assert!(lib.jacobian(&[1.0, 2.0, 3.0]).is_err());
        assert!(lib.feature_names(&["a".to_string()]).is_err());
    }
}

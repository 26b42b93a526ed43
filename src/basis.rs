use faer::Mat;
use rayon::prelude::*;

use crate::types::SysIdError;
use crate::utils::column;

/// A scalar basis function applied element-wise to one variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryTerm {
    /// x
    Identity,
    /// xᵈ
    Power(u32),
    /// sin(f x)
    Sin(u32),
    /// cos(f x)
    Cos(u32),
}

impl UnaryTerm {
    pub fn eval(&self, x: f64) -> f64 {
        match *self {
            UnaryTerm::Identity => x,
            UnaryTerm::Power(d) => x.powi(d as i32),
            UnaryTerm::Sin(f) => (f as f64 * x).sin(),
            UnaryTerm::Cos(f) => (f as f64 * x).cos(),
        }
    }

    /// Analytic derivative d/dx.
    pub fn derivative(&self, x: f64) -> f64 {
        match *self {
            UnaryTerm::Identity => 1.0,
            UnaryTerm::Power(0) => 0.0,
            UnaryTerm::Power(d) => d as f64 * x.powi(d as i32 - 1),
            UnaryTerm::Sin(f) => {
                let f = f as f64;
                f * (f * x).cos()
            }
            UnaryTerm::Cos(f) => {
                let f = f as f64;
                -f * (f * x).sin()
            }
        }
    }

    /// Feature name for this term applied to `var`.
    pub fn name(&self, var: &str) -> String {
        match *self {
            UnaryTerm::Identity => var.to_string(),
            UnaryTerm::Power(d) => format!("{var}^{d}"),
            UnaryTerm::Sin(f) => format!("sin({f} {var})"),
            UnaryTerm::Cos(f) => format!("cos({f} {var})"),
        }
    }
}

/// Options for the Koopman lifting basis.
#[derive(Debug, Clone, PartialEq)]
pub struct BasisConfig {
    /// Add powers x², ..., x^poly_degree.
    pub poly_basis: bool,
    pub poly_degree: usize,
    /// Add sin(f x), cos(f x) for f = 1..=trig_freq.
    pub trig_basis: bool,
    pub trig_freq: usize,
    /// Append all pairwise products of the transformed features.
    pub product_terms: bool,
}

impl Default for BasisConfig {
    fn default() -> Self {
        Self {
            poly_basis: false,
            poly_degree: 3,
            trig_basis: false,
            trig_freq: 1,
            product_terms: false,
        }
    }
}

impl BasisConfig {
    pub fn validate(&self) -> Result<(), SysIdError> {
        if self.poly_basis && !(2..=8).contains(&self.poly_degree) {
            return Err(SysIdError::Config(format!(
                "poly_degree must be in 2..=8, got {}",
                self.poly_degree
            )));
        }
        if self.trig_basis && !(1..=8).contains(&self.trig_freq) {
            return Err(SysIdError::Config(format!(
                "trig_freq must be in 1..=8, got {}",
                self.trig_freq
            )));
        }
        Ok(())
    }

    /// Ordered list of unary terms: identity, powers, then sin/cos per frequency.
    pub fn terms(&self) -> Vec<UnaryTerm> {
        let mut terms = vec![UnaryTerm::Identity];
        if self.poly_basis {
            terms.extend((2..=self.poly_degree as u32).map(UnaryTerm::Power));
        }
        if self.trig_basis {
            for f in 1..=self.trig_freq as u32 {
                terms.push(UnaryTerm::Sin(f));
                terms.push(UnaryTerm::Cos(f));
            }
        }
        terms
    }
}

/// Koopman lifting ψ: ℝⁿ → ℝᴺ.
///
/// Each term is applied to every observation component (term-major), so the
/// first `n_vars` entries of ψ(x) are x itself. Product terms ψᵢψⱼ (i < j)
/// follow when enabled.
#[derive(Debug, Clone)]
pub struct Basis {
    terms: Vec<UnaryTerm>,
    product_terms: bool,
    n_vars: usize,
}

impl Basis {
    pub fn new(config: &BasisConfig, n_vars: usize) -> Result<Self, SysIdError> {
        config.validate()?;
        Ok(Self {
            terms: config.terms(),
            product_terms: config.product_terms,
            n_vars,
        })
    }

    pub fn terms(&self) -> &[UnaryTerm] {
        &self.terms
    }

    /// Number of original (pre-lifting) variables.
    pub fn n_vars(&self) -> usize {
        self.n_vars
    }

    fn n_elementwise(&self) -> usize {
        self.terms.len() * self.n_vars
    }

    /// Dimension of the lifted state.
    pub fn dim(&self) -> usize {
        let k = self.n_elementwise();
        if self.product_terms {
            k + k * k.saturating_sub(1) / 2
        } else {
            k
        }
    }

    /// Lift a single observation.
    pub fn apply(&self, x: &[f64]) -> Result<Vec<f64>, SysIdError> {
        if x.len() != self.n_vars {
            return Err(SysIdError::DimensionMismatch {
                what: "observation",
                expected: self.n_vars,
                got: x.len(),
            });
        }

        let mut lifted = Vec::with_capacity(self.dim());
        for term in &self.terms {
            lifted.extend(x.iter().map(|&v| term.eval(v)));
        }

        if self.product_terms {
            let k = lifted.len();
            for i in 0..k {
                for j in (i + 1)..k {
                    lifted.push(lifted[i] * lifted[j]);
                }
            }
        }
        Ok(lifted)
    }

    /// Lift every column of an observation matrix (n_vars × n_time).
    pub fn lift(&self, x: &Mat<f64>) -> Result<Mat<f64>, SysIdError> {
        if x.nrows() != self.n_vars {
            return Err(SysIdError::DimensionMismatch {
                what: "observation rows",
                expected: self.n_vars,
                got: x.nrows(),
            });
        }

        let columns = (0..x.ncols())
            .into_par_iter()
            .map(|t| self.apply(&column(x, t)))
            .collect::<Result<Vec<_>, SysIdError>>()?;

        let mut lifted = Mat::<f64>::zeros(self.dim(), x.ncols());
        for (t, col) in columns.into_iter().enumerate() {
            for (row, val) in col.into_iter().enumerate() {
                lifted[(row, t)] = val;
            }
        }
        Ok(lifted)
    }

    /// Human-readable names of the lifted features.
    pub fn names(&self, vars: &[String]) -> Result<Vec<String>, SysIdError> {
        if vars.len() != self.n_vars {
            return Err(SysIdError::DimensionMismatch {
                what: "variable names",
                expected: self.n_vars,
                got: vars.len(),
            });
        }

        let mut names: Vec<String> = self
            .terms
            .iter()
            .flat_map(|term| vars.iter().map(move |v| term.name(v)))
            .collect();
        if self.product_terms {
            let k = names.len();
            for i in 0..k {
                for j in (i + 1)..k {
                    names.push(format!("{} {}", names[i], names[j]));
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

    fn make_test_data() -> Mat<f64> {
        let mut x = Mat::<f64>::zeros(2, 10);
        for t in 0..10 {
            x[(0, t)] = (t as f64) * 0.1;
            x[(1, t)] = (t as f64) * 0.2;
        }
        x
    }

    #[test]
    fn test_identity_basis() {
        let basis = Basis::new(&BasisConfig::default(), 2).unwrap();
        assert_eq!(basis.dim(), 2);
        assert_eq!(basis.apply(&[0.3, -1.0]).unwrap(), vec![0.3, -1.0]);
    }

    #[test]
    fn test_polynomial_basis() {
        let config = BasisConfig {
            poly_basis: true,
            poly_degree: 3,
            ..Default::default()
        };
        let basis = Basis::new(&config, 2).unwrap();
        let x = make_test_data();
        let lifted = basis.lift(&x).unwrap();

        assert_eq!(lifted.nrows(), 6);
        assert_eq!(lifted.ncols(), 10);

        // Row 0 = x1, row 2 = x1², row 4 = x1³
        let x_val = x[(0, 5)];
        assert_near(lifted[(0, 5)], x_val, 1e-12);
        assert_near(lifted[(2, 5)], x_val * x_val, 1e-12);
        assert_near(lifted[(4, 5)], x_val * x_val * x_val, 1e-12);
    }

    #[test]
    fn test_trigonometric_basis() {
        let config = BasisConfig {
            trig_basis: true,
            trig_freq: 2,
            ..Default::default()
        };
        let basis = Basis::new(&config, 2).unwrap();
        let x = make_test_data();
        let lifted = basis.lift(&x).unwrap();

        // 2 vars * (1 + 2*2) = 10 rows
        assert_eq!(lifted.nrows(), 10);
        let t = 3;
        assert_near(lifted[(2, t)], x[(0, t)].sin(), 1e-12);
        assert_near(lifted[(3, t)], x[(1, t)].sin(), 1e-12);
        assert_near(lifted[(4, t)], x[(0, t)].cos(), 1e-12);
        assert_near(lifted[(6, t)], (2.0 * x[(0, t)]).sin(), 1e-12);
        assert_near(lifted[(8, t)], (2.0 * x[(0, t)]).cos(), 1e-12);
    }

    #[test]
    fn test_product_terms() {
        let config = BasisConfig {
            poly_basis: true,
            poly_degree: 2,
            product_terms: true,
            ..Default::default()
        };
        let basis = Basis::new(&config, 2).unwrap();
        // k = 4 elementwise features, 6 pairwise products
        assert_eq!(basis.dim(), 10);

        let lifted = basis.apply(&[2.0, 3.0]).unwrap();
        assert_eq!(&lifted[..4], &[2.0, 3.0, 4.0, 9.0]);
        // products in (0,1), (0,2), (0,3), (1,2), (1,3), (2,3) order
        assert_eq!(&lifted[4..], &[6.0, 8.0, 18.0, 12.0, 27.0, 36.0]);

        let names = basis.names(&["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(names.len(), 10);
        assert_eq!(names[4], "a b");
        assert_eq!(names[9], "a^2 b^2");
        assert!(matches!(
            basis.names(&["a".to_string()]),
            Err(SysIdError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let terms = [
            UnaryTerm::Identity,
            UnaryTerm::Power(3),
            UnaryTerm::Sin(2),
            UnaryTerm::Cos(3),
        ];
        let h = 1e-6;
        for term in terms {
            for &x in &[-0.7, 0.0, 0.4, 1.3] {
                let fd = (term.eval(x + h) - term.eval(x - h)) / (2.0 * h);
                assert_near(term.derivative(x), fd, 1e-6);
            }
        }
    }

    #[test]
    fn test_invalid_config() {
        let config = BasisConfig {
            poly_basis: true,
            poly_degree: 1,
            ..Default::default()
        };
        assert!(Basis::new(&config, 2).is_err());

        let config = BasisConfig {
            trig_basis: true,
            trig_freq: 0,
            ..Default::default()
        };
        assert!(Basis::new(&config, 2).is_err());
    }

    #[test]
    fn test_dimension_mismatch() {
        let basis = Basis::new(&BasisConfig::default(), 2).unwrap();
        assert!(basis.apply(&[1.0]).is_err());
        assert!(basis.lift(&Mat::<f64>::zeros(3, 4)).is_err());
    }
}

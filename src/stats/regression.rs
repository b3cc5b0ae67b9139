//! Linear Regression Module
//!
//! Ordinary least squares of a continuous response against one integer
//! categorical predictor, dummy encoded against a reference level.
//! Solved in closed form through the normal equations with a Cholesky
//! factorization of X'X.

use crate::stats::aggregator::AggregateError;
use ndarray::{Array1, Array2, ArrayView1};
use polars::prelude::*;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};
use thiserror::Error;

/// Relative pivot size below which X'X is treated as singular.
const RANK_TOLERANCE: f64 = 1e-10;

pub const INTERCEPT: &str = "(Intercept)";

#[derive(Error, Debug)]
pub enum RegressionError {
    #[error("Design matrix is rank deficient: parameter '{0}' is not identifiable")]
    RankDeficient(String),

    #[error("Not enough observations: {observations} for {parameters} parameters")]
    InsufficientData {
        observations: usize,
        parameters: usize,
    },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Reference level {0} is not among the declared levels")]
    UnknownReference(i32),

    #[error("Data access error: {0}")]
    Data(#[from] AggregateError),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
}

/// One-hot encoding of an integer categorical predictor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyEncoding {
    levels: Vec<i32>,
    reference: i32,
}

impl DummyEncoding {
    pub fn new(levels: impl IntoIterator<Item = i32>, reference: i32) -> Result<Self, RegressionError> {
        let mut levels: Vec<i32> = levels.into_iter().collect();
        levels.sort_unstable();
        levels.dedup();
        if !levels.contains(&reference) {
            return Err(RegressionError::UnknownReference(reference));
        }
        Ok(Self { levels, reference })
    }

    /// Hour of day 0..=23 with midnight as the reference level.
    pub fn hours() -> Self {
        Self {
            levels: (0..24).collect(),
            reference: 0,
        }
    }

    pub fn levels(&self) -> &[i32] {
        &self.levels
    }

    pub fn reference(&self) -> i32 {
        self.reference
    }

    /// Intercept plus one column per non-reference level.
    pub fn n_parameters(&self) -> usize {
        self.levels.len()
    }

    fn dummy_levels(&self) -> impl Iterator<Item = i32> + '_ {
        self.levels.iter().copied().filter(move |l| *l != self.reference)
    }

    pub fn parameter_names(&self, predictor: &str) -> Vec<String> {
        std::iter::once(INTERCEPT.to_string())
            .chain(self.dummy_levels().map(|l| format!("{predictor}={l}")))
            .collect()
    }

    /// Design row for one observation, `None` when the value is not a declared level.
    pub fn encode(&self, value: i32) -> Option<Vec<f64>> {
        if !self.levels.contains(&value) {
            return None;
        }
        let mut row = vec![0.0; self.n_parameters()];
        row[0] = 1.0;
        if let Some(pos) = self.dummy_levels().position(|l| l == value) {
            row[pos + 1] = 1.0;
        }
        Some(row)
    }
}

/// Design matrix with named columns, one row per observation.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    x: Array2<f64>,
    names: Vec<String>,
}

impl DesignMatrix {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            x: Array2::zeros((0, names.len())),
            names,
        }
    }

    pub fn push_row(&mut self, row: &[f64]) -> Result<(), RegressionError> {
        let expected = self.names.len();
        if row.len() != expected {
            return Err(RegressionError::DimensionMismatch {
                expected,
                got: row.len(),
            });
        }
        self.x
            .push_row(ArrayView1::from(row))
            .map_err(|_| RegressionError::DimensionMismatch {
                expected,
                got: row.len(),
            })
    }

    pub fn nrows(&self) -> usize {
        self.x.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.x.ncols()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    pub p_value: f64,
}

/// Result of an OLS fit.
#[derive(Debug, Clone, Serialize)]
pub struct OlsFit {
    pub coefficients: Vec<Coefficient>,
    pub observations: usize,
    pub df_residual: usize,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub residual_std_error: f64,
    pub f_statistic: Option<f64>,
    pub f_p_value: Option<f64>,
}

impl OlsFit {
    pub fn coefficient(&self, name: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.name == name)
    }

    pub fn intercept(&self) -> Option<f64> {
        self.coefficient(INTERCEPT).map(|c| c.estimate)
    }
}

pub struct Ols;

impl Ols {
    /// Fit `y = X b + e`. The first design column is taken to be the intercept.
    pub fn fit(design: &DesignMatrix, y: &[f64]) -> Result<OlsFit, RegressionError> {
        let n = design.nrows();
        let p = design.ncols();
        if y.len() != n {
            return Err(RegressionError::DimensionMismatch {
                expected: n,
                got: y.len(),
            });
        }
        if n == 0 || p == 0 {
            return Err(RegressionError::InsufficientData {
                observations: n,
                parameters: p,
            });
        }

        // Normal equations: X'X b = X'y
        let x = &design.x;
        let y = ArrayView1::from(y);
        let xt = x.t();
        let xtx = xt.dot(x);
        let xty = xt.dot(&y);

        let l = cholesky(&xtx)
            .map_err(|col| RegressionError::RankDeficient(design.names[col].clone()))?;

        if n <= p {
            return Err(RegressionError::InsufficientData {
                observations: n,
                parameters: p,
            });
        }
        let df_residual = n - p;

        let beta = cholesky_solve(&l, xty.view());
        let xtx_inv = cholesky_inverse(&l);

        let residuals = &y - &x.dot(&beta);
        let ss_res = residuals.mapv(|r| r * r).sum();
        let y_mean = y.sum() / n as f64;
        let ss_tot = y.mapv(|v| (v - y_mean).powi(2)).sum();

        let sigma2 = ss_res / df_residual as f64;
        let t_dist = StudentsT::new(0.0, 1.0, df_residual as f64).ok();

        let coefficients = beta
            .iter()
            .enumerate()
            .map(|(j, &estimate)| {
                let std_error = (sigma2 * xtx_inv[[j, j]]).sqrt();
                let (t_value, p_value) = match (&t_dist, std_error > 0.0) {
                    (Some(dist), true) => {
                        let t = estimate / std_error;
                        (t, 2.0 * (1.0 - dist.cdf(t.abs())))
                    }
                    _ => (f64::NAN, f64::NAN),
                };
                Coefficient {
                    name: design.names[j].clone(),
                    estimate,
                    std_error,
                    t_value,
                    p_value,
                }
            })
            .collect();

        // An intercept-only model has R² 0
        let r_squared = if ss_tot > 0.0 && p > 1 {
            1.0 - ss_res / ss_tot
        } else {
            0.0
        };
        let adj_r_squared = 1.0 - (1.0 - r_squared) * (n - 1) as f64 / df_residual as f64;

        let (f_statistic, f_p_value) = if p > 1 && ss_res > 0.0 {
            let df_model = (p - 1) as f64;
            let f = ((ss_tot - ss_res) / df_model) / sigma2;
            let p_value = FisherSnedecor::new(df_model, df_residual as f64)
                .ok()
                .map(|dist| 1.0 - dist.cdf(f));
            (Some(f), p_value)
        } else {
            (None, None)
        };

        Ok(OlsFit {
            coefficients,
            observations: n,
            df_residual,
            r_squared,
            adj_r_squared,
            residual_std_error: sigma2.sqrt(),
            f_statistic,
            f_p_value,
        })
    }
}

/// Lower-triangular `L` with `A = L L'`; `Err(col)` names the first column
/// whose pivot vanished.
fn cholesky(a: &Array2<f64>) -> Result<Array2<f64>, usize> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] - sum;
                if !(diag > RANK_TOLERANCE * a[[i, i]].abs()) {
                    return Err(i);
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Ok(l)
}

fn cholesky_solve(l: &Array2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    let n = l.nrows();

    // Forward substitution: L z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * z[j]).sum();
        z[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L' x = z
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = (i + 1..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (z[i] - sum) / l[[i, i]];
    }
    x
}

fn cholesky_inverse(l: &Array2<f64>) -> Array2<f64> {
    let n = l.nrows();
    let identity = Array2::<f64>::eye(n);
    let mut inv = Array2::<f64>::zeros((n, n));
    for (col, e) in identity.columns().into_iter().enumerate() {
        inv.column_mut(col).assign(&cholesky_solve(l, e));
    }
    inv
}

/// Fit `response ~ predictor` with `predictor` dummy encoded.
///
/// Rows with a null response, a null predictor, or a predictor value outside
/// the declared levels are left out. A declared level without observations
/// is not identifiable and fails with `RankDeficient` naming that level.
pub fn fit_categorical(
    df: &DataFrame,
    response: &str,
    predictor: &str,
    encoding: &DummyEncoding,
) -> Result<OlsFit, RegressionError> {
    let y_col = df
        .column(response)
        .map_err(|_| AggregateError::MissingColumn(response.to_string()))?
        .cast(&DataType::Float64)?;
    let x_col = df
        .column(predictor)
        .map_err(|_| AggregateError::MissingColumn(predictor.to_string()))?
        .cast(&DataType::Int32)?;

    let mut design = DesignMatrix::new(encoding.parameter_names(predictor));
    let mut y = Vec::with_capacity(df.height());
    let mut per_level = vec![0usize; encoding.levels().len()];
    let mut skipped = 0usize;

    for (yi, xi) in y_col.f64()?.into_iter().zip(x_col.i32()?.into_iter()) {
        match (yi, xi.and_then(|x| encoding.encode(x).map(|row| (x, row)))) {
            (Some(yi), Some((x, row))) if yi.is_finite() => {
                design.push_row(&row)?;
                y.push(yi);
                if let Some(pos) = encoding.levels().iter().position(|l| *l == x) {
                    per_level[pos] += 1;
                }
            }
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::debug!(response, predictor, skipped, "Rows left out of regression");
    }

    if !y.is_empty() {
        if let Some(pos) = per_level.iter().position(|count| *count == 0) {
            let level = encoding.levels()[pos];
            return Err(RegressionError::RankDeficient(format!("{predictor}={level}")));
        }
    }

    let fit = Ols::fit(&design, &y)?;
    tracing::info!(
        response,
        predictor,
        observations = fit.observations,
        r_squared = fit.r_squared,
        "Fitted OLS model"
    );
    Ok(fit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_design(xs: &[f64]) -> DesignMatrix {
        let mut design = DesignMatrix::new(vec![INTERCEPT.to_string(), "x".to_string()]);
        for &x in xs {
            design.push_row(&[1.0, x]).unwrap();
        }
        design
    }

    #[test]
    fn test_simple_regression() {
        let design = simple_design(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let y = [2.1, 3.9, 6.2, 7.8, 10.1];
        let fit = Ols::fit(&design, &y).unwrap();

        let slope = fit.coefficient("x").unwrap();
        assert!((fit.intercept().unwrap() - 0.05).abs() < 1e-9);
        assert!((slope.estimate - 1.99).abs() < 1e-9);

        // SSR = 0.107 with 3 residual degrees of freedom, Sxx = 10
        let expected_se = (0.107_f64 / 3.0 / 10.0).sqrt();
        assert!((slope.std_error - expected_se).abs() < 1e-9);
        assert_eq!(fit.df_residual, 3);
        assert!(fit.r_squared > 0.99);
        assert!(slope.p_value < 0.001);
        assert!(fit.f_p_value.unwrap() < 0.001);
    }

    #[test]
    fn test_constant_predictor_gives_sample_mean() {
        let latitudes = [40.81, 40.67, 40.59, 40.75, 40.70];
        let df = df!(
            "Latitude" => latitudes,
            "HOUR" => [7, 7, 7, 7, 7]
        )
        .unwrap();
        let encoding = DummyEncoding::new([7], 7).unwrap();

        let fit = fit_categorical(&df, "Latitude", "HOUR", &encoding).unwrap();
        let mean = latitudes.iter().sum::<f64>() / latitudes.len() as f64;

        assert_eq!(fit.coefficients.len(), 1);
        assert!((fit.intercept().unwrap() - mean).abs() < 1e-12);
        assert_eq!(fit.r_squared, 0.0);
        assert!(fit.f_statistic.is_none());
    }

    #[test]
    fn test_dummy_coefficients_are_mean_differences() {
        let df = df!(
            "Longitude" => [-73.9, -73.8, -74.0, -74.1, -73.7, -73.5],
            "HOUR" => [0, 0, 1, 1, 2, 2]
        )
        .unwrap();
        let encoding = DummyEncoding::new([0, 1, 2], 0).unwrap();
        let fit = fit_categorical(&df, "Longitude", "HOUR", &encoding).unwrap();

        let base = (-73.9 + -73.8) / 2.0;
        assert!((fit.intercept().unwrap() - base).abs() < 1e-9);
        let h1 = fit.coefficient("HOUR=1").unwrap().estimate;
        let h2 = fit.coefficient("HOUR=2").unwrap().estimate;
        assert!((h1 - ((-74.0 + -74.1) / 2.0 - base)).abs() < 1e-9);
        assert!((h2 - ((-73.7 + -73.5) / 2.0 - base)).abs() < 1e-9);
        assert_eq!(fit.df_residual, 3);
    }

    #[test]
    fn test_empty_level_is_rank_deficient() {
        let df = df!(
            "Latitude" => [40.1, 40.2, 40.3, 40.4],
            "HOUR" => [0, 1, 0, 1]
        )
        .unwrap();
        let err = fit_categorical(&df, "Latitude", "HOUR", &DummyEncoding::hours()).unwrap_err();
        match err {
            RegressionError::RankDeficient(name) => assert_eq!(name, "HOUR=2"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_reference_level_is_named() {
        let hours: Vec<i32> = (1..24).chain(1..24).collect();
        let latitudes: Vec<f64> = hours.iter().map(|h| 40.5 + *h as f64 * 0.01).collect();
        let df = df!(
            "Latitude" => latitudes,
            "HOUR" => hours
        )
        .unwrap();
        let err = fit_categorical(&df, "Latitude", "HOUR", &DummyEncoding::hours()).unwrap_err();
        match err {
            RegressionError::RankDeficient(name) => assert_eq!(name, "HOUR=0"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_all_hours_fitted() {
        let hours: Vec<i32> = (0..24).chain(0..24).collect();
        let latitudes: Vec<f64> = hours
            .iter()
            .enumerate()
            .map(|(i, h)| 40.6 + *h as f64 * 0.002 + (i / 24) as f64 * 0.01)
            .collect();
        let df = df!(
            "Latitude" => latitudes,
            "HOUR" => hours
        )
        .unwrap();
        let fit = fit_categorical(&df, "Latitude", "HOUR", &DummyEncoding::hours()).unwrap();
        assert_eq!(fit.coefficients.len(), 24);
        assert_eq!(fit.observations, 48);
        assert_eq!(fit.df_residual, 24);
        assert!((fit.intercept().unwrap() - 40.605).abs() < 1e-9);
        let h5 = fit.coefficient("HOUR=5").unwrap().estimate;
        assert!((h5 - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_collinear_columns_are_rank_deficient() {
        let mut design = DesignMatrix::new(vec![
            INTERCEPT.to_string(),
            "a".to_string(),
            "b".to_string(),
        ]);
        for x in [1.0, 2.0, 3.0, 4.0] {
            design.push_row(&[1.0, x, 2.0 * x]).unwrap();
        }
        let result = Ols::fit(&design, &[1.0, 2.0, 3.0, 5.0]);
        assert!(matches!(result, Err(RegressionError::RankDeficient(_))));
    }

    #[test]
    fn test_no_residual_degrees_of_freedom() {
        let design = simple_design(&[1.0, 2.0]);
        let result = Ols::fit(&design, &[1.0, 3.0]);
        assert!(matches!(
            result,
            Err(RegressionError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_nulls_and_undeclared_levels_skipped() {
        let df = df!(
            "Latitude" => [Some(40.0), None, Some(41.0), Some(42.0), Some(99.0)],
            "HOUR" => [Some(3), Some(3), Some(3), Some(3), Some(30)]
        )
        .unwrap();
        let encoding = DummyEncoding::new([3], 3).unwrap();
        let fit = fit_categorical(&df, "Latitude", "HOUR", &encoding).unwrap();
        assert_eq!(fit.observations, 3);
        assert!((fit.intercept().unwrap() - 41.0).abs() < 1e-12);
    }

    #[test]
    fn test_encoding() {
        assert!(matches!(
            DummyEncoding::new([1, 2], 0),
            Err(RegressionError::UnknownReference(0))
        ));
        let hours = DummyEncoding::hours();
        assert_eq!(hours.n_parameters(), 24);
        assert_eq!(hours.parameter_names("HOUR")[1], "HOUR=1");
        assert_eq!(hours.encode(0).unwrap().iter().sum::<f64>(), 1.0);
        let row = hours.encode(5).unwrap();
        assert_eq!((row[0], row[5]), (1.0, 1.0));
        assert!(hours.encode(24).is_none());
    }
}

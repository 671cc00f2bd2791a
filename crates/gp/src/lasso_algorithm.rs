use crate::algorithm::GpRegressor;
use crate::errors::{GpError, Result};
use crate::lasso_parameters::{LassoGpRegressorParams, LassoGpRegressorValidParams};
use crate::mean_models::PriorMean;
use crate::metrics::Score;
use crate::optimization::{into_f64, optimize_params, Algorithm, OptimParams};
use crate::parameters::GpRegressorParams;

use linfa::prelude::{Dataset, DatasetBase, Fit, Float};
use linfa::ParamGuard;
use linfa_elasticnet::ElasticNet;
use log::{debug, info};
use ndarray::{arr1, Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
use seqgp_kernels::Kernel;
use std::fmt;

#[cfg(feature = "persistent")]
use crate::algorithm::GpRegressorRecord;
#[cfg(feature = "persistent")]
use crate::persistence::{check_version, read_record, write_record, GP_SCHEMA_VERSION};
#[cfg(feature = "persistent")]
use serde::{de::DeserializeOwned, Deserialize, Serialize};
#[cfg(feature = "persistent")]
use std::path::Path;

/// Coefficients under this magnitude deselect their column
const MASK_THRESHOLD: f64 = 1e-8;
/// Iterations budget of the L1 linear model
const LASSO_MAX_ITER: u32 = 100_000;
/// Search interval of the log L1 penalty
const GAMMA_BOUNDS: (f64, f64) = (-20., 10.);

/// Columns with a non negligible L1 linear model coefficient at penalty `exp(gamma)`
fn select_columns<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    y: &ArrayBase<impl Data<Elem = F>, Ix1>,
    gamma: F,
) -> Result<Vec<bool>> {
    let lasso = ElasticNet::lasso()
        .penalty(gamma.exp())
        .max_iterations(LASSO_MAX_ITER)
        .fit(&Dataset::new(x.to_owned(), y.to_owned()))?;
    let threshold = F::cast(MASK_THRESHOLD);
    Ok(lasso.hyperplane().iter().map(|w| w.abs() > threshold).collect())
}

fn mask_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &keep)| keep.then_some(i))
        .collect()
}

/// Gaussian process regression on the columns selected by an L1
/// regularized linear model.
///
/// The log penalty `gamma` of the linear model is searched for so that
/// the negative log marginal likelihood of the regressor fitted on the
/// selected columns is minimal.
#[derive(Clone, Debug)]
pub struct LassoGpRegressor<F: Float, Mean: PriorMean<F, F>, K: Kernel<F, Elem = F>> {
    gamma: F,
    mask: Vec<bool>,
    selected: Vec<usize>,
    regressor: GpRegressor<F, Mean, K>,
    params: LassoGpRegressorValidParams<F, Mean, K>,
}

impl<F: Float, Mean: PriorMean<F, F>, K: Kernel<F, Elem = F>> fmt::Display for LassoGpRegressor<F, Mean, K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "LassoGP(gamma={}, selected={:?}, {})",
            self.gamma, self.selected, self.regressor
        )
    }
}

impl<F: Float, Mean: PriorMean<F, F>, K: Kernel<F, Elem = F>> LassoGpRegressor<F, Mean, K> {
    /// Parameters constructor given the inner regressor parameters
    pub fn params(gp_params: GpRegressorParams<F, Mean, K>) -> LassoGpRegressorParams<F, Mean, K> {
        LassoGpRegressorParams::new(gp_params)
    }

    fn restrict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        if x.ncols() != self.mask.len() {
            return Err(GpError::LengthMismatch(format!(
                "inputs of length {} given while model is trained on length {}",
                x.ncols(),
                self.mask.len()
            )));
        }
        Ok(x.select(Axis(1), &self.selected))
    }

    /// Predict means and covariance at the rows of `x` restricted to the selected columns
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<(Array1<F>, Array2<F>)> {
        self.regressor.predict(&self.restrict(x)?)
    }

    /// Score predictions at `x` against `y` (see [GpRegressor::score])
    pub fn score(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        metrics: &[&str],
    ) -> Result<Score<F>> {
        self.regressor.score(&self.restrict(x)?, y, metrics)
    }

    /// Selected columns
    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Log of the L1 penalty
    pub fn gamma(&self) -> F {
        self.gamma
    }

    /// Regressor fitted on the selected columns
    pub fn regressor(&self) -> &GpRegressor<F, Mean, K> {
        &self.regressor
    }

    /// Parameters used to fit the model
    pub fn params_used(&self) -> &LassoGpRegressorValidParams<F, Mean, K> {
        &self.params
    }
}

impl<F: Float, Mean: PriorMean<F, F>, K: Kernel<F, Elem = F>> LassoGpRegressorValidParams<F, Mean, K> {
    /// Column selection at `gamma` and regressor fitted on selected columns
    fn fit_at(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        variances: Option<&Array1<F>>,
        gamma: F,
    ) -> Result<(Vec<bool>, Vec<usize>, GpRegressor<F, Mean, K>)> {
        let mask = select_columns(x, y, gamma)?;
        let selected = mask_indices(&mask);
        if selected.is_empty() {
            return Err(GpError::ConfigError(format!(
                "no column selected at gamma = {gamma}"
            )));
        }
        let xs = x.select(Axis(1), &selected);
        let regressor = self
            .gp_params
            .fit_with_variances(&Dataset::new(xs, y.to_owned()), variances)?;
        Ok((mask, selected, regressor))
    }

    /// Search the L1 penalty then fit the regressor on the selected columns,
    /// given optional per-point `variances` of the targets passed to every
    /// inner regressor fit.
    pub fn fit_with_variances(
        &self,
        dataset: &DatasetBase<ArrayBase<impl Data<Elem = F>, Ix2>, ArrayBase<impl Data<Elem = F>, Ix1>>,
        variances: Option<&Array1<F>>,
    ) -> Result<LassoGpRegressor<F, Mean, K>> {
        let (x, y) = (dataset.records(), dataset.targets());
        if x.nrows() != y.len() {
            return Err(GpError::LengthMismatch(format!(
                "{} inputs given for {} targets",
                x.nrows(),
                y.len()
            )));
        }
        if let Some(v) = variances {
            if v.len() != y.len() {
                return Err(GpError::LengthMismatch(format!(
                    "{} variances given for {} targets",
                    v.len(),
                    y.len()
                )));
            }
        }
        let objfn = |g: &[f64], _gradient: Option<&mut [f64]>, _params: &mut ()| -> f64 {
            match self.fit_at(x, y, variances, F::cast(g[0])) {
                Ok((_, selected, regressor)) => {
                    debug!("gamma = {}: columns {selected:?}, neg_log_ml = {}", g[0], regressor.ml());
                    into_f64(regressor.ml())
                }
                Err(err) => {
                    debug!("gamma = {} rejected: {err}", g[0]);
                    f64::INFINITY
                }
            }
        };
        let gamma0 = into_f64(self.gamma).clamp(GAMMA_BOUNDS.0, GAMMA_BOUNDS.1);
        let (_, gamma) = optimize_params(
            objfn,
            &arr1(&[gamma0]),
            &[GAMMA_BOUNDS],
            &OptimParams {
                algorithm: Algorithm::Cobyla,
                max_eval: self.max_eval,
                ..OptimParams::default()
            },
        );
        let gamma = F::cast(gamma[0]);

        let (mask, selected, regressor) = self.fit_at(x, y, variances, gamma)?;
        info!("Lasso GP fitted with gamma = {gamma}, selected columns = {selected:?}");
        Ok(LassoGpRegressor {
            gamma,
            mask,
            selected,
            regressor,
            params: self.clone(),
        })
    }
}

impl<F: Float, Mean: PriorMean<F, F>, K: Kernel<F, Elem = F>> LassoGpRegressorParams<F, Mean, K> {
    /// Check parameters then fit with optional per-point `variances`
    /// (see [LassoGpRegressorValidParams::fit_with_variances])
    pub fn fit_with_variances(
        &self,
        dataset: &DatasetBase<ArrayBase<impl Data<Elem = F>, Ix2>, ArrayBase<impl Data<Elem = F>, Ix1>>,
        variances: Option<&Array1<F>>,
    ) -> Result<LassoGpRegressor<F, Mean, K>> {
        self.check_ref()?.fit_with_variances(dataset, variances)
    }
}

impl<F, Mean, K, D, DT> Fit<ArrayBase<D, Ix2>, ArrayBase<DT, Ix1>, GpError>
    for LassoGpRegressorValidParams<F, Mean, K>
where
    F: Float,
    Mean: PriorMean<F, F>,
    K: Kernel<F, Elem = F>,
    D: Data<Elem = F>,
    DT: Data<Elem = F>,
{
    type Object = LassoGpRegressor<F, Mean, K>;

    fn fit(&self, dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<DT, Ix1>>) -> Result<Self::Object> {
        self.fit_with_variances(dataset, None)
    }
}

/// Persisted content of a [LassoGpRegressor]
#[cfg(feature = "persistent")]
#[derive(Serialize, Deserialize)]
#[serde(bound(
    serialize = "F: Serialize, Mean: Serialize, K: Serialize",
    deserialize = "F: Deserialize<'de>, Mean: Deserialize<'de>, K: Deserialize<'de>"
))]
struct LassoGpRegressorRecord<F, Mean, K> {
    version: u32,
    gamma: F,
    mask: Vec<bool>,
    initial_gamma: F,
    max_eval: usize,
    regressor: GpRegressorRecord<F, Mean, K, F>,
}

#[cfg(feature = "persistent")]
impl<F, Mean, K> LassoGpRegressor<F, Mean, K>
where
    F: Float + Serialize + DeserializeOwned,
    Mean: PriorMean<F, F> + Serialize + DeserializeOwned,
    K: Kernel<F, Elem = F> + Serialize + DeserializeOwned,
{
    /// Save the model as JSON in the given file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let record = LassoGpRegressorRecord {
            version: GP_SCHEMA_VERSION,
            gamma: self.gamma,
            mask: self.mask.clone(),
            initial_gamma: self.params.gamma,
            max_eval: self.params.max_eval,
            regressor: self.regressor.to_record(),
        };
        write_record(path, &record)
    }

    /// Load a model saved with [LassoGpRegressor::save]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let record: LassoGpRegressorRecord<F, Mean, K> = read_record(path)?;
        check_version(record.version)?;
        let regressor = GpRegressor::from_record(record.regressor)?;
        let selected = mask_indices(&record.mask);
        if selected.len() != regressor.dims().1 {
            return Err(GpError::LoadError(format!(
                "{} selected columns while the regressor is trained on {}",
                selected.len(),
                regressor.dims().1
            )));
        }
        let params = LassoGpRegressorValidParams {
            gp_params: regressor.params_used().clone(),
            gamma: record.initial_gamma,
            max_eval: record.max_eval,
        };
        Ok(LassoGpRegressor {
            gamma: record.gamma,
            mask: record.mask,
            selected,
            regressor,
            params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mean_models::ZeroMean;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use seqgp_kernels::LinearKernel;

    fn training() -> (Array2<f64>, Array1<f64>) {
        let x = array![[1., 1.], [2., -1.], [3., -1.], [4., 1.]];
        let y = x.column(0).mapv(|v| 2. * v);
        (x, y)
    }

    #[test]
    fn test_uncorrelated_column_is_dropped() {
        let (x, y) = training();
        assert_eq!(select_columns(&x, &y, 0.).unwrap(), vec![true, false]);
        assert_eq!(select_columns(&x, &y, 8.).unwrap(), vec![false, false]);
    }

    #[test]
    fn test_fit_predict_on_selected_columns() {
        let (x, y) = training();
        let gp_params = GpRegressor::params(ZeroMean(), LinearKernel());
        let model = LassoGpRegressor::params(gp_params)
            .max_eval(10)
            .fit(&Dataset::new(x.clone(), y))
            .expect("Lasso GP fitted");
        assert_eq!(model.mask(), &[true, false]);
        assert!(model.gamma() >= -20. && model.gamma() <= 10.);
        assert_eq!(model.regressor().dims(), (4, 1));

        let xnew = array![[2.5, 100.], [3.5, -100.]];
        let (mean, cov) = model.predict(&xnew).unwrap();
        let (expected, expected_cov) = model
            .regressor()
            .predict(&xnew.select(Axis(1), &[0]))
            .unwrap();
        assert_abs_diff_eq!(mean, expected, epsilon = 1e-12);
        assert_abs_diff_eq!(cov, expected_cov, epsilon = 1e-12);
        assert!(model.score(&x, &training().1, &["R"]).unwrap().value().unwrap() > 0.9);

        assert!(matches!(
            model.predict(&array![[1.]]),
            Err(GpError::LengthMismatch(_))
        ));
    }

    #[test]
    fn test_fit_with_variances() {
        let (x, y) = training();
        let variances = array![0.01, 0.02, 0.01, 0.03];
        let gp_params = GpRegressor::params(ZeroMean(), LinearKernel());
        let model = LassoGpRegressor::params(gp_params)
            .max_eval(10)
            .fit_with_variances(&Dataset::new(x.clone(), y.clone()), Some(&variances))
            .expect("Lasso GP fitted with variances");
        assert_eq!(model.mask(), &[true, false]);
        // no noise hyperparameter with per-point variances
        assert_eq!(model.regressor().hypers().len(), 1);
        assert_eq!(model.regressor().dims(), (4, 1));
        let (mean, _) = model.predict(&x).unwrap();
        assert!(mean.iter().all(|v| v.is_finite()));
        assert!(model.score(&x, &y, &["R"]).unwrap().value().unwrap() > 0.9);

        let res = LassoGpRegressor::params(GpRegressor::params(ZeroMean(), LinearKernel()))
            .fit_with_variances(&Dataset::new(x, training().1), Some(&array![0.1]));
        assert!(matches!(res, Err(GpError::LengthMismatch(_))));
    }

    #[cfg(feature = "persistent")]
    #[test]
    fn test_save_load() {
        use std::fs;

        let (x, y) = training();
        let gp_params = GpRegressor::params(ZeroMean(), LinearKernel());
        let model = LassoGpRegressor::params(gp_params)
            .max_eval(5)
            .fit(&Dataset::new(x.clone(), y))
            .unwrap();
        let test_dir = "target/tests";
        fs::create_dir_all(test_dir).ok();
        let path = format!("{test_dir}/lasso_regressor_save_load.json");
        model.save(&path).unwrap();
        let loaded = LassoGpRegressor::<f64, ZeroMean, LinearKernel>::load(&path).unwrap();
        assert_eq!(loaded.mask(), model.mask());
        assert_abs_diff_eq!(loaded.gamma(), model.gamma());
        assert_eq!(loaded.regressor().hypers(), model.regressor().hypers());
        let xnew = array![[2.5, 7.], [0.5, -3.]];
        let (m1, c1) = model.predict(&xnew).unwrap();
        let (m2, c2) = loaded.predict(&xnew).unwrap();
        assert_abs_diff_eq!(m1, m2, epsilon = 1e-12);
        assert_abs_diff_eq!(c1, c2, epsilon = 1e-12);

        let content = fs::read_to_string(&path).unwrap();
        let bad_mask = format!("{test_dir}/lasso_regressor_bad_mask.json");
        fs::write(&bad_mask, content.replace("[true,false]", "[true,true]")).unwrap();
        assert!(matches!(
            LassoGpRegressor::<f64, ZeroMean, LinearKernel>::load(&bad_mask),
            Err(GpError::LoadError(_))
        ));
    }
}

//! A module for metrics to score model predictions against ground truth:
//! rank correlation, coefficient of determination and correlation for
//! regression, area under the ROC curve for binary classification.

use crate::errors::{GpError, Result};
use linfa::Float;
use ndarray::{ArrayBase, Data, Ix1, Zip};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Regression metrics available through `score`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Metric {
    /// Kendall rank correlation (tau-b)
    KendallTau,
    /// Coefficient of determination
    R2,
    /// Pearson correlation coefficient
    R,
}

impl Metric {
    /// Metric name
    pub fn name(&self) -> &'static str {
        match self {
            Metric::KendallTau => "kendalltau",
            Metric::R2 => "R2",
            Metric::R => "R",
        }
    }

    /// Score `y_pred` against `y_true`
    pub fn compute<F: Float>(
        &self,
        y_true: &ArrayBase<impl Data<Elem = F>, Ix1>,
        y_pred: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> F {
        match self {
            Metric::KendallTau => kendall_tau(y_true, y_pred),
            Metric::R2 => r2_score(y_true, y_pred),
            Metric::R => pearson_r(y_true, y_pred),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Metric {
    type Err = GpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "kendalltau" => Ok(Metric::KendallTau),
            "R2" => Ok(Metric::R2),
            "R" => Ok(Metric::R),
            _ => Err(GpError::InvalidMetric(s.to_string())),
        }
    }
}

/// Result of a `score` call
#[derive(Clone, Debug, PartialEq)]
pub enum Score<F> {
    /// Value of the single requested metric
    Value(F),
    /// Values of several metrics by name
    Map(BTreeMap<String, F>),
}

impl<F: Copy> Score<F> {
    /// Single metric value if any
    pub fn value(&self) -> Option<F> {
        match self {
            Score::Value(v) => Some(*v),
            Score::Map(_) => None,
        }
    }

    /// Value of the `name` metric
    pub fn get(&self, name: &str) -> Option<F> {
        match self {
            Score::Value(_) => None,
            Score::Map(m) => m.get(name).copied(),
        }
    }
}

/// Parse requested metric names, no name means Kendall tau
pub(crate) fn parse_metrics(names: &[&str]) -> Result<Vec<Metric>> {
    if names.is_empty() {
        Ok(vec![Metric::KendallTau])
    } else {
        let mut metrics: Vec<Metric> = Vec::with_capacity(names.len());
        for name in names {
            let metric: Metric = name.parse()?;
            if !metrics.contains(&metric) {
                metrics.push(metric);
            }
        }
        Ok(metrics)
    }
}

/// Compute requested metrics, a single distinct one gives a [Score::Value]
pub(crate) fn score_with<F: Float>(
    metrics: &[Metric],
    y_true: &ArrayBase<impl Data<Elem = F>, Ix1>,
    y_pred: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Score<F> {
    match metrics {
        [single] => Score::Value(single.compute(y_true, y_pred)),
        _ => Score::Map(
            metrics
                .iter()
                .map(|m| (m.name().to_string(), m.compute(y_true, y_pred)))
                .collect(),
        ),
    }
}

/// Kendall tau-b rank correlation, NaN when one of the series is constant
pub fn kendall_tau<F: Float>(
    a: &ArrayBase<impl Data<Elem = F>, Ix1>,
    b: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> F {
    let n = a.len().min(b.len());
    let (mut concordant, mut discordant) = (0usize, 0usize);
    let (mut ties_a, mut ties_b) = (0usize, 0usize);
    for i in 0..n {
        for j in i + 1..n {
            let da = a[i].partial_cmp(&a[j]).unwrap_or(Ordering::Equal);
            let db = b[i].partial_cmp(&b[j]).unwrap_or(Ordering::Equal);
            match (da, db) {
                (Ordering::Equal, Ordering::Equal) => {}
                (Ordering::Equal, _) => ties_a += 1,
                (_, Ordering::Equal) => ties_b += 1,
                (x, y) if x == y => concordant += 1,
                _ => discordant += 1,
            }
        }
    }
    let cd = F::cast(concordant + discordant);
    let denom = ((cd + F::cast(ties_a)) * (cd + F::cast(ties_b))).sqrt();
    if denom == F::zero() {
        F::nan()
    } else {
        (F::cast(concordant) - F::cast(discordant)) / denom
    }
}

/// Coefficient of determination `1 - SS_res / SS_tot`
pub fn r2_score<F: Float>(
    y_true: &ArrayBase<impl Data<Elem = F>, Ix1>,
    y_pred: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> F {
    let mean = y_true.mean().unwrap_or_else(F::zero);
    let ss_res = Zip::from(y_true)
        .and(y_pred)
        .fold(F::zero(), |acc, &t, &p| acc + (t - p) * (t - p));
    let ss_tot = y_true.fold(F::zero(), |acc, &t| acc + (t - mean) * (t - mean));
    if ss_tot == F::zero() {
        if ss_res == F::zero() {
            F::one()
        } else {
            F::zero()
        }
    } else {
        F::one() - ss_res / ss_tot
    }
}

/// Pearson correlation coefficient, NaN when one of the series is constant
pub fn pearson_r<F: Float>(
    a: &ArrayBase<impl Data<Elem = F>, Ix1>,
    b: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> F {
    let (ma, mb) = (
        a.mean().unwrap_or_else(F::zero),
        b.mean().unwrap_or_else(F::zero),
    );
    let (sab, saa, sbb) = Zip::from(a).and(b).fold(
        (F::zero(), F::zero(), F::zero()),
        |(sab, saa, sbb), &x, &y| {
            let (dx, dy) = (x - ma, y - mb);
            (sab + dx * dy, saa + dx * dx, sbb + dy * dy)
        },
    );
    sab / (saa * sbb).sqrt()
}

/// Area under the ROC curve of `scores` for labels in {-1, +1}
///
/// Mann-Whitney formulation with averaged ranks for tied scores,
/// 0.5 when only one class is present.
pub fn roc_auc<F: Float>(
    labels: &ArrayBase<impl Data<Elem = F>, Ix1>,
    scores: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> F {
    let n = scores.len();
    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| {
        scores[a]
            .partial_cmp(&scores[b])
            .unwrap_or(Ordering::Equal)
    });

    let n_pos = labels.iter().filter(|&&l| l > F::zero()).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return F::cast(0.5);
    }

    let mut rank_sum_pos = 0.0f64;
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && scores[indices[j]] == scores[indices[i]] {
            j += 1;
        }
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        for &idx in indices.iter().take(j).skip(i) {
            if labels[idx] > F::zero() {
                rank_sum_pos += avg_rank;
            }
        }
        i = j;
    }

    let (n_pos, n_neg) = (n_pos as f64, n_neg as f64);
    F::cast((rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_kendall_tau() {
        let a = array![1f64, 2., 3., 4., 5.];
        assert_abs_diff_eq!(kendall_tau(&a, &array![2., 4., 6., 8., 10.]), 1.);
        assert_abs_diff_eq!(kendall_tau(&a, &array![5., 4., 3., 2., 1.]), -1.);
        // 7 concordant and 3 discordant pairs
        assert_abs_diff_eq!(kendall_tau(&a, &array![3., 1., 2., 5., 4.]), 0.4, epsilon = 1e-12);
        // one tie: 5 concordant pairs over sqrt(5 * 6)
        let t = kendall_tau(&array![1., 1., 2., 3.], &array![1., 2., 3., 4.]);
        assert_abs_diff_eq!(t, 5. / 30f64.sqrt(), epsilon = 1e-12);
        assert!(kendall_tau(&a, &array![1., 1., 1., 1., 1.]).is_nan());
    }

    #[test]
    fn test_r2_and_r() {
        let y = array![1., 2., 3., 4.];
        assert_abs_diff_eq!(r2_score(&y, &y), 1.);
        assert_abs_diff_eq!(r2_score(&y, &array![2.5, 2.5, 2.5, 2.5]), 0.);
        assert_abs_diff_eq!(r2_score(&y, &array![1., 2., 3., 5.]), 0.8, epsilon = 1e-12);
        assert_abs_diff_eq!(pearson_r(&y, &array![2., 4., 6., 8.]), 1., epsilon = 1e-12);
        assert_abs_diff_eq!(pearson_r(&y, &array![-1., -2., -3., -4.]), -1., epsilon = 1e-12);
    }

    #[test]
    fn test_roc_auc() {
        let labels = array![-1., -1., 1., 1.];
        assert_abs_diff_eq!(roc_auc(&labels, &array![0.1, 0.4, 0.35, 0.8]), 0.75);
        assert_abs_diff_eq!(roc_auc(&labels, &array![0.1, 0.2, 0.3, 0.4]), 1.);
        assert_abs_diff_eq!(roc_auc(&labels, &array![0.5, 0.5, 0.5, 0.5]), 0.5);
        assert_abs_diff_eq!(roc_auc(&array![1., 1.], &array![0.1, 0.2]), 0.5);
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(parse_metrics(&[]).unwrap(), vec![Metric::KendallTau]);
        assert_eq!(parse_metrics(&["R2", "R"]).unwrap(), vec![Metric::R2, Metric::R]);
        assert_eq!(parse_metrics(&["R2", "R2"]).unwrap(), vec![Metric::R2]);
        assert_eq!(
            parse_metrics(&["R", "R2", "R"]).unwrap(),
            vec![Metric::R, Metric::R2]
        );
        assert!(matches!(
            parse_metrics(&["R2", "spearman"]),
            Err(GpError::InvalidMetric(m)) if m == "spearman"
        ));
        let (y, p) = (array![1., 2., 3.], array![1., 2., 3.]);
        assert_eq!(score_with(&[Metric::R2], &y, &p), Score::Value(1.));
        let s = score_with(&[Metric::R2, Metric::KendallTau], &y, &p);
        assert_eq!(s.get("R2"), Some(1.));
        assert_eq!(s.get("kendalltau"), Some(1.));
        assert_eq!(s.value(), None);
    }
}

//! Run configuration
//!
//! `EsOptions` mirrors the option set of the customizable ES. Every field has
//! a default, so partial JSON/YAML documents are accepted. `resolve` is the
//! single validation pass: impossible values fail fast, while the documented
//! population-size conflicts are clamped with a warning.

use crate::error::{EsError, EsResult};
use evolving_es_sampling::{BaseSampler, SamplerConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Restart strategy on stagnation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartMode {
    #[default]
    #[serde(rename = "off", alias = "none")]
    Off,
    #[serde(rename = "IPOP", alias = "ipop")]
    Ipop,
    #[serde(rename = "BIPOP", alias = "bipop")]
    Bipop,
}

impl FromStr for RestartMode {
    type Err = EsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "none" | "" => Ok(RestartMode::Off),
            "ipop" => Ok(RestartMode::Ipop),
            "bipop" => Ok(RestartMode::Bipop),
            _ => Err(EsError::InvalidConfig(format!("unknown restart mode: {}", s))),
        }
    }
}

/// Parent selection scheme
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionKind {
    #[default]
    #[serde(rename = "best", alias = "none")]
    Best,
    #[serde(rename = "pairwise")]
    Pairwise,
}

impl FromStr for SelectionKind {
    type Err = EsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "best" | "none" | "" => Ok(SelectionKind::Best),
            "pairwise" => Ok(SelectionKind::Pairwise),
            _ => Err(EsError::InvalidConfig(format!("unknown selection: {}", s))),
        }
    }
}

/// Recombination weighting scheme
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightScheme {
    /// Log-linear weights `ln((lambda+1)/2) - ln(i)`
    #[default]
    #[serde(rename = "default", alias = "none")]
    LogLinear,
    /// Equal weights `1/mu`
    #[serde(rename = "1/n")]
    Equal,
    /// Halving weights `1/2^i` plus an equal share of the remainder
    #[serde(rename = "1/2^n")]
    Halving,
}

impl FromStr for WeightScheme {
    type Err = EsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" | "none" | "" | "loglinear" | "log-linear" => Ok(WeightScheme::LogLinear),
            "1/n" | "equal" => Ok(WeightScheme::Equal),
            "1/2^n" | "halving" => Ok(WeightScheme::Halving),
            _ => Err(EsError::InvalidConfig(format!("unknown weights: {}", s))),
        }
    }
}

impl fmt::Display for WeightScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WeightScheme::LogLinear => "default",
            WeightScheme::Equal => "1/n",
            WeightScheme::Halving => "1/2^n",
        };
        f.write_str(name)
    }
}

/// Options of the customizable ES.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EsOptions {
    /// Active covariance update (negative weights for the worst offspring)
    pub active: bool,
    /// Plus-selection: parents compete with offspring
    pub elitism: bool,
    /// Mirrored (antithetic) sampling
    pub mirrored: bool,
    /// Orthogonal sampling
    pub orthogonal: bool,
    /// Sequential evaluation with early stopping
    pub sequential: bool,
    /// Threshold convergence
    pub threshold: bool,
    /// Two-point step-size adaptation
    pub two_point: bool,
    pub base_sampler: BaseSampler,
    pub ipop: RestartMode,
    pub selection: SelectionKind,
    pub weights: WeightScheme,
    /// Parent count, default `lambda / 2`
    pub mu: Option<usize>,
    /// Offspring count, default `4 + floor(3 ln n)`
    pub lambda: Option<usize>,
    /// Initial step size, default 1
    pub sigma: Option<f64>,
    /// RNG seed; entropy when absent
    pub seed: Option<u64>,
}

impl Default for EsOptions {
    fn default() -> Self {
        Self {
            active: false,
            elitism: false,
            mirrored: false,
            orthogonal: false,
            sequential: false,
            threshold: false,
            two_point: false,
            base_sampler: BaseSampler::Gaussian,
            ipop: RestartMode::Off,
            selection: SelectionKind::Best,
            weights: WeightScheme::LogLinear,
            mu: None,
            lambda: None,
            sigma: None,
            seed: None,
        }
    }
}

impl EsOptions {
    pub fn from_json_str(s: &str) -> EsResult<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_yaml_str(s: &str) -> EsResult<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn to_json_string(&self) -> EsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            base: self.base_sampler,
            orthogonal: self.orthogonal,
            mirrored: self.mirrored,
        }
    }

    /// Validate the options for an `n`-dimensional problem and fix the
    /// population sizes.
    pub fn resolve(&self, n: usize) -> EsResult<ResolvedOptions> {
        if n == 0 {
            return Err(EsError::InvalidConfig("dimension must be positive".into()));
        }
        if self.mu == Some(0) {
            return Err(EsError::InvalidConfig("mu must be positive".into()));
        }
        if self.lambda == Some(0) {
            return Err(EsError::InvalidConfig("lambda must be positive".into()));
        }
        let sigma = self.sigma.unwrap_or(1.0);
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(EsError::InvalidConfig(format!(
                "initial sigma must be positive and finite, got {}",
                sigma
            )));
        }

        let lambda = self.lambda.unwrap_or_else(|| default_lambda(n));
        let mu = self.mu.unwrap_or(lambda / 2);
        let sizes = PopulationSizes::clamped(mu, lambda, self.selection, self.two_point);

        let seq_cutoff = match self.selection {
            SelectionKind::Pairwise => 2 * sizes.mu,
            SelectionKind::Best => sizes.mu,
        };

        Ok(ResolvedOptions {
            n,
            mu: sizes.mu,
            lambda: sizes.lambda,
            sigma,
            seq_cutoff,
            options: self.clone(),
        })
    }
}

/// Default offspring count `4 + floor(3 ln n)`.
pub fn default_lambda(n: usize) -> usize {
    4 + (3.0 * (n as f64).ln()).floor() as usize
}

/// Parent/offspring counts after the documented silent clamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PopulationSizes {
    pub mu: usize,
    pub lambda: usize,
}

impl PopulationSizes {
    /// Clamp `mu`/`lambda` into a combination the selection scheme and TPA
    /// can work with. Used at run start and again after every restart.
    pub fn clamped(mu: usize, lambda: usize, selection: SelectionKind, two_point: bool) -> Self {
        let requested = (mu, lambda);
        let mut mu = mu.max(1);
        let mut lambda = lambda.max(1);

        if selection == SelectionKind::Pairwise && lambda % 2 == 1 {
            lambda -= 1;
            if lambda == 0 {
                lambda = 2;
            }
        }

        // TPA spends two evaluations of every generation on its probes.
        let eff_lambda = if two_point {
            let min_lambda = if selection == SelectionKind::Pairwise { 4 } else { 3 };
            lambda = lambda.max(min_lambda);
            lambda - 2
        } else {
            lambda
        };

        let max_mu = match selection {
            SelectionKind::Pairwise => (eff_lambda / 2).max(1),
            SelectionKind::Best => eff_lambda,
        };
        mu = mu.min(max_mu);

        if requested != (mu, lambda) {
            warn!(
                "Adjusted population sizes mu={} lambda={} to mu={} lambda={} ({:?} selection, two-point={})",
                requested.0, requested.1, mu, lambda, selection, two_point
            );
        }

        Self { mu, lambda }
    }
}

/// Options after validation, with population sizes fixed.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedOptions {
    pub n: usize,
    pub mu: usize,
    pub lambda: usize,
    pub sigma: f64,
    pub seq_cutoff: usize,
    pub options: EsOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let resolved = EsOptions::default().resolve(10).unwrap();
        assert_eq!(resolved.lambda, 10);
        assert_eq!(resolved.mu, 5);
        assert_eq!(resolved.seq_cutoff, 5);
        assert_eq!(resolved.sigma, 1.0);
    }

    #[test]
    fn test_pairwise_forces_even_lambda() {
        let opts = EsOptions {
            selection: SelectionKind::Pairwise,
            lambda: Some(7),
            mu: Some(3),
            ..Default::default()
        };
        let resolved = opts.resolve(5).unwrap();
        assert_eq!(resolved.lambda, 6);
        assert_eq!(resolved.mu, 3);
        assert_eq!(resolved.seq_cutoff, 6);
    }

    #[test]
    fn test_pairwise_lambda_six_caps_mu() {
        let opts = EsOptions {
            selection: SelectionKind::Pairwise,
            lambda: Some(6),
            mu: Some(5),
            ..Default::default()
        };
        let resolved = opts.resolve(5).unwrap();
        assert_eq!(resolved.lambda, 6);
        assert!(resolved.mu <= 3);
    }

    #[test]
    fn test_pairwise_with_two_point() {
        let sizes = PopulationSizes::clamped(3, 2, SelectionKind::Pairwise, true);
        assert_eq!(sizes.lambda, 4);
        assert_eq!(sizes.mu, 1);
    }

    #[test]
    fn test_mu_larger_than_lambda_is_clamped() {
        let sizes = PopulationSizes::clamped(12, 8, SelectionKind::Best, false);
        assert_eq!(sizes, PopulationSizes { mu: 8, lambda: 8 });
        let sizes = PopulationSizes::clamped(12, 8, SelectionKind::Best, true);
        assert_eq!(sizes, PopulationSizes { mu: 6, lambda: 8 });
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        assert!(matches!(EsOptions::default().resolve(0), Err(EsError::InvalidConfig(_))));
        let opts = EsOptions { sigma: Some(-1.0), ..Default::default() };
        assert!(matches!(opts.resolve(3), Err(EsError::InvalidConfig(_))));
        let opts = EsOptions { lambda: Some(0), ..Default::default() };
        assert!(matches!(opts.resolve(3), Err(EsError::InvalidConfig(_))));
    }

    #[test]
    fn test_json_with_missing_keys() {
        let opts = EsOptions::from_json_str(
            r#"{"active": true, "two-point": true, "ipop": "BIPOP", "weights": "1/2^n", "base-sampler": "quasi-sobol"}"#,
        )
        .unwrap();
        assert!(opts.active);
        assert!(opts.two_point);
        assert!(!opts.mirrored);
        assert_eq!(opts.ipop, RestartMode::Bipop);
        assert_eq!(opts.weights, WeightScheme::Halving);
        assert_eq!(opts.base_sampler, BaseSampler::QuasiSobol);
        assert_eq!(opts.selection, SelectionKind::Best);
    }

    #[test]
    fn test_yaml_options() {
        let opts = EsOptions::from_yaml_str("selection: pairwise\nsequential: true\nlambda: 9\n").unwrap();
        assert_eq!(opts.selection, SelectionKind::Pairwise);
        assert!(opts.sequential);
        assert_eq!(opts.lambda, Some(9));
    }

    #[test]
    fn test_json_round_trip() {
        let opts = EsOptions { mirrored: true, seed: Some(42), ..Default::default() };
        let text = opts.to_json_string().unwrap();
        assert!(text.contains("\"base-sampler\""));
        assert_eq!(EsOptions::from_json_str(&text).unwrap(), opts);
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("IPOP".parse::<RestartMode>().unwrap(), RestartMode::Ipop);
        assert_eq!("pairwise".parse::<SelectionKind>().unwrap(), SelectionKind::Pairwise);
        assert_eq!("1/n".parse::<WeightScheme>().unwrap(), WeightScheme::Equal);
        assert!("sometimes".parse::<RestartMode>().is_err());
    }
}

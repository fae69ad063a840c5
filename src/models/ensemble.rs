//! Ensemble blender
//!
//! Combines per-model point forecasts with equal weight, and derives an
//! uncertainty band from an available model band widened by cross-model
//! disagreement at each horizon step.

use crate::error::{Error, Result};

/// Fraction of the ensemble point used as the fallback half-spread when
/// no model supplies a band.
const DEFAULT_BAND_FRAC: f64 = 0.05;

/// A `(lower5, upper95)` band accompanying a point forecast
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub lower5: Vec<f64>,
    pub upper95: Vec<f64>,
}

/// One model's contribution to the ensemble
#[derive(Debug, Clone)]
pub struct ModelForecast {
    pub name: String,
    pub point: Vec<f64>,
    pub band: Option<Band>,
}

/// Blended point forecast and band
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleForecast {
    pub point: Vec<f64>,
    pub lower5: Vec<f64>,
    pub upper95: Vec<f64>,
}

/// Blend the supplied forecasts.
///
/// Point: equal-weight mean per step. Band: the half-spread of the band
/// from the model named `prefer_band` (else the first model carrying
/// one, else ±5% of the ensemble point), widened per step by the
/// cross-model standard deviation of the point forecasts. With a single
/// model there is no disagreement term at all, not a widen-by-zero that
/// pretends otherwise.
///
/// All point vectors must share the horizon length of the first.
pub fn blend(forecasts: &[ModelForecast], prefer_band: Option<&str>) -> Result<EnsembleForecast> {
    if forecasts.is_empty() {
        return Err(Error::EmptyEnsemble);
    }

    let horizon = forecasts[0].point.len();
    for f in forecasts {
        if f.point.len() != horizon {
            return Err(Error::Model(format!(
                "forecast '{}' has horizon {}, expected {}",
                f.name,
                f.point.len(),
                horizon
            )));
        }
    }

    let n_models = forecasts.len() as f64;
    let point: Vec<f64> = (0..horizon)
        .map(|t| forecasts.iter().map(|f| f.point[t]).sum::<f64>() / n_models)
        .collect();

    let base = prefer_band
        .and_then(|name| forecasts.iter().find(|f| f.name == name && f.band.is_some()))
        .or_else(|| forecasts.iter().find(|f| f.band.is_some()))
        .and_then(|f| f.band.as_ref());

    let mut lower5 = Vec::with_capacity(horizon);
    let mut upper95 = Vec::with_capacity(horizon);

    for t in 0..horizon {
        let half = match base {
            Some(band) => (band.upper95[t] - band.lower5[t]) / 2.0,
            None => point[t].abs() * DEFAULT_BAND_FRAC,
        };

        let disagreement = if forecasts.len() > 1 {
            let mean = point[t];
            let var = forecasts
                .iter()
                .map(|f| (f.point[t] - mean).powi(2))
                .sum::<f64>()
                / n_models;
            var.sqrt()
        } else {
            0.0
        };

        lower5.push(point[t] - half - disagreement);
        upper95.push(point[t] + half + disagreement);
    }

    Ok(EnsembleForecast {
        point,
        lower5,
        upper95,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn forecast(name: &str, point: Vec<f64>, band: Option<Band>) -> ModelForecast {
        ModelForecast {
            name: name.to_string(),
            point,
            band,
        }
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert!(matches!(blend(&[], None), Err(Error::EmptyEnsemble)));
    }

    #[test]
    fn test_point_is_equal_weight_mean() {
        let result = blend(
            &[
                forecast("a", vec![100.0, 102.0], None),
                forecast("b", vec![110.0, 108.0], None),
            ],
            None,
        )
        .unwrap();

        assert_relative_eq!(result.point[0], 105.0);
        assert_relative_eq!(result.point[1], 105.0);
    }

    #[test]
    fn test_band_widening_never_shrinks() {
        let band = Band {
            lower5: vec![95.0, 96.0],
            upper95: vec![105.0, 106.0],
        };
        let result = blend(
            &[
                forecast("gbm", vec![100.0, 101.0], Some(band.clone())),
                forecast("tree", vec![120.0, 121.0], None),
            ],
            Some("gbm"),
        )
        .unwrap();

        for t in 0..2 {
            let base_width = band.upper95[t] - band.lower5[t];
            let blended_width = result.upper95[t] - result.lower5[t];
            assert!(blended_width >= base_width);
        }
        // Models disagree by 20, so the band must be strictly wider.
        assert!(result.upper95[0] - result.lower5[0] > 10.0);
    }

    #[test]
    fn test_single_model_has_no_disagreement_term() {
        let band = Band {
            lower5: vec![90.0],
            upper95: vec![110.0],
        };
        let result = blend(&[forecast("gbm", vec![100.0], Some(band))], Some("gbm")).unwrap();

        // Exactly the base half-spread around the point.
        assert_relative_eq!(result.lower5[0], 90.0);
        assert_relative_eq!(result.upper95[0], 110.0);
    }

    #[test]
    fn test_default_band_without_any_model_band() {
        let result = blend(&[forecast("tree", vec![200.0], None)], None).unwrap();

        assert_relative_eq!(result.lower5[0], 190.0);
        assert_relative_eq!(result.upper95[0], 210.0);
    }

    #[test]
    fn test_mismatched_horizons_rejected() {
        let result = blend(
            &[
                forecast("a", vec![1.0, 2.0], None),
                forecast("b", vec![1.0], None),
            ],
            None,
        );
        assert!(result.is_err());
    }
}

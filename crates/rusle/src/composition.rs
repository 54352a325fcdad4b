//! Soil loss `A = R * K * LS * C * P` and its severity classes

use serde::{Deserialize, Serialize};

use erosgis_algebra::RasterHandle;
use erosgis_algorithms::imagery::ClassificationScheme;
use erosgis_core::Result;

/// Product of the five factors; any no-data factor gives no-data
pub fn soil_loss(
    r: &RasterHandle,
    k: &RasterHandle,
    ls: &RasterHandle,
    c: &RasterHandle,
    p: &RasterHandle,
) -> Result<RasterHandle> {
    Ok(r.mul(k)?.mul(ls)?.mul(c)?.mul(p)?.rename("soil_loss"))
}

/// Severity class of each pixel; no-data takes the scheme's sentinel
pub fn classify_severity(soil_loss: &RasterHandle, scheme: &ClassificationScheme) -> Result<RasterHandle> {
    Ok(soil_loss.classify(scheme.clone())?.rename("class"))
}

/// Serializable severity classes: finite lower bounds, the last class is
/// open-ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub edges: Vec<f64>,
    pub nodata_class: u32,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            edges: vec![0.0, 5.0, 10.0, 20.0, 40.0, 80.0],
            nodata_class: ClassificationScheme::DEFAULT_NODATA_CLASS,
        }
    }
}

impl ClassificationConfig {
    pub fn scheme(&self) -> Result<ClassificationScheme> {
        ClassificationScheme::from_edges(&self.edges, self.nodata_class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::testing::{evaluate, static_handle};
    use approx::assert_relative_eq;
    use erosgis_algebra::BandInfo;

    fn constant(name: &str, v: f64) -> RasterHandle {
        static_handle(BandInfo::continuous(name), move |_, _| v)
    }

    #[test]
    fn test_soil_loss_product() {
        let r = constant("r", 500.0);
        let k = constant("k", 0.03);
        let ls = static_handle(BandInfo::continuous("ls"), |row, _| if row == 0 { f64::NAN } else { 2.0 });
        let c = constant("c", 0.25);
        let p = constant("p", 0.6);

        let a = soil_loss(&r, &k, &ls, &c, &p).unwrap();
        assert_eq!(a.name(), "soil_loss");
        let out = evaluate(&a);
        assert_relative_eq!(out.get(3, 3).unwrap(), 500.0 * 0.03 * 2.0 * 0.25 * 0.6, epsilon = 1e-12);
        assert!(out.get(0, 3).unwrap().is_nan());
    }

    #[test]
    fn test_severity_classes() {
        let values = [0.0, 4.99, 5.0, 19.0, 40.0, 79.9, 80.0, f64::NAN];
        let a = static_handle(BandInfo::continuous("a"), move |_, col| values[col]);
        let classes = classify_severity(&a, &ClassificationConfig::default().scheme().unwrap()).unwrap();
        let out = evaluate(&classes);
        let got: Vec<f64> = (0..8).map(|col| out.get(0, col).unwrap()).collect();
        assert_eq!(got, vec![1.0, 1.0, 2.0, 3.0, 5.0, 5.0, 6.0, 0.0]);
        assert_eq!(out.nodata(), Some(0.0));
    }

    #[test]
    fn test_config_matches_default_scheme() {
        assert_eq!(
            ClassificationConfig::default().scheme().unwrap(),
            ClassificationScheme::soil_loss_severity()
        );
        let bad = ClassificationConfig {
            edges: vec![0.0, 10.0, 5.0],
            nodata_class: 0,
        };
        assert!(bad.scheme().is_err());
    }
}

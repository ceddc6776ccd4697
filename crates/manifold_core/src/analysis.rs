//! End-to-end cost analysis of one trial collection.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::CostConfig;
use crate::costs::{covariation_cost, noise_cost, tolerance_cost, CostResult};
use crate::error::{Error, Result};
use crate::manifold::fingerprint::ManifoldFingerprint;
use crate::manifold::session::{with_session, ProcessOracleFactory};
use crate::manifold::source::{release_points, require_same_manifold_records, TrialSource};
use crate::traits::OracleFactory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostKind {
    Tolerance,
    Noise,
    Covariation,
}

impl CostKind {
    pub const ALL: [CostKind; 3] = [CostKind::Tolerance, CostKind::Noise, CostKind::Covariation];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostReport {
    pub fingerprint: ManifoldFingerprint,
    pub trials: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<CostResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise: Option<CostResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub covariation: Option<CostResult>,
}

impl CostReport {
    pub fn get(&self, kind: CostKind) -> Option<&CostResult> {
        match kind {
            CostKind::Tolerance => self.tolerance.as_ref(),
            CostKind::Noise => self.noise.as_ref(),
            CostKind::Covariation => self.covariation.as_ref(),
        }
    }
}

/// Runs the requested costs over `source` against one evaluator session.
///
/// The records are loaded once. They must share a single manifold; this is
/// checked before any session is opened. The session is closed on every exit path.
pub fn analyze<F: OracleFactory>(
    source: &TrialSource<'_>,
    factory: &F,
    config: &CostConfig,
    kinds: &[CostKind],
) -> Result<CostReport> {
    let records = source.records()?;
    let fingerprint = require_same_manifold_records(&records)?;
    let settings = &records
        .first()
        .ok_or(Error::EmptyInput("trial source has no releases"))?
        .settings;
    let points = release_points(&records);

    let mut report = CostReport {
        fingerprint,
        trials: points.len(),
        tolerance: None,
        noise: None,
        covariation: None,
    };
    with_session(factory, settings, |oracle| {
        for &kind in kinds {
            if report.get(kind).is_some() {
                continue;
            }
            match kind {
                CostKind::Tolerance => {
                    report.tolerance = Some(tolerance_cost(&points, oracle, &config.tolerance)?)
                }
                CostKind::Noise => report.noise = Some(noise_cost(&points, oracle, &config.noise)?),
                CostKind::Covariation => {
                    report.covariation =
                        Some(covariation_cost(&points, oracle, &config.covariation)?)
                }
            }
        }
        Ok(())
    })?;

    info!(
        fingerprint = %report.fingerprint,
        trials = report.trials,
        tolerance = report.tolerance.as_ref().map(|r| r.cost),
        noise = report.noise.as_ref().map(|r| r.cost),
        covariation = report.covariation.as_ref().map(|r| r.cost),
        "cost analysis finished"
    );
    Ok(report)
}

/// [`analyze`] against the external evaluator named in `config`.
pub fn analyze_with_evaluator(
    source: &TrialSource<'_>,
    config: &CostConfig,
    kinds: &[CostKind],
) -> Result<CostReport> {
    let factory = ProcessOracleFactory::new(config.evaluator.clone());
    analyze(source, &factory, config, kinds)
}

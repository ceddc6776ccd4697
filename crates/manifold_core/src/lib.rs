//! The `manifold_core` crate scores voice throwing trials against their
//! solution manifold, the landscape of closest-approach distances over
//! (release angle, release stretch).
//!
//! Key components:
//! - **Geometry**: `Point` and the `Vector` trait (unit vectors, distances, centroids).
//! - **Manifold**: fingerprints of landscape-determining settings, evaluator sessions speaking
//!   the line protocol, cached landscapes keyed by fingerprint, and trial sources.
//! - **Costs**: tolerance (best uniform shift), noise (best shrink toward the centroid) and
//!   covariation (best re-pairing of angles with stretches).
//! - **Search**: basin hopping over Nelder-Mead, and adaptive grid-seeded search points.
pub mod analysis;
pub mod config;
pub mod costs;
pub mod error;
pub mod geometry;
pub mod manifold;
pub mod optimize;
pub mod release;
pub mod search;
pub mod settings;
pub mod traits;

pub use analysis::{analyze, analyze_with_evaluator, CostKind, CostReport};
pub use config::{CostConfig, ProcessSettings};
pub use costs::{CostResult, Transform};
pub use error::{Error, Result};
pub use geometry::{centroid, Point, Vector};
pub use manifold::{fingerprint, ManifoldFingerprint, TrialRecord, TrialSource};
pub use settings::Settings;
pub use traits::{LandscapeGenerator, Oracle, OracleFactory, TrialStore};

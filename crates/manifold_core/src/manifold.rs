//! The manifold oracle: fingerprints, evaluator sessions, cached landscapes
//! and trial sources.

pub mod fingerprint;
pub mod landscape;
pub mod session;
pub mod source;

pub use fingerprint::{fingerprint, ManifoldFingerprint, CONTRIBUTING_FIELDS};
pub use landscape::{
    load_or_build_landscape, CachedLandscape, GridInterpolator, LandscapeCache, LandscapeCell,
    LandscapeMatrix, LandscapeOracleFactory, MapperCommand, Outcome,
};
pub use session::{
    with_session, FnOracle, FnOracleFactory, LineProtocol, ProcessOracle, ProcessOracleFactory,
};
pub use source::{
    release_points, require_same_manifold, require_same_manifold_records, validate_same_manifold,
    TrialRecord, TrialSource,
};

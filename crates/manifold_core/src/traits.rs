use crate::error::Result;
use crate::geometry::Point;
use crate::manifold::landscape::CachedLandscape;
use crate::manifold::source::TrialRecord;
use crate::settings::Settings;

/// An open evaluator session bound to one settings object.
///
/// Sessions are single-consumer: a query is a blocking round trip and the
/// session must not be shared between threads without external locking.
pub trait Oracle {
    /// Signed closest approach for a release at (angle, stretch).
    fn evaluate(&mut self, angle: f64, stretch: f64) -> Result<f64>;

    /// Releases the underlying resource. Calling it more than once is harmless;
    /// evaluating afterwards fails with `Error::SessionClosed`.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<O: Oracle + ?Sized> Oracle for &mut O {
    fn evaluate(&mut self, angle: f64, stretch: f64) -> Result<f64> {
        (**self).evaluate(angle, stretch)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<O: Oracle + ?Sized> Oracle for Box<O> {
    fn evaluate(&mut self, angle: f64, stretch: f64) -> Result<f64> {
        (**self).evaluate(angle, stretch)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Opens evaluator sessions for a settings object.
pub trait OracleFactory {
    type Session: Oracle;

    fn open(&self, settings: &Settings) -> Result<Self::Session>;
}

/// Produces the fully enumerated landscape grid for a settings object.
/// Expected to be slow; results are cached by fingerprint.
pub trait LandscapeGenerator {
    fn generate(&self, settings: &Settings) -> Result<CachedLandscape>;
}

/// Read-only view of a filtered trial collection owned by the caller.
pub trait TrialStore {
    fn data_list(&self) -> Result<Vec<TrialRecord>>;

    fn release_points(&self) -> Result<Vec<Point>> {
        Ok(self
            .data_list()?
            .iter()
            .map(TrialRecord::release_point)
            .collect())
    }
}

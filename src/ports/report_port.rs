//! Report generation port trait.

use crate::domain::engine::ScenarioResult;
use crate::domain::error::NeutronError;

/// Port for persisting scenario results.
pub trait ReportPort {
    fn write(&self, result: &ScenarioResult, output_dir: &str) -> Result<(), NeutronError>;

    /// Default implementation: one report per scenario under the same root.
    fn write_matrix(
        &self,
        results: &[ScenarioResult],
        output_dir: &str,
    ) -> Result<(), NeutronError> {
        for result in results {
            self.write(result, output_dir)?;
        }
        Ok(())
    }
}

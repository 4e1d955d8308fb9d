//! Contributed variables.
//!
//! Contributors are registered once at pipeline construction and queried in
//! registration order near the end of the pipeline, after script and
//! property variables. Later contributors override earlier ones by the same
//! last-write-wins rule as every other merge.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::InjectError;
use crate::pipeline::BuildContext;
use crate::source::merge_into;
use crate::vars::VarMap;

/// An extension point supplying additional variables for a build.
///
/// Implementations must be safe for concurrent use: one registered
/// contributor instance serves every in-flight pipeline.
#[async_trait]
pub trait Contributor: Send + Sync {
    /// Name used in logs and error attribution.
    fn name(&self) -> &str;

    /// Variables to contribute for this build. An error here fails the
    /// build's pipeline.
    async fn env_vars(&self, ctx: &BuildContext) -> Result<VarMap, InjectError>;
}

/// Query all contributors in registration order and merge their outputs.
pub(crate) async fn collect_contributions(
    contributors: &[Arc<dyn Contributor>],
    ctx: &BuildContext,
) -> Result<VarMap, InjectError> {
    let mut merged = VarMap::new();

    for contributor in contributors {
        let vars = contributor.env_vars(ctx).await?;
        debug!(
            contributor = contributor.name(),
            count = vars.len(),
            "collected contribution"
        );
        merge_into(&mut merged, &vars);
    }

    Ok(merged)
}

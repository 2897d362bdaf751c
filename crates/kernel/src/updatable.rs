//! Updatable: the update pipeline
//!
//! Mutating siblings of the query pipeline. On success the applied
//! transforms funnel through `SourceKernel::transformed` - appended to the
//! log and emitted to `transform` listeners - strictly before `update` fires
//! and before the caller's result resolves.
//!
//! A transform whose id the log already contains short-circuits with an
//! empty answer; replication is sync's business.

use crate::hints::UpdateHints;
use crate::source::SourceBase;
use crate::task::{Task, TaskOutcome};
use orrery_core::{
    build_transform, Error, FullResponse, RequestOptions, Result, Transform, TransformInput,
    UpdateData,
};

/// The concrete `_update` handler of a source
pub trait UpdatePerformer: SourceBase {
    /// Apply a normalized transform, honoring hints
    fn perform_update(&self, transform: &Transform, hints: &mut UpdateHints)
        -> Result<TaskOutcome>;
}

/// Sources that accept transforms through the uniform pipeline
pub trait Updatable: UpdatePerformer {
    /// Apply a transform to the source
    fn update(&self, input: impl Into<TransformInput>) -> Result<UpdateData>
    where
        Self: Sized,
    {
        Ok(self.update_with_options(input, None)?.data)
    }

    /// Apply a transform, receiving the full response envelope
    fn update_with_options(
        &self,
        input: impl Into<TransformInput>,
        options: Option<RequestOptions>,
    ) -> Result<FullResponse<UpdateData>>
    where
        Self: Sized,
    {
        let transform = build_transform(input, options, None)?;
        let kernel = self.kernel();
        let events = kernel.events();

        // Already applied; answer empty without re-entering the pipeline.
        if kernel.transform_log().contains(&transform.id) {
            return Ok(FullResponse::of(UpdateData::Batch(Vec::new())));
        }

        let mut hints = UpdateHints::default();
        if let Err(error) = events.before_update.emit(&transform, &mut hints) {
            events.update_fail.emit(&(transform.clone(), error.clone()));
            return Err(error);
        }

        let task = Task::from_request("update", &transform)?;
        let performed = kernel
            .request_queue()
            .push_and_process(task, &mut |_| self.perform_update(&transform, &mut hints));

        match performed {
            Ok(Some(outcome)) => {
                if let Err(error) = kernel.transformed(&outcome.transforms) {
                    events.update_fail.emit(&(transform, error.clone()));
                    return Err(error);
                }
                let data = outcome
                    .update_data
                    .unwrap_or_else(|| UpdateData::Batch(Vec::new()));
                events.update.emit(&(transform, data.clone()));
                Ok(FullResponse {
                    data,
                    details: outcome.details,
                    transforms: outcome.transforms,
                })
            }
            Ok(None) => {
                let error = Error::queue_busy(
                    kernel.request_queue().name(),
                    "update remained queued without being performed",
                );
                events.update_fail.emit(&(transform, error.clone()));
                Err(error)
            }
            Err(error) => {
                events.update_fail.emit(&(transform, error.clone()));
                Err(error)
            }
        }
    }
}

impl<T: UpdatePerformer> Updatable for T {}

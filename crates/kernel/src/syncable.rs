//! Syncable: the sync pipeline
//!
//! Sync applies transforms emitted by peer sources. Inbound transforms are
//! deduplicated by log id, serialized through the sync queue (independent of
//! the request queue), and recorded via `SourceKernel::transformed` on
//! success - preserving the publisher's emission order as a partial order
//! across sources.

use crate::hints::SyncHints;
use crate::source::SourceBase;
use crate::task::{Task, TaskOutcome};
use orrery_core::{Error, Result, Transform};

/// The concrete `_sync` handler of a source
pub trait SyncPerformer: SourceBase {
    /// Apply one inbound transform
    fn perform_sync(&self, transform: &Transform, hints: &mut SyncHints) -> Result<TaskOutcome>;
}

/// Sources that apply transforms replicated from peers
pub trait Syncable: SyncPerformer {
    /// Apply one inbound transform, deduplicating by log id
    fn sync(&self, transform: Transform) -> Result<()>
    where
        Self: Sized,
    {
        let kernel = self.kernel();
        let events = kernel.events();

        if kernel.transform_log().contains(&transform.id) {
            return Ok(());
        }

        let mut hints = SyncHints::default();
        if let Err(error) = events.before_sync.emit(&transform, &mut hints) {
            events.sync_fail.emit(&(transform, error.clone()));
            return Err(error);
        }

        let task = Task::from_request("sync", &transform)?;
        let performed = kernel
            .sync_queue()
            .push_and_process(task, &mut |_| self.perform_sync(&transform, &mut hints));

        match performed {
            Ok(Some(outcome)) => {
                if let Err(error) = kernel.transformed(&outcome.transforms) {
                    events.sync_fail.emit(&(transform, error.clone()));
                    return Err(error);
                }
                events.sync.emit(&transform);
                Ok(())
            }
            Ok(None) => {
                let error = Error::queue_busy(
                    kernel.sync_queue().name(),
                    "sync remained queued without being performed",
                );
                events.sync_fail.emit(&(transform, error.clone()));
                Err(error)
            }
            Err(error) => {
                events.sync_fail.emit(&(transform, error.clone()));
                Err(error)
            }
        }
    }

    /// Apply inbound transforms in emission order
    fn sync_all(&self, transforms: Vec<Transform>) -> Result<()>
    where
        Self: Sized,
    {
        for transform in transforms {
            self.sync(transform)?;
        }
        Ok(())
    }
}

impl<T: SyncPerformer> Syncable for T {}

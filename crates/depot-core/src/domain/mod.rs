//! Domain model (ids, records, job descriptors, worker slots).

pub mod ids;
pub mod job;
pub mod thing;
pub mod worker;

pub use ids::{Id, IdMarker, ParseIdError, ThingId};
pub use job::{JobDescriptor, JobEvent, RunOutcome};
pub use thing::{Attr, NewThing, PATH_ATTR, SortOrder, Thing, ThingFilter, ThingUpdate};
pub use worker::{WorkerExit, WorkerSlot, WorkerState};

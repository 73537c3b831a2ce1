//! Revertable step execution.
//!
//! A migration that changes several pieces of infrastructure builds a list
//! of [`MigrationStep`]s and hands it to a fresh [`RevertableStepProcessor`].
//! Steps run in submission order. When one fails, every step that already
//! succeeded is compensated in reverse order, then the failure is returned.
//!
//! ```ignore
//! let mut processor = RevertableStepProcessor::new();
//! processor.add_step(
//!     MigrationStep::new("backup-compose-file", || backup_restore(&live, &backup))
//!         .with_reverse(|| backup_restore(&backup, &live)),
//! );
//! processor.add_step(MigrationStep::new("generate-compose-file", || {
//!     generator.generate().map(drop)
//! }));
//! processor.execute()?;
//! ```

mod processor;

pub use processor::{backup_restore, Action, MigrationStep, RevertableStepProcessor};

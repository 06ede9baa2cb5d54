//! Spec Factory (spec.md §4.8): batch child-spec creation for `design`/
//! `architecture` tasks, with batch-index `dependsOn` resolution and
//! `maxChildDepth` enforcement.

mod factory;
mod plan_files;

pub use factory::{ChildContext, ChildRequirements, ChildSpecInput, SpecFactory, SpecFactoryError};

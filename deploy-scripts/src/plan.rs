//! Resolution of a tag selection into a validated, ordered deploy plan

use std::collections::HashSet;

use itertools::Itertools;
use tracing::debug;

use crate::{
    catalog::{Catalog, DeployScript, DeployStep},
    errors::ScriptError,
    registry::AddressRegistry,
    types::{AddressBook, ExternalContract},
};

/// The scripts selected for a run, checked against the registry
#[derive(Clone, Debug)]
pub struct DeployPlan<'a> {
    /// The selected scripts, in catalog order
    scripts: Vec<&'a DeployScript>,
}

impl<'a> DeployPlan<'a> {
    /// Select the scripts matching `tags` (all scripts if `tags` is empty) and
    /// check that every step can run.
    ///
    /// A dependency must be written by an earlier step of the plan or already
    /// be in the registry, and every external address a step reads must be
    /// configured. Nothing is sent if either check fails.
    pub fn resolve(
        catalog: &'a Catalog,
        tags: &[String],
        registry: &AddressRegistry,
        book: &AddressBook,
    ) -> Result<Self, ScriptError> {
        let known = catalog.tags();
        if let Some(unknown) = tags
            .iter()
            .find(|tag| !known.iter().any(|known| *known == tag.as_str()))
        {
            return Err(ScriptError::Config(format!(
                "unknown tag `{}`, expected one of: {}",
                unknown,
                known.iter().join(", ")
            )));
        }

        let scripts = catalog
            .scripts()
            .iter()
            .filter(|script| tags.is_empty() || script.matches(tags))
            .collect_vec();

        let mut produced: HashSet<String> = HashSet::new();
        for step in scripts.iter().flat_map(|script| script.steps.iter()) {
            if let Some(dependency) = step
                .dependencies()
                .find(|dep| !produced.contains(*dep) && !registry.contains(dep))
            {
                return Err(ScriptError::missing_dependency(step.name, dependency));
            }
            check_externals(step, book)?;
            produced.extend(step.produces());
        }

        debug!(
            "Resolved plan: {}",
            scripts.iter().map(|script| script.id).join(", ")
        );
        Ok(Self { scripts })
    }

    /// The selected scripts, in execution order
    pub fn scripts(&self) -> &[&'a DeployScript] {
        &self.scripts
    }

    /// The steps to run, in execution order
    pub fn steps(&self) -> impl Iterator<Item = &'a DeployStep> + '_ {
        self.scripts.iter().flat_map(|script| script.steps.iter())
    }

    /// Whether no script was selected
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

/// Check that the external addresses a step reads are configured
fn check_externals(step: &DeployStep, book: &AddressBook) -> Result<(), ScriptError> {
    match step.externals().find(|ext| book.resolve(*ext).is_none()) {
        Some(ExternalContract::Filler) => Err(ScriptError::Config(format!(
            "`{}` needs the filler address, pass --filler or set FILLER_ADDRESS",
            step.name
        ))),
        Some(ext) => Err(ScriptError::Config(format!(
            "`{}` needs the {} address, which is not configured",
            step.name, ext
        ))),
        None => Ok(()),
    }
}

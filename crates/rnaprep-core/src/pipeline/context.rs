use crate::exec::environment::EnvironmentSet;
use crate::pipeline::layout::RunLayout;
use crate::pipeline::resolver::StructureFetcher;

/// Everything one pipeline run needs, passed explicitly.
///
/// Services are injected per run rather than reached through globals, so
/// tests can substitute any boundary and two runs never share hidden
/// state.
pub struct RunContext<'a> {
    pub layout: RunLayout,
    pub fetcher: &'a dyn StructureFetcher,
    pub environments: &'a EnvironmentSet,
}

impl<'a> RunContext<'a> {
    pub fn new(
        layout: RunLayout,
        fetcher: &'a dyn StructureFetcher,
        environments: &'a EnvironmentSet,
    ) -> Self {
        Self {
            layout,
            fetcher,
            environments,
        }
    }
}

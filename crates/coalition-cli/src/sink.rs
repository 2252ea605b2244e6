use std::io::{self, Write as _};

use coalition_engine::{ContributionResult, ResultSink, RunMetadata};
use serde::Serialize;

use crate::util::Output;

/// Same layout as [`coalition_engine::RunReport`], borrowed.
#[derive(Serialize)]
struct ReportRef<'a> {
    results: &'a [ContributionResult],
    metadata: &'a RunMetadata,
}

/// Writes the run report as pretty JSON to stdout or a file.
#[derive(Debug)]
pub struct JsonResultSink {
    output: Output,
}

impl JsonResultSink {
    pub fn new(output: Output) -> Self {
        Self { output }
    }

    pub fn display_path(&self) -> String {
        self.output.display_path()
    }
}

impl ResultSink for JsonResultSink {
    type Error = io::Error;

    fn accept(
        &mut self,
        results: &[ContributionResult],
        metadata: &RunMetadata,
    ) -> Result<(), Self::Error> {
        serde_json::to_writer_pretty(&mut self.output, &ReportRef { results, metadata })?;
        writeln!(self.output)?;
        self.output.flush()
    }
}

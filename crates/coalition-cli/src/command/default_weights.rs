use std::path::PathBuf;

use coalition_engine::ValueWeights;

use crate::util::Output;

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct DefaultWeightsArg {
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &DefaultWeightsArg) -> anyhow::Result<()> {
    let DefaultWeightsArg { output } = arg;
    let mut output = Output::from_output_path(output.clone())?;
    output.write_json(ValueWeights::default())?;
    Ok(())
}

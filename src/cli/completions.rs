use clap::CommandFactory;
use clap_complete::Shell;

use crate::error::Result;

use super::Cli;

pub fn run(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mostrador", &mut std::io::stdout());
    Ok(())
}

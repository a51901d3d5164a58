// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use cargo_oar::{OarApp, OarExitCode};
use clap::Parser;
use color_eyre::Result;

fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = enable_ansi_support::enable_ansi_support();

    let app = OarApp::parse();
    let output = app.init_output();

    match app.exec(output, &mut std::io::stdout().lock()) {
        Ok(()) => std::process::exit(OarExitCode::OK),
        Err(error) => {
            error.display_to_stderr(&output.stderr_styles());
            std::process::exit(error.process_exit_code())
        }
    }
}

mod cli;

use std::process::ExitCode;

use colored::Colorize;

fn main() -> ExitCode {
    json_shape::init_tracing();
    let command_line_interface = cli::CommandLineInterface::load();
    match command_line_interface.run() {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{} {error:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

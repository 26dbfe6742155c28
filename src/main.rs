use closed_loop_guard::core::error::GuardError;
use colored::Colorize;

fn main() {
    if let Err(e) = closed_loop_guard::run() {
        match &e {
            // Policy denial: distinct exit code so hook hosts can tell a
            // blocked tool call from an operational failure.
            GuardError::Blocked(reason) => {
                eprintln!("{} {}", "blocked:".red().bold(), reason);
                std::process::exit(2);
            }
            _ => {
                eprintln!("{} {}", "error:".red().bold(), e);
                std::process::exit(1);
            }
        }
    }
}

use ibb::app::Target;
use ibb::error::UsageError;

const USAGE: &str = "ibb - browse imageboards from the terminal.

Usage:
  ibb                     pick a board from the board list
  ibb <board>             open a board catalog
  ibb <board> <subject>   open the thread whose subject is <subject>

Options:
  --version, -V           Show version and exit
  --help,    -h           Show this help message";

fn main() {
    let mut positional = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("ibb {}", ibb::VERSION);
                return;
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                return;
            }
            _ => positional.push(arg),
        }
    }

    let Some(target) = Target::from_args(&positional) else {
        eprintln!("error: {}\n\n{USAGE}", UsageError::Arity(positional.len()));
        std::process::exit(2);
    };

    if let Err(err) = ibb::run(target) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

use colored::Colorize;

fn main() {
    if let Err(e) = tenderhub::run() {
        eprintln!("{}: {}", format!("error[{}]", e.kind()).red().bold(), e.reason());
        std::process::exit(e.kind().exit_code());
    }
}

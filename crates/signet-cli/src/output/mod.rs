//! Output formatting utilities

use crate::error::Result;
use console::style;
use serde::Serialize;

/// Output data as pretty-printed JSON
pub fn json_output<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    println!("{json}");
    Ok(())
}

/// Print success message
pub fn print_success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", style("!").yellow().bold(), message);
}

/// Print info message
pub fn print_info(message: &str) {
    println!("{} {}", style("ℹ").blue().bold(), message);
}

/// Print a URL the user is expected to open
pub fn print_link(label: &str, url: &str) {
    eprintln!("{} {}", style(label).bold(), style(url).cyan().underlined());
}

/// Replace the home directory prefix with `~`
pub fn compress_path(path: &std::path::Path) -> String {
    let display = path.display().to_string();
    match etcetera::home_dir() {
        Ok(home) => {
            let home = home.display().to_string();
            match display.strip_prefix(&home) {
                Some(rest) if !home.is_empty() => format!("~{rest}"),
                _ => display,
            }
        }
        Err(_) => display,
    }
}

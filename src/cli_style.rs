//! Terminal styling for `cli-scan`.

use clap::builder::styling::{AnsiColor, Color, Style};
use clap::builder::Styles;
use crossterm::style::{Color as TermColor, Stylize};
use indicatif::{ProgressBar, ProgressStyle};
use record_scan_server::scan::ScanStatus;

const ACCENT: TermColor = TermColor::Rgb {
    r: 0,
    g: 200,
    b: 220,
};
const OK: TermColor = TermColor::Rgb {
    r: 0,
    g: 230,
    b: 120,
};
const WARN: TermColor = TermColor::Rgb {
    r: 255,
    g: 170,
    b: 0,
};
const FAIL: TermColor = TermColor::Rgb {
    r: 255,
    g: 85,
    b: 85,
};
const MUTED: TermColor = TermColor::Rgb {
    r: 130,
    g: 130,
    b: 130,
};

const PROGRESS_TEMPLATE: &str =
    "{spinner:.cyan} scanning [{bar:40.cyan/blue}] {pos}/{len} records ({percent}%, eta {eta})";

fn bold_ansi(color: AnsiColor) -> Style {
    Style::new().bold().fg_color(Some(Color::Ansi(color)))
}

/// Help output colors for the clap parser.
pub fn get_styles() -> Styles {
    Styles::styled()
        .usage(bold_ansi(AnsiColor::Cyan).underline())
        .header(bold_ansi(AnsiColor::Cyan).underline())
        .literal(bold_ansi(AnsiColor::Green))
        .invalid(bold_ansi(AnsiColor::Red))
        .error(bold_ansi(AnsiColor::Red))
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack))))
}

/// Progress bar ticking once per stamped record. Its length is set when the
/// scan reports its total.
pub fn scan_progress_bar() -> ProgressBar {
    let style = ProgressStyle::default_bar()
        .template(PROGRESS_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    ProgressBar::new(0).with_style(style)
}

pub fn print_success(message: &str) {
    println!(" {} {}", "✓".with(OK).bold(), message.with(OK));
}

pub fn print_error(message: &str) {
    eprintln!(" {} {}", "✗".with(FAIL).bold(), message.with(FAIL));
}

pub fn print_warning(message: &str) {
    println!(" {} {}", "⚠".with(WARN).bold(), message.with(WARN));
}

pub fn print_header(title: &str) {
    println!("{}", title.with(ACCENT).bold());
}

pub fn print_key_value(key: &str, value: &str) {
    println!("  {} {}", format!("{:<14}", format!("{}:", key)).with(MUTED), value);
}

/// Job status, colored by how far along it is.
pub fn print_job_status(status: ScanStatus) {
    let color = match status {
        ScanStatus::Queued => WARN,
        ScanStatus::Running => ACCENT,
        ScanStatus::Completed => OK,
    };
    print_key_value("Status", &status.as_str().with(color).bold().to_string());
}

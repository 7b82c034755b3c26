// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Consistent terminal styling

use colored::{ColoredString, Colorize};

use crate::pipeline::RunOutcome;
use crate::registry::Category;

/// Force colors off, e.g. for `--no-color`
pub fn disable_colors() {
    colored::control::set_override(false);
}

pub fn category_label(category: Category) -> ColoredString {
    let label = category.to_string();
    match category {
        Category::Light => label.green(),
        Category::Medium => label.yellow(),
        Category::Heavy => label.red(),
    }
}

pub fn outcome_label(outcome: RunOutcome) -> ColoredString {
    let label = outcome.to_string();
    match outcome {
        RunOutcome::Completed => label.green().bold(),
        RunOutcome::Reused => label.cyan().bold(),
        RunOutcome::Failed => label.red().bold(),
    }
}

pub fn print_header(title: &str) {
    println!("{}", title.bold());
    println!("{}", "═".repeat(title.chars().count().max(40)));
}

pub fn print_section(title: &str) {
    println!();
    println!("{}:", title.bold());
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    println!("  {} {}", "✗".red(), msg);
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠".yellow(), msg);
}

pub fn print_info(msg: &str) {
    println!("  {} {}", "→".blue(), msg);
}

use console::{Style, style};

use crate::state::{Part, Round, RoundStatus};

pub struct Display;

impl Default for Display {
    fn default() -> Self {
        Self::new()
    }
}

impl Display {
    pub fn new() -> Self {
        Self
    }

    pub fn print_header(&self, text: &str) {
        println!();
        println!("{}", style(text).bold().cyan());
        println!("{}", style("═".repeat(60)).dim());
        println!();
    }

    pub fn print_rounds_table(&self, rounds: &[Round]) {
        if rounds.is_empty() {
            println!("{}", style("No rounds found.").dim());
            return;
        }

        let in_flight = rounds.iter().filter(|r| !r.status.is_terminal()).count();
        let success = rounds
            .iter()
            .filter(|r| r.status == RoundStatus::Success)
            .count();
        let failed = rounds
            .iter()
            .filter(|r| r.status == RoundStatus::Failed)
            .count();

        println!(
            "In flight: {}  Success: {}  Failed: {}",
            style(in_flight).yellow(),
            style(success).green(),
            style(failed).red()
        );
        println!();

        println!(
            "{:<8} {:<12} {:<14} {:<12} {:<20}",
            style("ID").bold(),
            style("Round").bold(),
            style("Player").bold(),
            style("Status").bold(),
            style("Updated").bold()
        );
        println!("{}", style("─".repeat(70)).dim());

        for round in rounds {
            println!(
                "{:<8} {:<12} {:<14} {:<12} {:<20}",
                round.id,
                round.external_id,
                round.player,
                self.status_style(round.status)
                    .apply_to(round.status.to_string()),
                round.updated_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    pub fn print_parts_table(&self, round: &Round, parts: &[Part]) {
        self.print_header(&format!("Round {} ({})", round.external_id, round.status));

        if parts.is_empty() {
            println!("{}", style("No parts collected.").dim());
            return;
        }

        println!(
            "{:<14} {:>8} {:>6} {:<10}",
            style("Player").bold(),
            style("Value").bold(),
            style("Rank").bold(),
            style("Submitted").bold()
        );
        println!("{}", style("─".repeat(42)).dim());

        for part in parts {
            let rank = part
                .rank
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".into());
            let submitted = if part.submitted {
                style("yes").green()
            } else {
                style("no").dim()
            };
            println!(
                "{:<14} {:>8} {:>6} {:<10}",
                part.player, part.value, rank, submitted
            );
        }
    }

    pub fn print_success(&self, message: &str) {
        println!("{} {}", style("✓").green().bold(), message);
    }

    pub fn print_error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red().bold(), message);
    }

    pub fn print_warning(&self, message: &str) {
        println!("{} {}", style("!").yellow().bold(), message);
    }

    pub fn print_info(&self, message: &str) {
        println!("{} {}", style("→").cyan(), message);
    }

    fn status_style(&self, status: RoundStatus) -> Style {
        match status {
            RoundStatus::Ready | RoundStatus::Joined => Style::new().dim(),
            RoundStatus::Collecting | RoundStatus::Submitting => Style::new().yellow(),
            RoundStatus::Collected | RoundStatus::Submitted => Style::new().cyan(),
            RoundStatus::Success => Style::new().green(),
            RoundStatus::Failed => Style::new().red(),
        }
    }
}

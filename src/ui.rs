//! Terminal tables for `omake cache list`.

use colored::*;

pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Rows with the wrong number of cells are dropped.
    pub fn add_row(&mut self, row: Vec<String>) {
        if row.len() == self.headers.len() {
            self.rows.push(row);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column widths shrunk, widest first, until the table fits `max_width`.
    /// No column goes below 8 characters.
    fn widths(&self, max_width: usize) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(console::measure_text_width(&single_line(cell)));
            }
        }

        let overhead = 3 + 3 * widths.len();
        let available = max_width.saturating_sub(overhead);
        let mut total: usize = widths.iter().sum();
        while total > available {
            let Some(widest) = widths.iter_mut().filter(|w| **w > 8).max_by_key(|w| **w) else {
                break;
            };
            *widest -= 1;
            total -= 1;
        }
        widths
    }

    pub fn render(&self, max_width: usize) -> Vec<String> {
        if self.headers.is_empty() {
            return Vec::new();
        }
        let widths = self.widths(max_width);
        let rule = |left: &str, mid: &str, right: &str| {
            let parts: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
            format!("  {}{}{}", left, parts.join(mid), right)
        };
        let line = |cells: &[String], bold: bool| {
            let mut out = String::from("  │");
            for (cell, &w) in cells.iter().zip(&widths) {
                let text = console::truncate_str(&single_line(cell), w, "...").into_owned();
                let pad = w.saturating_sub(console::measure_text_width(&text));
                let text = if bold { text.bold().to_string() } else { text };
                out.push_str(&format!(" {}{} │", text, " ".repeat(pad)));
            }
            out
        };

        let mut lines = vec![rule("┌", "┬", "┐"), line(&self.headers[..], true), rule("├", "┼", "┤")];
        lines.extend(self.rows.iter().map(|row| line(row.as_slice(), false)));
        lines.push(rule("└", "┴", "┘"));
        lines
    }

    /// Prints to stdout, fitted to the terminal width.
    pub fn print(&self) {
        let (_, width) = console::Term::stdout().size();
        for line in self.render(width as usize) {
            println!("{}", line);
        }
    }
}

fn single_line(s: &str) -> String {
    s.replace(['\n', '\r', '\t'], " ")
}

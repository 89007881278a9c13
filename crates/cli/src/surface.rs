//! Stdin/stdout implementation of the interaction surface.

use runtime::Surface;
use std::io::{self, BufRead, Write};

pub struct StdioSurface {
    stdin: io::Stdin,
}

impl StdioSurface {
    pub fn new() -> Self {
        Self { stdin: io::stdin() }
    }
}

impl Surface for StdioSurface {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        print!("{prompt}");
        io::stdout().flush()?;

        let mut line = String::new();
        if self.stdin.lock().read_line(&mut line)? == 0 {
            // EOF
            Ok(None)
        } else {
            Ok(Some(line))
        }
    }

    fn render_text(&mut self, text: &str) {
        println!("\n{text}\n");
    }

    fn render_status(&mut self, status: &str) {
        eprintln!("· {status}");
    }

    fn confirm_retry(&mut self, error: &str) -> bool {
        eprintln!("Error: {error}");
        match self.read_line("Retry? [Y/n] ") {
            Ok(Some(answer)) => matches!(answer.trim().to_lowercase().as_str(), "" | "y" | "yes"),
            _ => false,
        }
    }
}

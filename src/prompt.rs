use std::io::{self, BufRead, Write};

use cortex::workflow::Prompter;

/// Line-based prompts on stdin/stdout.
pub struct TerminalPrompter;

impl TerminalPrompter {
    fn read_line(&self, prompt: &str) -> String {
        print!("{}", prompt);
        let _ = io::stdout().flush();
        let mut input = String::new();
        if io::stdin().lock().read_line(&mut input).is_err() {
            return String::new();
        }
        input.trim().to_string()
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(&mut self, question: &str, default: bool) -> bool {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        let answer = self.read_line(&format!("{} {} ", question.trim_end(), hint));
        match answer.to_ascii_lowercase().as_str() {
            "" => default,
            "y" | "yes" => true,
            _ => false,
        }
    }

    fn input(&mut self, question: &str) -> String {
        self.read_line(&format!("{}: ", question))
    }
}

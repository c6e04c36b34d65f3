//! Yes/no confirmation from a human operator.

use std::io::{self, BufRead, Write};

use indicatif::ProgressBar;

/// Source of yes/no answers for records no strategy could settle.
pub trait Confirmer: Send + Sync {
    /// Ask `question`. `default` is the answer for an empty reply.
    fn confirm(&self, question: &str, default: Option<bool>) -> bool;
}

/// Always gives the same answer, for unattended runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedAnswer(pub bool);

impl Confirmer for FixedAnswer {
    fn confirm(&self, _question: &str, _default: Option<bool>) -> bool {
        self.0
    }
}

/// Asks on the terminal, hiding an attached progress bar while waiting.
#[derive(Debug, Clone, Default)]
pub struct TerminalConfirmer {
    progress: Option<ProgressBar>,
}

impl TerminalConfirmer {
    /// Create a confirmer without a progress bar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend `progress` while a question is open.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }
}

impl Confirmer for TerminalConfirmer {
    fn confirm(&self, question: &str, default: Option<bool>) -> bool {
        let ask = || {
            let stdin = io::stdin();
            let mut input = stdin.lock();
            let mut output = io::stdout();
            query_yes_no(question, default, &mut input, &mut output)
        };

        let answer = match &self.progress {
            Some(progress) => progress.suspend(ask),
            None => ask(),
        };

        answer.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to read answer, using default");
            default.unwrap_or(false)
        })
    }
}

/// Ask a yes/no question until a valid answer is given.
///
/// Accepts `y`, `ye`, `yes`, `n` and `no` in any case. An empty reply takes
/// `default` when there is one. End of input also takes the default, or
/// "no" without one.
pub fn query_yes_no<R: BufRead, W: Write>(
    question: &str,
    default: Option<bool>,
    input: &mut R,
    output: &mut W,
) -> io::Result<bool> {
    let hint = match default {
        None => " [y/n] ",
        Some(true) => " [Y/n] ",
        Some(false) => " [y/N] ",
    };

    loop {
        write!(output, "{question}{hint}")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(default.unwrap_or(false));
        }

        match line.trim().to_lowercase().as_str() {
            "" => {
                if let Some(answer) = default {
                    return Ok(answer);
                }
            }
            "y" | "ye" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => {}
        }
        writeln!(output, "Please respond with 'yes' or 'no' (or 'y' or 'n').")?;
    }
}

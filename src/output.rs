use std::io::Write;

/// User-facing output for the command layer.
///
/// Commands talk to this trait instead of printing directly, so reconciler
/// warnings and progress lines stay testable and a machine-readable mode can
/// redirect them wholesale.
pub trait UserOutput: Send + Sync {
    /// Informational line ("Bringing 'shop' online...").
    fn status(&self, message: &str);

    /// Final success line.
    fn success(&self, message: &str);

    /// Warning-level problem that did not stop the operation.
    fn warning(&self, message: &str);

    /// Error line.
    fn error(&self, message: &str);

    /// Start an inline progress entry; finish it with `finish_progress`.
    fn progress(&self, message: &str);

    /// Result half of an inline progress entry.
    fn finish_progress(&self, result: &str);

    /// Blank separator line.
    fn blank(&self);
}

/// Plain terminal output. Warnings and errors go to stderr so piping stdout
/// stays clean.
pub struct CliOutput;

impl UserOutput for CliOutput {
    fn status(&self, message: &str) {
        println!("{}", message);
    }

    fn success(&self, message: &str) {
        println!("{}", message);
    }

    fn warning(&self, message: &str) {
        eprintln!("\x1b[33m{}\x1b[0m", message);
    }

    fn error(&self, message: &str) {
        eprintln!("\x1b[31m{}\x1b[0m", message);
    }

    fn progress(&self, message: &str) {
        print!("{}", message);
        std::io::stdout().flush().ok();
    }

    fn finish_progress(&self, result: &str) {
        println!("{}", result);
    }

    fn blank(&self) {
        println!();
    }
}

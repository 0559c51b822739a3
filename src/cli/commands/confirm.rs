//! Interactive pre-flight confirmation on stdin.

use async_trait::async_trait;
use std::io::{BufRead, IsTerminal, Write};

use compforge_orchestrator::{ConfirmationGate, ModalityConcern};

/// Asks on stderr and reads the answer from stdin.
///
/// Declines without asking when stdin is not a terminal (piped requests,
/// CI); `--yes` replaces this gate with one that always continues.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinConfirm;

#[async_trait]
impl ConfirmationGate for StdinConfirm {
    async fn confirm(&self, concern: &ModalityConcern) -> bool {
        eprintln!("⚠ {}", concern.prompt());

        if !std::io::stdin().is_terminal() {
            eprintln!("  stdin is not interactive; pass --yes to continue without asking");
            return false;
        }

        eprint!("  Continue? [y/N] ");
        let _ = std::io::stderr().flush();

        let answer = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;

        matches!(answer, Ok(Ok(line)) if is_yes(&line))
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("no"));
        assert!(!is_yes("yes please"));
    }
}

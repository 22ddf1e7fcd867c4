//! Batch entry contract: a comma-separated list of ID numbers, filtered to
//! numeric tokens and processed strictly sequentially.

use tracing::info;

use crate::core::types::QueryOutcome;
use crate::query::Orchestrator;

/// Split the operator's input on commas, trim each token, and keep only the
/// all-digit ones. No canonicalization beyond trimming.
pub fn parse_batch(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

/// Process each identifier in order, printing one outcome line per ID. A
/// failed identifier never stops the batch.
pub async fn run_batch(orchestrator: &Orchestrator, cedulas: &[String]) {
    for cedula in cedulas {
        println!("\nQuerying criminal record for ID {cedula}");
        info!("processing identifier {cedula}");
        match orchestrator.process(cedula).await {
            QueryOutcome::Completed { attempts, artifact } => match artifact {
                Some(path) => println!(
                    "✅ {cedula}: completed in {attempts} attempt(s) — {}",
                    path.display()
                ),
                None => println!(
                    "✅ {cedula}: completed in {attempts} attempt(s) (PDF export failed, see logs)"
                ),
            },
            QueryOutcome::Failed { attempts } => {
                println!("❌ {cedula}: failed after {attempts} attempt(s)");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_trimmed_numeric_tokens() {
        assert_eq!(
            parse_batch(" 123456789 , abc, 12a34, 000 ,, 42"),
            vec!["123456789", "000", "42"]
        );
    }

    #[test]
    fn all_invalid_batch_is_empty() {
        assert!(parse_batch("").is_empty());
        assert!(parse_batch(" , ,abc, 12-34").is_empty());
    }
}

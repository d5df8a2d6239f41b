use std::io::{BufRead, Write};

use hlsget_engine::hls::playlist::sort_variants;
use hlsget_engine::hls::{HlsDownloaderError, Variant};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;

pub type PendingChoice = oneshot::Receiver<Result<usize, AppError>>;

/// List `variants` highest bandwidth first and read the chosen position.
///
/// Returns the position in the sorted list, matching `VariantSelection::Index`.
pub fn prompt_variant(
    mut variants: Vec<Variant>,
    mut input: impl BufRead,
    mut out: impl Write,
) -> Result<usize, AppError> {
    if variants.is_empty() {
        return Err(AppError::InvalidInput("No variants to choose from".to_string()));
    }
    sort_variants(&mut variants);

    writeln!(out, "Available variants:")?;
    for (i, variant) in variants.iter().enumerate() {
        writeln!(out, "  {i}: {} ({} bps)", variant.label(), variant.bandwidth)?;
    }
    write!(out, "Select variant [0-{}]: ", variants.len() - 1)?;
    out.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let choice = line.trim();
    match choice.parse::<usize>() {
        Ok(i) if i < variants.len() => Ok(i),
        _ => Err(AppError::InvalidInput(format!(
            "Invalid variant selection: '{choice}'"
        ))),
    }
}

/// Prompt on stdin from a detached thread. The runtime waits for its blocking
/// pool on shutdown, so a read stuck there would outlive an interrupt.
pub fn prompt_variant_in_background(variants: Vec<Variant>) -> PendingChoice {
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let _ = tx.send(prompt_variant(
            variants,
            std::io::stdin().lock(),
            std::io::stdout(),
        ));
    });
    rx
}

/// Wait for the user's choice, or give up once `token` is cancelled.
pub async fn await_choice(
    pending: PendingChoice,
    token: &CancellationToken,
) -> Result<usize, AppError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(HlsDownloaderError::Cancelled.into()),
        choice = pending => choice.map_err(|_| {
            AppError::Initialization("Variant prompt ended without a choice".to_string())
        })?,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(bandwidth: u64, name: &str) -> Variant {
        Variant {
            bandwidth,
            name: Some(name.to_string()),
            resolution: None,
            uri: format!("{name}.m3u8"),
        }
    }

    fn variants() -> Vec<Variant> {
        vec![variant(500, "low"), variant(2000, "high"), variant(1000, "mid")]
    }

    #[test]
    fn lists_sorted_variants_and_reads_choice() {
        let mut out = Vec::new();
        let choice = prompt_variant(variants(), "1\n".as_bytes(), &mut out).unwrap();
        assert_eq!(choice, 1);

        let listing = String::from_utf8(out).unwrap();
        let high = listing.find("0: high").unwrap();
        let mid = listing.find("1: mid").unwrap();
        let low = listing.find("2: low").unwrap();
        assert!(high < mid && mid < low);
    }

    #[test]
    fn out_of_range_choice_is_rejected() {
        let err = prompt_variant(variants(), "3\n".as_bytes(), Vec::new()).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        let err = prompt_variant(variants(), "abc\n".as_bytes(), Vec::new()).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn interrupt_abandons_an_unanswered_prompt() {
        let (_tx, pending) = oneshot::channel();
        let token = CancellationToken::new();
        token.cancel();

        let err = await_choice(pending, &token).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn answered_prompt_yields_the_choice() {
        let (tx, pending) = oneshot::channel();
        tx.send(Ok(2)).unwrap();
        let choice = await_choice(pending, &CancellationToken::new()).await.unwrap();
        assert_eq!(choice, 2);
    }

    #[tokio::test]
    async fn vanished_prompt_is_an_error() {
        let (tx, pending) = oneshot::channel::<Result<usize, AppError>>();
        drop(tx);
        let err = await_choice(pending, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Initialization(_)));
    }
}

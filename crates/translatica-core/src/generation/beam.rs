//! Deterministic beam search over an encoder-decoder model.

use std::cmp::Ordering;

use tracing::trace;

use super::CancellationFlag;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct BeamSearchParams {
    pub beam_width: usize,
    /// Maximum decoder sequence length, counting the start token.
    pub max_length: usize,
    pub start_token: u32,
    pub eos_token: u32,
    pub length_penalty: f32,
    /// Tokens that may never be generated (e.g. padding).
    pub banned_tokens: Vec<u32>,
}

/// One forward step of the decoder.
pub trait StepScorer {
    /// Log-probabilities of the next token for each prefix.
    ///
    /// All prefixes in a call have the same length.
    fn next_log_probs(&mut self, prefixes: &[Vec<u32>]) -> Result<Vec<Vec<f32>>>;
}

struct Hypothesis {
    tokens: Vec<u32>,
    score: f32,
}

struct Candidate {
    beam: usize,
    token: u32,
    score: f32,
}

/// Run beam search and return the best sequence without the start and EOS tokens.
///
/// Stops as soon as `beam_width` hypotheses have emitted EOS. Finished
/// hypotheses are ranked by `sum_logprob / len^length_penalty`.
pub fn beam_search<S: StepScorer + ?Sized>(
    scorer: &mut S,
    params: &BeamSearchParams,
    cancel: &CancellationFlag,
) -> Result<Vec<u32>> {
    let width = params.beam_width.max(1);
    let mut beams = vec![Hypothesis {
        tokens: vec![params.start_token],
        score: 0.0,
    }];
    let mut finished: Vec<(f32, Vec<u32>)> = Vec::with_capacity(width);

    while !beams.is_empty() && beams[0].tokens.len() < params.max_length {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let prefixes: Vec<Vec<u32>> = beams.iter().map(|b| b.tokens.clone()).collect();
        let log_probs = scorer.next_log_probs(&prefixes)?;
        if log_probs.len() != beams.len() {
            return Err(Error::InferenceError(format!(
                "Scorer returned {} rows for {} beams",
                log_probs.len(),
                beams.len()
            )));
        }

        let mut candidates = Vec::with_capacity(beams.len() * width * 2);
        for (beam_idx, (beam, row)) in beams.iter().zip(&log_probs).enumerate() {
            for (token, log_prob) in top_k(row, width * 2, &params.banned_tokens) {
                candidates.push(Candidate {
                    beam: beam_idx,
                    token,
                    score: beam.score + log_prob,
                });
            }
        }
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.beam.cmp(&b.beam))
                .then(a.token.cmp(&b.token))
        });

        let mut next = Vec::with_capacity(width);
        for (rank, candidate) in candidates.iter().enumerate() {
            let parent = &beams[candidate.beam];
            if candidate.token == params.eos_token {
                if rank < width {
                    let normalized =
                        normalize(candidate.score, parent.tokens.len(), params.length_penalty);
                    finished.push((normalized, parent.tokens.clone()));
                }
                continue;
            }
            let mut tokens = Vec::with_capacity(parent.tokens.len() + 1);
            tokens.extend_from_slice(&parent.tokens);
            tokens.push(candidate.token);
            next.push(Hypothesis {
                tokens,
                score: candidate.score,
            });
            if next.len() == width {
                break;
            }
        }

        beams = next;
        if finished.len() >= width {
            break;
        }
    }

    if finished.len() < width {
        for beam in &beams {
            let normalized = normalize(beam.score, beam.tokens.len(), params.length_penalty);
            finished.push((normalized, beam.tokens.clone()));
        }
    }

    let best = finished
        .into_iter()
        .fold(None::<(f32, Vec<u32>)>, |best, (score, tokens)| match best {
            Some((best_score, _)) if best_score.total_cmp(&score) != Ordering::Less => best,
            _ => Some((score, tokens)),
        });

    let tokens = best.map(|(_, tokens)| tokens).unwrap_or_default();
    trace!("Beam search finished with {} tokens", tokens.len());
    Ok(tokens.into_iter().skip(1).collect())
}

fn normalize(score: f32, length: usize, length_penalty: f32) -> f32 {
    score / (length.max(1) as f32).powf(length_penalty)
}

/// Best `k` tokens of a row, highest first, ties broken by token id.
fn top_k(row: &[f32], k: usize, banned: &[u32]) -> Vec<(u32, f32)> {
    let mut scored: Vec<(u32, f32)> = row
        .iter()
        .enumerate()
        .map(|(idx, &lp)| (idx as u32, lp))
        .filter(|(idx, lp)| !lp.is_nan() && *lp != f32::NEG_INFINITY && !banned.contains(idx))
        .collect();

    let by_score = |a: &(u32, f32), b: &(u32, f32)| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0));
    if scored.len() > k {
        scored.select_nth_unstable_by(k, by_score);
        scored.truncate(k);
    }
    scored.sort_by(by_score);
    scored
}

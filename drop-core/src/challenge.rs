//! Pairing challenge shown on the receiving device.
//!
//! The receiver is shown three codes and picks the one displayed on the
//! sender. Only one of them is derived from the scanned ticket; the other two
//! are random distractors. Picking the wrong one means the ticket came from a
//! different sender (or was mistyped) and the pairing attempt is dropped.

use rand::{seq::SliceRandom, Rng};

use crate::{
    confirmation::{ConfirmationCode, CODE_SPACE},
    error::{DropError, DropResult},
};

/// Upper bound on random draws spent looking for two distinct distractors.
pub const MAX_DRAWS: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChallengeOutcome {
    Match,
    Mismatch,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    correct: ConfirmationCode,
    distractors: [ConfirmationCode; 2],
    all: [ConfirmationCode; 3],
}

impl Challenge {
    pub fn build(correct: ConfirmationCode) -> DropResult<Self> {
        Self::build_with(correct, &mut rand::rng())
    }

    pub fn build_with<R: Rng + ?Sized>(
        correct: ConfirmationCode,
        rng: &mut R,
    ) -> DropResult<Self> {
        let [first, second] = draw_distractors(correct.value(), || {
            rng.random_range(0..CODE_SPACE)
        })?;
        let distractors =
            [ConfirmationCode::new(first)?, ConfirmationCode::new(second)?];

        let mut all = [correct, distractors[0], distractors[1]];
        all.shuffle(rng);

        Ok(Self {
            correct,
            distractors,
            all,
        })
    }

    /// The three codes in presentation order.
    pub fn options(&self) -> &[ConfirmationCode; 3] {
        &self.all
    }

    pub fn distractors(&self) -> &[ConfirmationCode; 2] {
        &self.distractors
    }

    pub fn correct(&self) -> ConfirmationCode {
        self.correct
    }

    /// Consumes the challenge: a mismatch cannot be retried against the same
    /// set of options.
    pub fn resolve(self, selected: u8) -> ChallengeOutcome {
        resolve_challenge(selected, self.correct.value())
    }
}

pub fn resolve_challenge(selected: u8, correct: u8) -> ChallengeOutcome {
    if selected == correct {
        ChallengeOutcome::Match
    } else {
        ChallengeOutcome::Mismatch
    }
}

/// Rejection sampling of two values distinct from `correct` and from each
/// other.
fn draw_distractors(
    correct: u8,
    mut sample: impl FnMut() -> u8,
) -> DropResult<[u8; 2]> {
    let mut found: Vec<u8> = Vec::with_capacity(2);
    for _ in 0..MAX_DRAWS {
        let candidate = sample();
        if candidate == correct || found.contains(&candidate) {
            continue;
        }
        found.push(candidate);
        if let [first, second] = found[..] {
            return Ok([first, second]);
        }
    }
    Err(DropError::ChallengeGenerationFailed(MAX_DRAWS))
}

//! Duplicate Detector: advisory fuzzy matching at intake
//!
//! A new report is compared against open tickets of the same category in the
//! same location bucket (same block, or the same normalized free-text place).
//!
//! ```text
//! score = max(token-set Jaccard, normalized Levenshtein)   over normalized text
//! duplicate  ⇔  best score > threshold (default 0.75)
//! ```
//!
//! The result never blocks submission. The engine stamps `duplicate_of` on the
//! new ticket and lets coordinators merge or reject with context. Errors here
//! degrade to "not a duplicate".

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ticket::{Category, Location, Ticket, TicketId};

/// Default similarity threshold
pub const DEFAULT_THRESHOLD: f64 = 0.75;

/// Outcome of a duplicate check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    /// Best candidate above threshold
    pub candidate_ticket_id: Option<TicketId>,
    /// Best score seen, 0.0 when there were no candidates
    pub similarity_score: f64,
    /// True when the check did not run to completion (error or timeout)
    pub degraded: bool,
}

impl DuplicateCheck {
    /// No candidates, nothing to report
    pub fn clean() -> Self {
        Self {
            is_duplicate: false,
            candidate_ticket_id: None,
            similarity_score: 0.0,
            degraded: false,
        }
    }

    /// Status unknown; submission proceeds as if clean
    pub fn degraded() -> Self {
        Self {
            degraded: true,
            ..Self::clean()
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectionError {
    #[error("Equipment description is empty after normalization")]
    EmptyDescription,

    #[error("Similarity threshold {0} is outside [0, 1]")]
    InvalidThreshold(f64),
}

/// Lowercase, strip punctuation, collapse whitespace
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .flat_map(|c| {
            let folded: Vec<char> = if c.is_alphanumeric() {
                c.to_lowercase().collect()
            } else {
                vec![' ']
            };
            folded
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn jaccard(a: &str, b: &str) -> f64 {
    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

/// Similarity of two descriptions in [0, 1]; 1.0 for identical text
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let edit = strsim::normalized_levenshtein(&a, &b);
    jaccard(&a, &b).max(edit).clamp(0.0, 1.0)
}

/// Fuzzy matcher over a candidate pool supplied by the caller
#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    threshold: f64,
}

impl DuplicateDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Whether `ticket` belongs in the candidate pool for a new report
    pub fn is_candidate(category: Category, location: &Location, ticket: &Ticket) -> bool {
        ticket.category == category
            && !ticket.status.is_terminal()
            && ticket.location.bucket() == location.bucket()
    }

    /// Score `equipment_description` against every eligible ticket in `pool`
    pub fn check(
        &self,
        category: Category,
        location: &Location,
        equipment_description: &str,
        pool: &[Ticket],
    ) -> Result<DuplicateCheck, DetectionError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(DetectionError::InvalidThreshold(self.threshold));
        }
        if normalize(equipment_description).is_empty() {
            return Err(DetectionError::EmptyDescription);
        }

        let mut best: Option<(&Ticket, f64)> = None;
        for ticket in pool
            .iter()
            .filter(|t| Self::is_candidate(category, location, t))
        {
            let score = similarity(equipment_description, &ticket.equipment_description);
            best = match best {
                None => Some((ticket, score)),
                Some((current, current_score)) => {
                    let earlier = (ticket.created_at, &ticket.ticket_id)
                        < (current.created_at, &current.ticket_id);
                    if score > current_score || (score == current_score && earlier) {
                        Some((ticket, score))
                    } else {
                        Some((current, current_score))
                    }
                }
            };
        }

        Ok(match best {
            None => DuplicateCheck::clean(),
            Some((ticket, score)) if score > self.threshold => DuplicateCheck {
                is_duplicate: true,
                candidate_ticket_id: Some(ticket.ticket_id.clone()),
                similarity_score: score,
                degraded: false,
            },
            Some((_, score)) => DuplicateCheck {
                similarity_score: score,
                ..DuplicateCheck::clean()
            },
        })
    }
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

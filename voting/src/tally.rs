use std::collections::BTreeSet;
use std::sync::Arc;

use gamify_store::{keys, transact, DocumentStore, Transaction};
use gamify_types::{
    Clock, EventId, ParticipantId, Timestamp, VoteRecord, VoteTally, VotingEvent,
};
use gamify_utils::{ErrorClass, RetryPolicy};

use crate::VotingError;

/// Result of [`TallyService::conclude_voting`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConcludeOutcome {
    /// `None` when nobody received a vote.
    pub winner: Option<ParticipantId>,
    pub winning_votes: u64,
    pub total_votes: u64,
    pub concluded_at: Timestamp,
    /// The stored result was returned without recomputation.
    pub already_concluded: bool,
}

impl ConcludeOutcome {
    fn from_event(event: &VotingEvent, already_concluded: bool) -> Self {
        Self {
            winner: event.winner.clone(),
            winning_votes: event.winning_votes,
            total_votes: event.total_votes,
            concluded_at: event.concluded_at.unwrap_or(Timestamp::EPOCH),
            already_concluded,
        }
    }
}

pub struct TallyService {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl TallyService {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            retry,
            clock,
        }
    }

    /// Create the voting event with zeroed tallies for every confirmed
    /// participant. Opening an existing event returns it unchanged.
    pub async fn open_voting(
        &self,
        event_id: &EventId,
        participants: &[ParticipantId],
        closes_at: Timestamp,
    ) -> Result<VotingEvent, VotingError> {
        event_id.validate()?;
        for participant in participants {
            participant.validate()?;
        }
        let participants: Vec<ParticipantId> = participants
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        // The event document plus one tally per candidate land in one commit.
        let writes = participants.len() + 1;
        let ceiling = self.store.batch_ceiling();
        if writes > ceiling {
            return Err(gamify_store::StoreError::BatchTooLarge {
                size: writes,
                ceiling,
            }
            .into());
        }

        let event = self
            .retry
            .execute(
                "open_voting",
                || self.open_once(event_id, &participants, closes_at),
                |e: &VotingError| ErrorClass::from_transient(e.is_transient()),
            )
            .await?;
        tracing::info!(
            event = %event_id,
            participants = event.participants.len(),
            closes_at = event.closes_at.as_secs(),
            "voting open"
        );
        Ok(event)
    }

    /// Record `voter`'s vote for `candidate` and return the candidate's
    /// updated tally. A second vote by the same voter is rejected.
    pub async fn cast_vote(
        &self,
        event_id: &EventId,
        voter: &ParticipantId,
        candidate: &ParticipantId,
    ) -> Result<VoteTally, VotingError> {
        event_id.validate()?;
        voter.validate()?;
        candidate.validate()?;
        if voter == candidate {
            return Err(VotingError::SelfVote);
        }

        let result = self
            .retry
            .execute(
                "cast_vote",
                || self.cast_once(event_id, voter, candidate),
                |e: &VotingError| ErrorClass::from_transient(e.is_transient()),
            )
            .await;

        match &result {
            Ok(tally) => tracing::info!(
                event = %event_id,
                voter = %voter,
                candidate = %candidate,
                votes = tally.vote_count,
                "vote recorded"
            ),
            Err(VotingError::DuplicateVote { .. }) => {
                tracing::debug!(event = %event_id, voter = %voter, "duplicate vote rejected")
            }
            Err(_) => {}
        }
        result
    }

    /// Determine the winner once. Later calls return the stored result.
    pub async fn conclude_voting(
        &self,
        event_id: &EventId,
    ) -> Result<ConcludeOutcome, VotingError> {
        event_id.validate()?;
        let outcome = self
            .retry
            .execute(
                "conclude_voting",
                || self.conclude_once(event_id),
                |e: &VotingError| ErrorClass::from_transient(e.is_transient()),
            )
            .await?;

        if outcome.already_concluded {
            tracing::debug!(event = %event_id, "voting already concluded");
        } else {
            tracing::info!(
                event = %event_id,
                winner = ?outcome.winner.as_ref().map(ParticipantId::as_str),
                winning_votes = outcome.winning_votes,
                total_votes = outcome.total_votes,
                "voting concluded"
            );
        }
        Ok(outcome)
    }

    pub async fn event(&self, event_id: &EventId) -> Result<Option<VotingEvent>, VotingError> {
        event_id.validate()?;
        let doc = self.store.get(&keys::voting_event(event_id)).await?;
        Ok(doc.map(|d| gamify_store::decode(&d)).transpose()?)
    }

    pub async fn tally(
        &self,
        event_id: &EventId,
        candidate: &ParticipantId,
    ) -> Result<u64, VotingError> {
        event_id.validate()?;
        candidate.validate()?;
        let doc = self.store.get(&keys::vote_tally(event_id, candidate)).await?;
        let tally: Option<VoteTally> = doc.map(|d| gamify_store::decode(&d)).transpose()?;
        Ok(tally.map_or(0, |t| t.vote_count))
    }

    async fn open_once(
        &self,
        event_id: &EventId,
        participants: &[ParticipantId],
        closes_at: Timestamp,
    ) -> Result<VotingEvent, VotingError> {
        let opened_at = self.clock.now();
        transact(self.store.as_ref(), |txn| {
            open_in_txn(txn, event_id, participants, opened_at, closes_at)
        })
        .await
    }

    async fn cast_once(
        &self,
        event_id: &EventId,
        voter: &ParticipantId,
        candidate: &ParticipantId,
    ) -> Result<VoteTally, VotingError> {
        let now = self.clock.now();
        transact(self.store.as_ref(), |txn| {
            cast_in_txn(txn, event_id, voter, candidate, now)
        })
        .await
    }

    async fn conclude_once(&self, event_id: &EventId) -> Result<ConcludeOutcome, VotingError> {
        let now = self.clock.now();
        transact(self.store.as_ref(), |txn| conclude_in_txn(txn, event_id, now)).await
    }
}

fn open_in_txn(
    txn: &mut dyn Transaction,
    event_id: &EventId,
    participants: &[ParticipantId],
    opened_at: Timestamp,
    closes_at: Timestamp,
) -> Result<VotingEvent, VotingError> {
    let key = keys::voting_event(event_id);
    if let Some(existing) = txn.get_as::<VotingEvent>(&key)? {
        return Ok(existing);
    }
    let event = VotingEvent {
        event_id: event_id.clone(),
        participants: participants.to_vec(),
        opened_at,
        closes_at,
        total_votes: 0,
        concluded: false,
        winner: None,
        winning_votes: 0,
        concluded_at: None,
    };
    txn.set_as(key, &event)?;
    for candidate in participants {
        let tally = VoteTally {
            event_id: event_id.clone(),
            candidate_id: candidate.clone(),
            vote_count: 0,
        };
        txn.set_as(keys::vote_tally(event_id, candidate), &tally)?;
    }
    Ok(event)
}

fn cast_in_txn(
    txn: &mut dyn Transaction,
    event_id: &EventId,
    voter: &ParticipantId,
    candidate: &ParticipantId,
    now: Timestamp,
) -> Result<VoteTally, VotingError> {
    let event_key = keys::voting_event(event_id);
    let mut event = txn
        .get_as::<VotingEvent>(&event_key)?
        .ok_or_else(|| VotingError::NotFound(event_id.clone()))?;
    if event.concluded || now >= event.closes_at {
        return Err(VotingError::VotingClosed(event_id.clone()));
    }
    for participant in [voter, candidate] {
        if !event.is_participant(participant) {
            return Err(VotingError::NotEligible {
                event: event_id.clone(),
                participant: participant.clone(),
            });
        }
    }

    let record_key = keys::vote_record(event_id, voter);
    if txn.exists(&record_key)? {
        return Err(VotingError::DuplicateVote {
            event: event_id.clone(),
            voter: voter.clone(),
        });
    }

    let tally_key = keys::vote_tally(event_id, candidate);
    let mut tally = txn.get_as::<VoteTally>(&tally_key)?.unwrap_or_else(|| VoteTally {
        event_id: event_id.clone(),
        candidate_id: candidate.clone(),
        vote_count: 0,
    });
    tally.vote_count += 1;
    event.total_votes += 1;

    txn.set_as(
        record_key,
        &VoteRecord {
            event_id: event_id.clone(),
            voter_id: voter.clone(),
            candidate_id: candidate.clone(),
            cast_at: now,
        },
    )?;
    txn.set_as(tally_key, &tally)?;
    txn.set_as(event_key, &event)?;
    Ok(tally)
}

fn conclude_in_txn(
    txn: &mut dyn Transaction,
    event_id: &EventId,
    now: Timestamp,
) -> Result<ConcludeOutcome, VotingError> {
    let event_key = keys::voting_event(event_id);
    let mut event = txn
        .get_as::<VotingEvent>(&event_key)?
        .ok_or_else(|| VotingError::NotFound(event_id.clone()))?;
    if event.concluded {
        return Ok(ConcludeOutcome::from_event(&event, true));
    }

    let mut leader: Option<(&ParticipantId, u64)> = None;
    for candidate in &event.participants {
        let votes = txn
            .get_as::<VoteTally>(&keys::vote_tally(event_id, candidate))?
            .map_or(0, |t| t.vote_count);
        // Ties go to the smallest id.
        let leads = match leader {
            None => votes > 0,
            Some((best_id, best)) => votes > best || (votes == best && candidate < best_id),
        };
        if leads {
            leader = Some((candidate, votes));
        }
    }

    let (winner, winning_votes) = match leader {
        Some((id, votes)) => (Some(id.clone()), votes),
        None => (None, 0),
    };
    event.winner = winner;
    event.winning_votes = winning_votes;
    event.concluded = true;
    event.concluded_at = Some(now);
    txn.set_as(event_key, &event)?;
    Ok(ConcludeOutcome::from_event(&event, false))
}

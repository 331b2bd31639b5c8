//! In-flight query correlation and deduplication.
//!
//! The first client asking for a key becomes the leader and drives the
//! upstream exchange under a fresh, unpredictable transaction id; concurrent
//! duplicates subscribe to the leader's broadcast channel. The pending entry
//! is removed from the map before the outcome is broadcast, so the success
//! and timeout paths cannot both fire and every waiter observes exactly one
//! outcome.

use conduit_dns_domain::message::Question;
use conduit_dns_domain::{DnsMessage, QueryKey};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Cap on clients coalesced onto a single upstream exchange.
const DEFAULT_MAX_WAITERS: usize = 100;

/// Shared result of one upstream exchange.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Answered(Arc<DnsMessage>),
    Failed,
}

struct Pending {
    waiters: usize,
    sender: broadcast::Sender<QueryOutcome>,
}

type PendingMap = DashMap<QueryKey, Pending, FxBuildHasher>;

pub struct PendingQueryTable {
    inner: Arc<PendingMap>,
    max_waiters: usize,
}

pub enum JoinOutcome {
    /// Caller is the leader and must resolve the query, then call
    /// [`LeaderGuard::complete`]. Dropping the guard fails the waiters.
    Lead(LeaderGuard),
    /// Another task is already resolving this key; await the broadcast.
    Wait(broadcast::Receiver<QueryOutcome>),
    /// Too many clients already coalesced on this key.
    Overloaded,
}

impl PendingQueryTable {
    pub fn new() -> Self {
        Self::with_max_waiters(DEFAULT_MAX_WAITERS)
    }

    pub fn with_max_waiters(max_waiters: usize) -> Self {
        Self {
            inner: Arc::new(PendingMap::with_hasher(FxBuildHasher)),
            max_waiters,
        }
    }

    pub fn join(&self, key: &QueryKey) -> JoinOutcome {
        match self.inner.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let pending = entry.get_mut();
                if pending.waiters >= self.max_waiters {
                    return JoinOutcome::Overloaded;
                }
                pending.waiters += 1;
                JoinOutcome::Wait(pending.sender.subscribe())
            }
            Entry::Vacant(slot) => {
                let (sender, _first_rx) = broadcast::channel(1);
                slot.insert(Pending {
                    waiters: 0,
                    sender: sender.clone(),
                });
                JoinOutcome::Lead(LeaderGuard {
                    table: Arc::clone(&self.inner),
                    key: key.clone(),
                    upstream_id: fastrand::u16(..),
                    sender,
                    completed: false,
                })
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.inner.contains_key(key)
    }
}

impl Default for PendingQueryTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive right (and duty) to resolve one pending query.
pub struct LeaderGuard {
    table: Arc<PendingMap>,
    key: QueryKey,
    upstream_id: u16,
    sender: broadcast::Sender<QueryOutcome>,
    completed: bool,
}

impl LeaderGuard {
    /// The transaction id to use upstream. Freshly generated per exchange,
    /// never derived from any client-supplied id.
    pub fn upstream_id(&self) -> u16 {
        self.upstream_id
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Publishes the outcome to every waiter and releases the pending entry.
    pub fn complete(mut self, outcome: QueryOutcome) {
        self.finish(outcome);
    }

    fn finish(&mut self, outcome: QueryOutcome) {
        if self.completed {
            return;
        }
        self.completed = true;
        // Remove before sending: a query arriving after this point starts a
        // fresh exchange instead of subscribing to a dead channel.
        self.table.remove(&self.key);
        let _ = self.sender.send(outcome);
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        self.finish(QueryOutcome::Failed);
    }
}

/// Why an upstream reply was rejected as not matching its query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyMismatch {
    NotAResponse,
    WrongId { expected: u16, actual: u16 },
    QuestionMismatch,
}

impl fmt::Display for ReplyMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyMismatch::NotAResponse => f.write_str("QR bit not set"),
            ReplyMismatch::WrongId { expected, actual } => {
                write!(f, "transaction id {actual:#06x}, expected {expected:#06x}")
            }
            ReplyMismatch::QuestionMismatch => f.write_str("question section does not match"),
        }
    }
}

/// Validates an upstream reply against the query it should answer. Replies
/// failing this check are dropped without disturbing the pending state.
pub fn validate_upstream_reply(
    expected_id: u16,
    question: &Question,
    reply: &DnsMessage,
) -> Result<(), ReplyMismatch> {
    if !reply.flags.response {
        return Err(ReplyMismatch::NotAResponse);
    }
    if reply.id != expected_id {
        return Err(ReplyMismatch::WrongId {
            expected: expected_id,
            actual: reply.id,
        });
    }
    match reply.question() {
        Some(reply_question) if reply_question.matches(question) => Ok(()),
        _ => Err(ReplyMismatch::QuestionMismatch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_dns_domain::record::{RecordClass, RecordType};
    use conduit_dns_domain::Rcode;

    fn key() -> QueryKey {
        QueryKey::new("example.com", RecordType::A, RecordClass::IN)
    }

    fn question() -> Question {
        Question::new("example.com", RecordType::A, RecordClass::IN)
    }

    #[tokio::test]
    async fn first_join_leads_second_waits() {
        let table = PendingQueryTable::new();
        let guard = match table.join(&key()) {
            JoinOutcome::Lead(guard) => guard,
            _ => panic!("first join should lead"),
        };
        assert!(table.contains(&key()));

        let mut rx = match table.join(&key()) {
            JoinOutcome::Wait(rx) => rx,
            _ => panic!("second join should wait"),
        };

        guard.complete(QueryOutcome::Failed);
        assert!(matches!(rx.recv().await, Ok(QueryOutcome::Failed)));
        assert!(!table.contains(&key()));
    }

    #[tokio::test]
    async fn outcome_fans_out_to_all_waiters() {
        let table = PendingQueryTable::new();
        let guard = match table.join(&key()) {
            JoinOutcome::Lead(guard) => guard,
            _ => panic!(),
        };

        let mut receivers: Vec<_> = (0..10)
            .map(|_| match table.join(&key()) {
                JoinOutcome::Wait(rx) => rx,
                _ => panic!("duplicates should wait"),
            })
            .collect();

        let query = DnsMessage::query(guard.upstream_id(), question());
        let reply = Arc::new(query.response_with_rcode(Rcode::NoError));
        guard.complete(QueryOutcome::Answered(Arc::clone(&reply)));

        for rx in receivers.iter_mut() {
            match rx.recv().await {
                Ok(QueryOutcome::Answered(message)) => assert_eq!(*message, *reply),
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn dropped_guard_fails_waiters_and_clears_entry() {
        let table = PendingQueryTable::new();
        let guard = match table.join(&key()) {
            JoinOutcome::Lead(guard) => guard,
            _ => panic!(),
        };
        let mut rx = match table.join(&key()) {
            JoinOutcome::Wait(rx) => rx,
            _ => panic!(),
        };

        drop(guard);
        assert!(matches!(rx.recv().await, Ok(QueryOutcome::Failed)));
        assert!(table.is_empty());
    }

    #[test]
    fn waiter_cap_sheds_load() {
        let table = PendingQueryTable::with_max_waiters(2);
        let _guard = match table.join(&key()) {
            JoinOutcome::Lead(guard) => guard,
            _ => panic!(),
        };
        let _rx1 = match table.join(&key()) {
            JoinOutcome::Wait(rx) => rx,
            _ => panic!(),
        };
        let _rx2 = match table.join(&key()) {
            JoinOutcome::Wait(rx) => rx,
            _ => panic!(),
        };
        assert!(matches!(table.join(&key()), JoinOutcome::Overloaded));
    }

    #[test]
    fn each_exchange_draws_a_fresh_upstream_id() {
        let table = PendingQueryTable::new();
        let mut ids = Vec::new();
        for _ in 0..32 {
            let guard = match table.join(&key()) {
                JoinOutcome::Lead(guard) => guard,
                _ => panic!("table should be empty between exchanges"),
            };
            ids.push(guard.upstream_id());
            guard.complete(QueryOutcome::Failed);
        }
        // 32 random u16s collapsing to one value means the generator is
        // not being consulted.
        assert!(ids.iter().any(|id| *id != ids[0]));
        assert!(table.is_empty());
    }

    #[test]
    fn reply_validation() {
        let query = DnsMessage::query(0x4242, question());

        let ok = query.response_with_rcode(Rcode::NoError);
        assert_eq!(validate_upstream_reply(0x4242, &question(), &ok), Ok(()));

        let mut not_response = ok.clone();
        not_response.flags.response = false;
        assert_eq!(
            validate_upstream_reply(0x4242, &question(), &not_response),
            Err(ReplyMismatch::NotAResponse)
        );

        let mut wrong_id = ok.clone();
        wrong_id.id = 0x4243;
        assert!(matches!(
            validate_upstream_reply(0x4242, &question(), &wrong_id),
            Err(ReplyMismatch::WrongId { .. })
        ));

        let mut wrong_question = ok.clone();
        wrong_question.questions[0] =
            Question::new("evil.example", RecordType::A, RecordClass::IN);
        assert_eq!(
            validate_upstream_reply(0x4242, &question(), &wrong_question),
            Err(ReplyMismatch::QuestionMismatch)
        );

        // Case differences in the name are not a mismatch.
        let mut case_variant = ok.clone();
        case_variant.questions[0] =
            Question::new("EXAMPLE.com", RecordType::A, RecordClass::IN);
        assert_eq!(
            validate_upstream_reply(0x4242, &question(), &case_variant),
            Ok(())
        );
    }
}

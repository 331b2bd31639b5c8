use crate::correlator::{JoinOutcome, LeaderGuard, PendingQueryTable, QueryOutcome};
use crate::events::{QueryEvent, QueryEventEmitter};
use crate::ports::{ResponseCache, UpstreamExchanger};
use conduit_dns_domain::message::Opcode;
use conduit_dns_domain::{DnsMessage, QueryKey, Question, Rcode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Slack added to a waiter's deadline so the leader's own timeout fires
/// first and the waiter still observes the broadcast outcome.
const WAITER_GRACE: Duration = Duration::from_millis(250);

/// Per-query orchestration: cache lookup, deduplicated forwarding, cache
/// population, and reply synthesis. Owns the pending-query table; the cache
/// and upstream client are injected ports.
pub struct ForwardingEngine {
    cache: Option<Arc<dyn ResponseCache>>,
    upstream: Arc<dyn UpstreamExchanger>,
    pending: PendingQueryTable,
    query_timeout: Duration,
    events: QueryEventEmitter,
}

impl ForwardingEngine {
    pub fn new(
        cache: Option<Arc<dyn ResponseCache>>,
        upstream: Arc<dyn UpstreamExchanger>,
        query_timeout: Duration,
        events: QueryEventEmitter,
    ) -> Self {
        Self {
            cache,
            upstream,
            pending: PendingQueryTable::new(),
            query_timeout,
            events,
        }
    }

    pub fn pending_queries(&self) -> usize {
        self.pending.len()
    }

    /// Resolves one decoded client query into the response to send back.
    /// Never fails: transport and upstream errors surface as SERVFAIL,
    /// unsupported input as NOTIMP/FORMERR.
    pub async fn handle_query(&self, client_query: &DnsMessage) -> DnsMessage {
        if client_query.flags.response || client_query.flags.opcode != Opcode::Query {
            debug!(id = client_query.id, opcode = ?client_query.flags.opcode, "Not a standard query");
            return client_query.response_with_rcode(Rcode::NotImp);
        }

        let question = match (client_query.questions.len(), client_query.question()) {
            (1, Some(question)) => question.clone(),
            _ => {
                debug!(
                    id = client_query.id,
                    qdcount = client_query.questions.len(),
                    "Expected exactly one question"
                );
                return client_query.response_with_rcode(Rcode::FormErr);
            }
        };

        let key = QueryKey::from(&question);
        info!(query = %key, id = client_query.id, "Query received");
        self.events.emit(QueryEvent::Received { key: key.clone() });

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key) {
                debug!(query = %key, age_secs = hit.age_secs, "Cache hit");
                self.events.emit(QueryEvent::CacheHit {
                    key,
                    age_secs: hit.age_secs,
                });
                let mut response = hit.message;
                response.decay_ttls(hit.age_secs);
                return Self::personalize(response, client_query);
            }
            self.events.emit(QueryEvent::CacheMiss { key: key.clone() });
        }

        let outcome = match self.pending.join(&key) {
            JoinOutcome::Lead(guard) => self.lead_exchange(&key, &question, guard).await,
            JoinOutcome::Wait(rx) => self.await_leader(&key, rx).await,
            JoinOutcome::Overloaded => {
                warn!(query = %key, "Too many coalesced clients, shedding");
                QueryOutcome::Failed
            }
        };

        match outcome {
            QueryOutcome::Answered(shared) => Self::personalize((*shared).clone(), client_query),
            QueryOutcome::Failed => client_query.response_with_rcode(Rcode::ServFail),
        }
    }

    /// Drives the upstream exchange as the leader for `key`, publishes the
    /// outcome, and returns it for the leader's own client.
    async fn lead_exchange(
        &self,
        key: &QueryKey,
        question: &Question,
        guard: LeaderGuard,
    ) -> QueryOutcome {
        let upstream_query = DnsMessage::query(guard.upstream_id(), question.clone());

        let outcome = match tokio::time::timeout(
            self.query_timeout,
            self.upstream.exchange(&upstream_query),
        )
        .await
        {
            Ok(Ok(answer)) => {
                debug!(query = %key, server = %answer.server, "Resolved upstream");
                if let Some(cache) = &self.cache {
                    cache.put(key.clone(), &answer.message);
                }
                QueryOutcome::Answered(Arc::new(answer.message))
            }
            Ok(Err(error)) => {
                warn!(query = %key, error = %error, "Upstream exchange failed");
                self.events.emit(QueryEvent::UpstreamFailure {
                    key: key.clone(),
                    detail: error.to_string(),
                });
                QueryOutcome::Failed
            }
            Err(_) => {
                warn!(query = %key, timeout_ms = self.query_timeout.as_millis() as u64, "Query timed out");
                self.events.emit(QueryEvent::Timeout { key: key.clone() });
                QueryOutcome::Failed
            }
        };

        guard.complete(outcome.clone());
        outcome
    }

    /// Waits for another task's exchange to finish. Bounded by the query
    /// timeout plus a small grace so a wedged leader cannot strand clients.
    async fn await_leader(
        &self,
        key: &QueryKey,
        mut rx: tokio::sync::broadcast::Receiver<QueryOutcome>,
    ) -> QueryOutcome {
        match tokio::time::timeout(self.query_timeout + WAITER_GRACE, rx.recv()).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_closed)) => QueryOutcome::Failed,
            Err(_) => {
                warn!(query = %key, "Waiter timed out before leader resolved");
                self.events.emit(QueryEvent::Timeout { key: key.clone() });
                QueryOutcome::Failed
            }
        }
    }

    /// Rewrites a shared resolved response for one specific client: the
    /// client's transaction id and question spelling, RD echoed, RA set.
    fn personalize(mut response: DnsMessage, client_query: &DnsMessage) -> DnsMessage {
        response.id = client_query.id;
        response.flags.response = true;
        response.flags.recursion_desired = client_query.flags.recursion_desired;
        response.flags.recursion_available = true;
        response.questions = client_query.questions.clone();
        response
    }
}

//! The consensus service: the locked [`ConsensusBook`], the tally loop and
//! dissemination of proposals and votes over the transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use onet_transport::{Transport, TransportEvent};
use onet_types::{Capabilities, Timestamp};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::book::{ConsensusBook, ConsensusState, ConsensusStats, ConsensusStatus, TallyReport};
use crate::proposal::Proposal;
use crate::roster::ConsensusNode;
use crate::{ConsensusConfig, ConsensusError, ConsensusMessage};

pub const CONSENSUS_EVENT_CAPACITY: usize = 256;

/// Decisions published after each tally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsensusEvent {
    ProposalApproved { proposal_id: String },
    ProposalRejected { proposal_id: String },
    ProposalExpired { proposal_id: String },
    LeaderChanged { leader: Option<String> },
}

struct Shared {
    book: Mutex<ConsensusBook>,
    transport: Arc<dyn Transport>,
    config: ConsensusConfig,
    running: AtomicBool,
    shutdown: broadcast::Sender<()>,
    events: broadcast::Sender<ConsensusEvent>,
}

pub struct Consensus {
    shared: Arc<Shared>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Consensus {
    pub fn new(config: ConsensusConfig, transport: Arc<dyn Transport>) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        let (events, _) = broadcast::channel(CONSENSUS_EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                book: Mutex::new(ConsensusBook::new(&config)),
                transport,
                config,
                running: AtomicBool::new(false),
                shutdown,
                events,
            }),
            task_handles: Mutex::new(Vec::new()),
        }
    }

    // -- Lifecycle -------------------------------------------------------------

    pub async fn start_consensus(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("consensus already running");
            return;
        }
        self.shared
            .book
            .lock()
            .await
            .set_state(ConsensusState::Initializing);

        let mut handles = self.task_handles.lock().await;
        let shared = Arc::clone(&self.shared);
        let shutdown_rx = self.shared.shutdown.subscribe();
        handles.push(tokio::spawn(tally_loop(shared, shutdown_rx)));

        let shared = Arc::clone(&self.shared);
        let events_rx = self.shared.transport.subscribe();
        let shutdown_rx = self.shared.shutdown.subscribe();
        handles.push(tokio::spawn(inbound_loop(shared, events_rx, shutdown_rx)));

        tracing::info!(
            interval_secs = self.shared.config.tally_interval_secs,
            "consensus started"
        );
    }

    pub async fn stop_consensus(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shared.shutdown.send(());
        let handles: Vec<JoinHandle<()>> = self.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "consensus task ended abnormally");
            }
        }
        self.shared
            .book
            .lock()
            .await
            .set_state(ConsensusState::Stopped);
        tracing::info!("consensus stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    // -- Operations ------------------------------------------------------------

    /// Record a proposal locally and broadcast it. Always succeeds; the
    /// decision arrives with a later tally.
    pub async fn propose(&self, proposer: &str, kind: &str, payload: Vec<u8>) -> String {
        let proposal = self
            .shared
            .book
            .lock()
            .await
            .propose(proposer, kind, payload, Timestamp::now());
        tracing::debug!(proposal = %proposal.id, %proposer, %kind, "proposal created");
        let id = proposal.id.clone();
        self.shared
            .disseminate(ConsensusMessage::Proposal(proposal))
            .await;
        id
    }

    /// Record (or replace) a vote locally and broadcast it.
    pub async fn vote(&self, proposal_id: &str, voter: &str, approve: bool, justification: &str) {
        let vote = self.shared.book.lock().await.vote(
            proposal_id,
            voter,
            approve,
            justification,
            Timestamp::now(),
        );
        tracing::debug!(proposal = %proposal_id, %voter, approve, "vote recorded");
        self.shared.disseminate(ConsensusMessage::Vote(vote)).await;
    }

    pub async fn add_consensus_node(
        &self,
        node_id: &str,
        stake: f64,
        capabilities: Capabilities,
    ) -> Result<(), ConsensusError> {
        let added = self
            .shared
            .book
            .lock()
            .await
            .add_node(node_id, stake, capabilities, Timestamp::now())?;
        tracing::info!(node = %node_id, stake, added, "consensus node registered");
        Ok(())
    }

    pub async fn remove_consensus_node(&self, node_id: &str) -> Result<ConsensusNode, ConsensusError> {
        let removed = self.shared.book.lock().await.remove_node(node_id)?;
        tracing::info!(node = %node_id, "consensus node removed");
        Ok(removed)
    }

    pub async fn consensus_status(&self) -> ConsensusStatus {
        self.shared.book.lock().await.status()
    }

    pub async fn consensus_stats(&self) -> ConsensusStats {
        self.shared.book.lock().await.stats()
    }

    pub async fn proposal(&self, proposal_id: &str) -> Option<Proposal> {
        self.shared.book.lock().await.proposal(proposal_id).cloned()
    }

    /// Run one tally immediately.
    pub async fn tally(&self) -> TallyReport {
        self.shared.tally_once().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsensusEvent> {
        self.shared.events.subscribe()
    }
}

impl Shared {
    async fn tally_once(&self) -> TallyReport {
        let report = self.book.lock().await.tally(Timestamp::now());
        if report.decided() > 0 || report.leader_changed {
            tracing::info!(
                approved = report.approved.len(),
                rejected = report.rejected.len(),
                expired = report.expired.len(),
                leader = report.leader.as_deref().unwrap_or("none"),
                "consensus tally"
            );
        }
        let events = report
            .approved
            .iter()
            .map(|id| ConsensusEvent::ProposalApproved { proposal_id: id.clone() })
            .chain(report.rejected.iter().map(|id| ConsensusEvent::ProposalRejected {
                proposal_id: id.clone(),
            }))
            .chain(report.expired.iter().map(|id| ConsensusEvent::ProposalExpired {
                proposal_id: id.clone(),
            }));
        for event in events {
            let _ = self.events.send(event);
        }
        if report.leader_changed {
            let _ = self.events.send(ConsensusEvent::LeaderChanged {
                leader: report.leader.clone(),
            });
        }
        report
    }

    /// Best effort: failures are logged and never reach the caller.
    async fn disseminate(&self, message: ConsensusMessage) {
        if !self.config.disseminate {
            return;
        }
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode consensus message");
                return;
            }
        };
        match self.transport.broadcast_message(&payload).await {
            Ok(reached) => tracing::trace!(reached, "consensus message broadcast"),
            Err(e) => tracing::warn!(error = %e, "consensus broadcast failed"),
        }
    }

    async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::NodeConnected { node_id, .. } => {
                if self.book.lock().await.set_active(&node_id, true) {
                    tracing::debug!(node = %node_id, "consensus node reactivated");
                }
            }
            TransportEvent::NodeDisconnected { node_id } => {
                if self.book.lock().await.set_active(&node_id, false) {
                    tracing::debug!(node = %node_id, "consensus node deactivated");
                }
            }
            TransportEvent::MessageReceived { from, payload } => {
                match ConsensusMessage::decode(&payload) {
                    Ok(Some(message)) => self.apply(message, &from).await,
                    Ok(None) => {}
                    Err(e) => tracing::warn!(%from, error = %e, "dropping malformed consensus message"),
                }
            }
        }
    }

    async fn apply(&self, message: ConsensusMessage, from: &str) {
        let mut book = self.book.lock().await;
        match message {
            ConsensusMessage::Proposal(proposal) => {
                let id = proposal.id.clone();
                if book.accept_proposal(proposal) {
                    tracing::debug!(proposal = %id, %from, "remote proposal accepted");
                }
            }
            ConsensusMessage::Vote(vote) => {
                tracing::trace!(proposal = %vote.proposal_id, voter = %vote.voter, %from, "remote vote");
                if !book.accept_vote(vote, Timestamp::now()) {
                    tracing::debug!(%from, "remote vote dropped");
                }
            }
        }
    }
}

async fn tally_loop(shared: Arc<Shared>, mut shutdown_rx: broadcast::Receiver<()>) {
    loop {
        // A panicking cycle is contained in its own task so the loop survives.
        let cycle = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move { shared.tally_once().await })
        };
        let delay: Duration = match cycle.await {
            Ok(_) => shared.config.tally_interval(),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    backoff_secs = shared.config.error_backoff_secs,
                    "consensus tally failed"
                );
                shared.book.lock().await.set_state(ConsensusState::Error);
                shared.config.error_backoff()
            }
        };
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    tracing::debug!("consensus tally loop shutting down");
}

async fn inbound_loop(
    shared: Arc<Shared>,
    mut events_rx: broadcast::Receiver<TransportEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            event = events_rx.recv() => match event {
                Ok(event) => shared.handle_transport_event(event).await,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "consensus lagged behind transport events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

//! Scripted engine for driving players without a network.

use async_trait::async_trait;
use parking_lot::Mutex;

use round_player::error::{EngineError, EngineResult};
use round_player::gateway::{Collection, Contribution, EngineGateway};
use round_player::state::{EngineEvent, EngineEventType, Event};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    StartMatch { team: String, players: u32 },
    Join { player: String, external_id: i64 },
    Collect { player: String, external_id: i64 },
    Submit { player: String, external_id: i64, total: i64 },
}

/// Engine double with canned replies, a growing notification stream and a
/// call log.
///
/// With `auto_advance`, each successful call emits the notification a real
/// engine would send next: join → collect ready, collect → submit ready,
/// submit → succeeded.
pub struct ScriptedEngine {
    events: Mutex<Vec<EngineEvent>>,
    calls: Mutex<Vec<EngineCall>>,
    join_reply: Mutex<EngineResult<bool>>,
    collect_reply: Mutex<EngineResult<Collection>>,
    submit_reply: Mutex<EngineResult<()>>,
    auto_advance: bool,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            join_reply: Mutex::new(Ok(true)),
            collect_reply: Mutex::new(Err(EngineError::Unavailable("no collection".into()))),
            submit_reply: Mutex::new(Ok(())),
            auto_advance: false,
        }
    }
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_advancing() -> Self {
        Self {
            auto_advance: true,
            ..Self::default()
        }
    }

    /// Appends a notification and returns its ordinal.
    pub fn emit(&self, kind: EngineEventType, external_id: i64) -> u64 {
        let mut events = self.events.lock();
        let ordinal = events.last().map(|e| e.ordinal).unwrap_or(0) + 1;
        events.push(Event::new(ordinal, kind, external_id));
        ordinal
    }

    pub fn event(&self, ordinal: u64) -> EngineEvent {
        self.events
            .lock()
            .iter()
            .find(|e| e.ordinal == ordinal)
            .cloned()
            .expect("no such engine event")
    }

    pub fn reply_join(&self, reply: EngineResult<bool>) {
        *self.join_reply.lock() = reply;
    }

    pub fn reply_collect(&self, reply: EngineResult<Collection>) {
        *self.collect_reply.lock() = reply;
    }

    pub fn reply_submit(&self, reply: EngineResult<()>) {
        *self.submit_reply.lock() = reply;
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn submissions(&self) -> Vec<(String, i64)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                EngineCall::Submit { player, total, .. } => Some((player.clone(), *total)),
                _ => None,
            })
            .collect()
    }

    fn advance(&self, kind: EngineEventType, external_id: i64) {
        if self.auto_advance {
            self.emit(kind, external_id);
        }
    }
}

/// Builds a collect reply from `(player, value)` pairs.
pub fn collection(contributions: &[(&str, i64)], rank: i64) -> Collection {
    Collection {
        contributions: contributions
            .iter()
            .map(|(player, value)| Contribution {
                player: player.to_string(),
                value: *value,
            })
            .collect(),
        rank,
    }
}

#[async_trait]
impl EngineGateway for ScriptedEngine {
    async fn start_match(&self, team: &str, players: u32) -> EngineResult<()> {
        self.calls.lock().push(EngineCall::StartMatch {
            team: team.to_string(),
            players,
        });
        Ok(())
    }

    async fn join_round(&self, _team: &str, player: &str, external_id: i64) -> EngineResult<bool> {
        self.calls.lock().push(EngineCall::Join {
            player: player.to_string(),
            external_id,
        });
        let reply = self.join_reply.lock().clone();
        if matches!(reply, Ok(true)) {
            self.advance(EngineEventType::RoundCollectReady, external_id);
        }
        reply
    }

    async fn collect_round(
        &self,
        _team: &str,
        player: &str,
        external_id: i64,
    ) -> EngineResult<Collection> {
        self.calls.lock().push(EngineCall::Collect {
            player: player.to_string(),
            external_id,
        });
        let reply = self.collect_reply.lock().clone();
        if reply.is_ok() {
            self.advance(EngineEventType::RoundSubmitReady, external_id);
        }
        reply
    }

    async fn submit_round(
        &self,
        _team: &str,
        player: &str,
        external_id: i64,
        total: i64,
    ) -> EngineResult<()> {
        let reply = self.submit_reply.lock().clone();
        if reply.is_ok() {
            self.calls.lock().push(EngineCall::Submit {
                player: player.to_string(),
                external_id,
                total,
            });
            self.advance(EngineEventType::RoundSucceeded, external_id);
        }
        reply
    }

    async fn events_after(&self, cursor: u64, limit: usize) -> EngineResult<Vec<EngineEvent>> {
        Ok(self
            .events
            .lock()
            .iter()
            .filter(|e| e.ordinal > cursor)
            .take(limit)
            .cloned()
            .collect())
    }
}

use std::collections::HashMap;

use crate::scheduler::{Firing, SessionKey, TimerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scheduled,
    Cancelled,
}

#[derive(Debug)]
pub struct ActiveSession {
    investment_id: String,
    owner: ConnectionId,
    key: SessionKey,
    state: SessionState,
    timer: Option<TimerHandle>,
}

impl ActiveSession {
    pub fn new(investment_id: impl Into<String>, owner: ConnectionId, key: SessionKey) -> Self {
        Self {
            investment_id: investment_id.into(),
            owner,
            key,
            state: SessionState::Idle,
            timer: None,
        }
    }

    pub fn investment_id(&self) -> &str {
        &self.investment_id
    }

    pub fn owner(&self) -> ConnectionId {
        self.owner
    }

    pub fn key(&self) -> SessionKey {
        self.key
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    // Cancelled is terminal.
    pub fn arm(&mut self, mut timer: TimerHandle) {
        if self.state == SessionState::Cancelled {
            timer.cancel();
            return;
        }

        self.timer = Some(timer);
        self.state = SessionState::Scheduled;
    }

    pub fn cancel(&mut self) -> bool {
        if self.state == SessionState::Cancelled {
            return false;
        }

        if let Some(mut timer) = self.timer.take() {
            timer.cancel();
        }
        self.state = SessionState::Cancelled;
        true
    }

    fn accepts(&self, firing: &Firing) -> bool {
        self.key == firing.session && self.state == SessionState::Scheduled
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, ActiveSession>,
    next_key: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue_key(&mut self) -> SessionKey {
        self.next_key = self.next_key.wrapping_add(1);
        SessionKey(self.next_key)
    }

    pub fn register(&mut self, session: ActiveSession) -> Option<ActiveSession> {
        let replaced = self.unregister(&session.investment_id);
        self.sessions.insert(session.investment_id.clone(), session);
        replaced
    }

    pub fn lookup(&self, investment_id: &str) -> Option<&ActiveSession> {
        self.sessions.get(investment_id)
    }

    pub fn lookup_mut(&mut self, investment_id: &str) -> Option<&mut ActiveSession> {
        self.sessions.get_mut(investment_id)
    }

    pub fn unregister(&mut self, investment_id: &str) -> Option<ActiveSession> {
        let mut session = self.sessions.remove(investment_id)?;
        session.cancel();
        Some(session)
    }

    pub fn size(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_live(&self, firing: &Firing) -> bool {
        self.lookup(&firing.investment_id)
            .is_some_and(|session| session.accepts(firing))
    }

    pub fn owned_by(&self, owner: ConnectionId) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .values()
            .filter(|session| session.owner == owner)
            .map(|session| session.investment_id.clone())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn investment_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.sessions.len();
        for (_, mut session) in self.sessions.drain() {
            session.cancel();
        }
        cancelled
    }
}

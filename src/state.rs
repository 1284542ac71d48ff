//! Thread-safe snapshot of the session's connection/position state, per
//! spec §4.7 (`ExtStateIface` in `original_source/Slave.h`).

use std::sync::Mutex;
use std::time::SystemTime;

use crate::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Registered,
    Dumping,
    Reading,
    Reconnecting,
}

struct Inner {
    connect_time: Option<SystemTime>,
    connect_count: u64,
    last_filtered_update: Option<SystemTime>,
    last_event_time: Option<SystemTime>,
    last_update: Option<SystemTime>,
    intransaction_pos: u64,
    position: Position,
    state_processing: ConnectionState,
}

impl Default for Inner {
    fn default() -> Self {
        Inner {
            connect_time: None,
            connect_count: 0,
            last_filtered_update: None,
            last_event_time: None,
            last_update: None,
            intransaction_pos: 0,
            position: Position::new(),
            state_processing: ConnectionState::Disconnected,
        }
    }
}

/// Guarded independently of [`crate::stats::StatsObserver`]; every getter
/// and setter holds the mutex only for the scalar copy/update (§5).
pub struct StateObserver {
    inner: Mutex<Inner>,
}

impl StateObserver {
    pub fn new() -> Self {
        StateObserver {
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn set_connecting(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state_processing = ConnectionState::Connecting;
    }

    pub fn set_connected(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state_processing = ConnectionState::Registered;
        inner.connect_time = Some(SystemTime::now());
        inner.connect_count += 1;
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.inner.lock().unwrap().state_processing = state;
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().unwrap().state_processing
    }

    pub fn connect_count(&self) -> u64 {
        self.inner.lock().unwrap().connect_count
    }

    /// Sets `last_event_time`/`intransaction_pos` and touches `last_update`.
    pub fn set_last_event_time_pos(&self, t: SystemTime, pos: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.last_event_time = Some(t);
        inner.intransaction_pos = pos;
        inner.last_update = Some(t);
    }

    /// Also sets `intransaction_pos = p.log_pos`.
    pub fn set_master_position(&self, p: Position) {
        let mut inner = self.inner.lock().unwrap();
        inner.intransaction_pos = p.log_pos;
        inner.position = p;
        inner.last_update = Some(SystemTime::now());
    }

    pub fn position(&self) -> Position {
        self.inner.lock().unwrap().position.clone()
    }

    pub fn set_last_filtered_update(&self) {
        self.inner.lock().unwrap().last_filtered_update = Some(SystemTime::now());
    }

    pub fn intransaction_pos(&self) -> u64 {
        self.inner.lock().unwrap().intransaction_pos
    }
}

impl Default for StateObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_master_position_updates_intransaction_pos() {
        let obs = StateObserver::new();
        let mut pos = Position::new();
        pos.log_name = "mysql-bin.000001".to_owned();
        pos.log_pos = 1234;
        obs.set_master_position(pos);
        assert_eq!(obs.intransaction_pos(), 1234);
        assert_eq!(obs.position().log_pos, 1234);
    }

    #[test]
    fn connect_tracks_count() {
        let obs = StateObserver::new();
        obs.set_connecting();
        assert_eq!(obs.state(), ConnectionState::Connecting);
        obs.set_connected();
        obs.set_connected();
        assert_eq!(obs.connect_count(), 2);
    }
}

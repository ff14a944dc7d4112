//! Forward/back view history (§4.10), persisted through the external KV
//! store.

use crate::kv_store::{get_json, set_json, KvStore};
use crate::model::TxMeta;
use serde::{Deserialize, Serialize};

pub const HISTORY_KEY: &str = "roam_history_v1";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HistoryState {
    index: i64,
    items: Vec<TxMeta>,
}

pub struct History {
    state: HistoryState,
}

impl History {
    pub fn new() -> Self {
        Self {
            state: HistoryState {
                index: -1,
                items: Vec::new(),
            },
        }
    }

    pub async fn load(store: &dyn KvStore) -> Self {
        let state = get_json(store, HISTORY_KEY).await.unwrap_or_default();
        Self { state }
    }

    pub async fn save(&self, store: &dyn KvStore) {
        set_json(store, HISTORY_KEY, &self.state).await;
    }

    /// Truncate any forward history past the current index, append `tx`, and
    /// advance to it.
    pub fn add(&mut self, tx: TxMeta) {
        let next_index = (self.state.index + 1) as usize;
        self.state.items.truncate(next_index);
        self.state.items.push(tx);
        self.state.index = self.state.items.len() as i64 - 1;
    }

    pub fn can_go_back(&self) -> bool {
        self.state.index > 0
    }

    pub fn back(&mut self) -> Option<&TxMeta> {
        if !self.can_go_back() {
            return None;
        }
        self.state.index -= 1;
        self.current()
    }

    pub fn can_go_forward(&self) -> bool {
        self.state.index + 1 < self.state.items.len() as i64
    }

    pub fn forward(&mut self) -> Option<&TxMeta> {
        if !self.can_go_forward() {
            return None;
        }
        self.state.index += 1;
        self.current()
    }

    pub fn peek_forward(&self) -> Option<&TxMeta> {
        if !self.can_go_forward() {
            return None;
        }
        self.state.items.get((self.state.index + 1) as usize)
    }

    pub fn current(&self) -> Option<&TxMeta> {
        if self.state.index < 0 {
            return None;
        }
        self.state.items.get(self.state.index as usize)
    }

    pub fn reset(&mut self) {
        self.state.index = -1;
        self.state.items.clear();
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::InMemoryKvStore;

    fn tx(id: &str) -> TxMeta {
        TxMeta::arns_placeholder(id.to_string())
    }

    #[test]
    fn add_truncates_forward_history() {
        let mut history = History::new();
        history.add(tx("a"));
        history.add(tx("b"));
        history.back();
        history.add(tx("c"));
        assert_eq!(history.current().unwrap().arns_name.as_deref(), Some("c"));
        assert!(!history.can_go_forward());
    }

    #[test]
    fn back_and_forward_move_the_index() {
        let mut history = History::new();
        history.add(tx("a"));
        history.add(tx("b"));
        assert_eq!(history.back().unwrap().arns_name.as_deref(), Some("a"));
        assert_eq!(history.forward().unwrap().arns_name.as_deref(), Some("b"));
    }

    #[test]
    fn back_on_empty_history_is_none() {
        let mut history = History::new();
        assert!(history.back().is_none());
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let store = InMemoryKvStore::new();
        let mut history = History::new();
        history.add(tx("a"));
        history.save(&store).await;

        let loaded = History::load(&store).await;
        assert_eq!(loaded.current().unwrap().arns_name.as_deref(), Some("a"));
    }
}

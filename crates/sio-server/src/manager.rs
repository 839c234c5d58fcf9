use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use sio_protocol::Value;

use crate::error::Error;

/// A pending outgoing ack callback, invoked once with the args the peer
/// replied with, then discarded.
pub type AckCallback = Box<dyn FnOnce(Vec<Value>) + Send + 'static>;

/// The collaborator the manager hands emissions off to (§9, "Cyclic
/// reference client<->manager<->server"). Rather than the manager holding a
/// back-reference to its host, the host is passed in on every call that
/// needs it — this sidesteps the ownership cycle entirely, which is the
/// idiomatic way to avoid it in Rust (see DESIGN.md).
#[async_trait]
pub trait EmitSink: Send + Sync {
    async fn emit_internal(
        &self,
        sid: &str,
        event: &str,
        data: Vec<Value>,
        namespace: &str,
        id: Option<u64>,
    ) -> Result<(), Error>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RoomKey {
    /// The sentinel room every connected sid of a namespace belongs to;
    /// the target of a `room=None` emit.
    Broadcast,
    Named(String),
}

#[derive(Default)]
struct NamespaceState {
    rooms: HashMap<RoomKey, HashSet<String>>,
    callbacks: HashMap<String, HashMap<u64, AckCallback>>,
    next_ack_id: HashMap<String, u64>,
    pending_disconnect: HashSet<String>,
}

/// The per-process table of namespace/room/session membership and pending
/// acks (§4.2). Subclassable in spirit: swap the `EmitSink` a caller passes
/// to [`Manager::emit`] for one that forwards over a message bus to support
/// horizontally scaled deployments (§9, "Pluggable manager").
#[derive(Default)]
pub struct Manager {
    namespaces: RwLock<HashMap<String, Mutex<NamespaceState>>>,
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: join the broadcast room and the personal room named
    /// after `sid`.
    pub fn connect(&self, sid: &str, ns: &str) {
        let mut table = self.namespaces.write().unwrap();
        let state = table.entry(ns.to_string()).or_default();
        let mut state = state.lock().unwrap();
        state.rooms.entry(RoomKey::Broadcast).or_default().insert(sid.to_string());
        state
            .rooms
            .entry(RoomKey::Named(sid.to_string()))
            .or_default()
            .insert(sid.to_string());
        state.pending_disconnect.remove(sid);
    }

    pub fn is_connected(&self, sid: &str, ns: &str) -> bool {
        let table = self.namespaces.read().unwrap();
        let Some(state) = table.get(ns) else {
            return false;
        };
        let state = state.lock().unwrap();
        !state.pending_disconnect.contains(sid)
            && state
                .rooms
                .get(&RoomKey::Broadcast)
                .is_some_and(|members| members.contains(sid))
    }

    /// Mark `sid` as pending-disconnect: `is_connected` now reports false,
    /// but ack callbacks targeting `sid` still resolve normally. Returns the
    /// ack ids that were outstanding.
    pub fn pre_disconnect(&self, sid: &str, ns: &str) -> HashSet<u64> {
        let table = self.namespaces.read().unwrap();
        let Some(state) = table.get(ns) else {
            return HashSet::new();
        };
        let mut state = state.lock().unwrap();
        state.pending_disconnect.insert(sid.to_string());
        state
            .callbacks
            .get(sid)
            .map(|pending| pending.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Full removal from every room of `ns`, pruning empty rooms and the
    /// namespace itself if it becomes empty; clears pending acks scoped to
    /// `(sid, ns)`. A no-op if `sid` is already fully disconnected.
    pub fn disconnect(&self, sid: &str, ns: &str) {
        let mut table = self.namespaces.write().unwrap();
        let remove_namespace = match table.get(ns) {
            Some(state) => {
                let mut state = state.lock().unwrap();
                state.rooms.retain(|_, members| {
                    members.remove(sid);
                    !members.is_empty()
                });
                state.callbacks.remove(sid);
                state.next_ack_id.remove(sid);
                state.pending_disconnect.remove(sid);
                state.rooms.is_empty()
            }
            None => false,
        };
        if remove_namespace {
            table.remove(ns);
        }
    }

    /// No-op if `sid` is not connected to `ns`.
    pub fn enter_room(&self, sid: &str, ns: &str, room: &str) {
        let table = self.namespaces.read().unwrap();
        if let Some(state) = table.get(ns) {
            state
                .lock()
                .unwrap()
                .rooms
                .entry(RoomKey::Named(room.to_string()))
                .or_default()
                .insert(sid.to_string());
        }
    }

    /// Leaving a room that does not exist is silent.
    pub fn leave_room(&self, sid: &str, ns: &str, room: &str) {
        let table = self.namespaces.read().unwrap();
        if let Some(state) = table.get(ns) {
            if let Some(members) = state.lock().unwrap().rooms.get_mut(&RoomKey::Named(room.to_string())) {
                members.remove(sid);
            }
        }
    }

    /// Remove a room and every member reference to it. Idempotent.
    pub fn close_room(&self, ns: &str, room: &str) {
        let table = self.namespaces.read().unwrap();
        if let Some(state) = table.get(ns) {
            state.lock().unwrap().rooms.remove(&RoomKey::Named(room.to_string()));
        }
    }

    /// Named rooms (including the personal room) that `sid` belongs to in
    /// `ns`, sorted for determinism.
    pub fn get_rooms(&self, sid: &str, ns: &str) -> Vec<String> {
        let table = self.namespaces.read().unwrap();
        let Some(state) = table.get(ns) else {
            return Vec::new();
        };
        let state = state.lock().unwrap();
        let mut rooms: Vec<String> = state
            .rooms
            .iter()
            .filter_map(|(key, members)| match key {
                RoomKey::Named(name) if members.contains(sid) => Some(name.clone()),
                _ => None,
            })
            .collect();
        rooms.sort();
        rooms
    }

    /// Members of `room` (or the broadcast room when `room` is `None`),
    /// skipping any sid currently pending disconnect.
    pub fn get_participants(&self, ns: &str, room: Option<&str>) -> Vec<String> {
        let table = self.namespaces.read().unwrap();
        let Some(state) = table.get(ns) else {
            return Vec::new();
        };
        let state = state.lock().unwrap();
        let key = match room {
            Some(name) => RoomKey::Named(name.to_string()),
            None => RoomKey::Broadcast,
        };
        state
            .rooms
            .get(&key)
            .map(|members| {
                members
                    .iter()
                    .filter(|sid| !state.pending_disconnect.contains(*sid))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_namespaces(&self) -> Vec<String> {
        let table = self.namespaces.read().unwrap();
        let mut namespaces: Vec<String> = table.keys().cloned().collect();
        namespaces.sort();
        namespaces
    }

    /// Strictly monotonic per `(sid, ns)`, starting at 1; registers `cb` to
    /// be resolved by [`Manager::trigger_callback`].
    pub fn generate_ack_id(&self, sid: &str, ns: &str, cb: AckCallback) -> u64 {
        let mut table = self.namespaces.write().unwrap();
        let state = table.entry(ns.to_string()).or_default();
        let mut state = state.lock().unwrap();
        let counter = state.next_ack_id.entry(sid.to_string()).or_insert(0);
        *counter += 1;
        let id = *counter;
        state.callbacks.entry(sid.to_string()).or_default().insert(id, cb);
        id
    }

    /// Invoke and discard the pending callback for `id`. Silent if `sid`,
    /// `ns` or `id` is unknown.
    pub fn trigger_callback(&self, sid: &str, ns: &str, id: u64, args: Vec<Value>) {
        let table = self.namespaces.read().unwrap();
        let Some(state) = table.get(ns) else { return };
        let callback = {
            let mut state = state.lock().unwrap();
            state.callbacks.get_mut(sid).and_then(|pending| pending.remove(&id))
        };
        if let Some(callback) = callback {
            callback(args);
        }
    }

    /// Room-scoped fanout (§4.2 "Emit semantics"). `room = None` targets
    /// every member of the broadcast room except `skip_sid`; `room =
    /// Some(label)` targets that room directly (which may be a personal
    /// room, giving single-recipient delivery). `callback` is only valid
    /// when exactly one target is selected.
    pub async fn emit(
        &self,
        host: &dyn EmitSink,
        event: &str,
        data: Vec<Value>,
        ns: &str,
        room: Option<&str>,
        skip_sid: &[String],
        callback: Option<AckCallback>,
    ) -> Result<(), Error> {
        let targets: Vec<String> = self
            .get_participants(ns, room)
            .into_iter()
            .filter(|sid| !skip_sid.iter().any(|skip| skip == sid))
            .collect();

        if callback.is_some() && targets.len() != 1 {
            return Err(Error::AckOnBroadcast);
        }

        let ack_id = match callback {
            Some(cb) => Some(self.generate_ack_id(&targets[0], ns, cb)),
            None => None,
        };

        let mut first_err = None;
        for sid in &targets {
            if let Err(err) = host.emit_internal(sid, event, data.clone(), ns, ack_id).await {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};

    use super::*;

    /// Records every `emit_internal` call it receives, for asserting on
    /// fanout targets without a real `Server`.
    #[derive(Default)]
    struct RecordingSink {
        calls: StdMutex<Vec<(String, Option<u64>)>>,
    }

    #[async_trait]
    impl EmitSink for RecordingSink {
        async fn emit_internal(
            &self,
            sid: &str,
            _event: &str,
            _data: Vec<Value>,
            _namespace: &str,
            id: Option<u64>,
        ) -> Result<(), Error> {
            self.calls.lock().unwrap().push((sid.to_string(), id));
            Ok(())
        }
    }

    fn sids(sink: &RecordingSink) -> Vec<String> {
        let mut v: Vec<String> = sink.calls.lock().unwrap().iter().map(|(sid, _)| sid.clone()).collect();
        v.sort();
        v
    }

    #[test]
    fn connect_joins_broadcast_and_personal_room() {
        let m = Manager::new();
        m.connect("123", "/foo");
        let mut rooms = m.get_rooms("123", "/foo");
        rooms.sort();
        assert_eq!(rooms, vec!["123".to_string()]);
        assert!(m.is_connected("123", "/foo"));
        assert_eq!(m.get_participants("/foo", None), vec!["123".to_string()]);
    }

    #[test]
    fn pre_disconnect_hides_membership_but_not_callbacks() {
        let m = Manager::new();
        m.connect("123", "/foo");
        m.connect("456", "/foo");
        let outstanding = m.pre_disconnect("123", "/foo");
        assert!(outstanding.is_empty());
        assert!(!m.is_connected("123", "/foo"));
        assert!(m.is_connected("456", "/foo"));
        assert_eq!(m.get_participants("/foo", None), vec!["456".to_string()]);
    }

    #[test]
    fn disconnect_removes_sid_from_every_room_and_prunes_empty_namespace() {
        let m = Manager::new();
        m.connect("123", "/foo");
        m.connect("456", "/foo");
        m.enter_room("123", "/foo", "bar");
        m.enter_room("456", "/foo", "baz");
        m.disconnect("123", "/foo");

        assert!(!m.get_rooms("123", "/foo").contains(&"bar".to_string()));
        assert_eq!(m.get_participants("/foo", None), vec!["456".to_string()]);
        assert_eq!(m.get_participants("/foo", Some("baz")), vec!["456".to_string()]);

        m.disconnect("456", "/foo");
        assert!(!m.get_namespaces().contains(&"/foo".to_string()));
    }

    #[test]
    fn disconnect_is_idempotent() {
        let m = Manager::new();
        m.connect("123", "/");
        m.disconnect("123", "/");
        m.disconnect("123", "/"); // must not panic
        assert!(!m.is_connected("123", "/"));
    }

    #[test]
    fn disconnect_from_one_namespace_does_not_affect_another() {
        let m = Manager::new();
        m.connect("123", "/");
        m.connect("123", "/foo");
        m.disconnect("123", "/");
        assert!(!m.is_connected("123", "/"));
        assert!(m.is_connected("123", "/foo"));
    }

    #[test]
    fn leaving_an_absent_room_is_a_silent_no_op() {
        let m = Manager::new();
        m.connect("123", "/foo");
        m.leave_room("123", "/foo", "baz"); // must not panic
        m.leave_room("123", "/bar", "baz"); // unknown namespace too
    }

    #[test]
    fn close_room_removes_the_room_and_every_member_reference() {
        let m = Manager::new();
        m.connect("123", "/foo");
        m.enter_room("123", "/foo", "bar");
        m.close_room("/foo", "bar");
        assert!(!m.get_rooms("123", "/foo").contains(&"bar".to_string()));
        m.close_room("/foo", "bar"); // idempotent
        m.close_room("/missing", "bar"); // unknown namespace is silent
    }

    #[test]
    fn ack_ids_are_strictly_monotonic_per_sid_namespace_pair() {
        let m = Manager::new();
        let id1 = m.generate_ack_id("A", "/foo", Box::new(|_| {}));
        let id2 = m.generate_ack_id("A", "/foo", Box::new(|_| {}));
        let id3 = m.generate_ack_id("A", "/bar", Box::new(|_| {}));
        assert_eq!(id1, 1);
        assert_eq!(id2, 2);
        // a distinct (sid, ns) pair starts its own counter at 1.
        assert_eq!(id3, 1);
    }

    #[test]
    fn trigger_callback_invokes_once_and_discards() {
        let m = Manager::new();
        let calls: Arc<StdMutex<Vec<Vec<Value>>>> = Arc::new(StdMutex::new(Vec::new()));
        let calls_clone = Arc::clone(&calls);
        let id = m.generate_ack_id(
            "A",
            "/foo",
            Box::new(move |args| calls_clone.lock().unwrap().push(args)),
        );
        m.trigger_callback("A", "/foo", id, vec![Value::String("x".to_string())]);
        // second call with the same id is a silent no-op: already discarded.
        m.trigger_callback("A", "/foo", id, vec![Value::String("y".to_string())]);
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(calls.lock().unwrap()[0], vec![Value::String("x".to_string())]);
    }

    #[test]
    fn trigger_callback_is_silent_on_unknown_sid_ns_or_id() {
        let m = Manager::new();
        let id = m.generate_ack_id("A", "/", Box::new(|_| {}));
        m.trigger_callback("not-a-sid", "/", id, vec![]);
        m.trigger_callback("A", "/not-a-ns", id, vec![]);
        m.trigger_callback("A", "/", id + 1, vec![]);
    }

    #[tokio::test]
    async fn emit_to_room_targets_exactly_its_members() {
        // §8 scenario 1: three sids connect to /foo, two enter room bar;
        // emitting to bar reaches exactly those two.
        let m = Manager::new();
        m.connect("1", "/foo");
        m.connect("2", "/foo");
        m.connect("3", "/foo");
        m.enter_room("1", "/foo", "bar");
        m.enter_room("2", "/foo", "bar");

        let sink = RecordingSink::default();
        m.emit(&sink, "e", vec![], "/foo", Some("bar"), &[], None).await.unwrap();
        assert_eq!(sids(&sink), vec!["1".to_string(), "2".to_string()]);
    }

    #[tokio::test]
    async fn emit_broadcast_skips_listed_sids() {
        let m = Manager::new();
        m.connect("1", "/foo");
        m.connect("2", "/foo");
        m.connect("3", "/foo");

        let sink = RecordingSink::default();
        m.emit(&sink, "e", vec![], "/foo", None, &["2".to_string()], None).await.unwrap();
        assert_eq!(sids(&sink), vec!["1".to_string(), "3".to_string()]);
    }

    #[tokio::test]
    async fn emit_with_callback_requires_single_recipient() {
        let m = Manager::new();
        m.connect("1", "/foo");
        m.connect("2", "/foo");

        let sink = RecordingSink::default();
        let err = m
            .emit(&sink, "e", vec![], "/foo", None, &[], Some(Box::new(|_| {})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AckOnBroadcast));
    }

    #[tokio::test]
    async fn emit_with_callback_to_a_single_sid_allocates_an_ack_id() {
        let m = Manager::new();
        m.connect("1", "/foo");

        let sink = RecordingSink::default();
        m.emit(&sink, "e", vec![], "/foo", Some("1"), &[], Some(Box::new(|_| {})))
            .await
            .unwrap();
        assert_eq!(sink.calls.lock().unwrap()[0], ("1".to_string(), Some(1)));
    }

    #[tokio::test]
    async fn emit_to_an_unknown_room_or_namespace_is_a_no_op() {
        let m = Manager::new();
        let sink = RecordingSink::default();
        m.emit(&sink, "e", vec![], "/", Some("123"), &[], None).await.unwrap();
        assert!(sink.calls.lock().unwrap().is_empty());
    }
}

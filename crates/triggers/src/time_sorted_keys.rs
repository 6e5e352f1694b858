//! Bi-directional index between group keys and their scheduled fire times.

use weir_core::{GroupKey, Timestamp};
use weir_state::{StateError, Transaction};

// Persisted layout under the trigger's transaction scope. Values under the
// key index are be_u64 nanoseconds; time-index values are empty.
const KEY_TO_TIME: &[u8] = b"tsk/k2t/";
const TIME_TO_KEY: &[u8] = b"tsk/t2k/";

/// Two persisted maps kept in lockstep: `key -> send_time` and
/// `(send_time, key) -> ()`.
///
/// The time index encodes entries as `be_u64(nanos) || encoded_group_key`, so
/// a plain ascending byte scan visits entries in `(send_time, key)` order.
/// Invariant: every entry in one index has exactly one counterpart in the
/// other, with the same time.
pub struct TimeSortedKeys<'a, T: Transaction + ?Sized> {
    tx: &'a mut T,
}

impl<'a, T: Transaction + ?Sized> TimeSortedKeys<'a, T> {
    pub fn new(tx: &'a mut T) -> Self {
        Self { tx }
    }

    /// Schedules (or reschedules) `key` to fire at `new_time`. A previous
    /// schedule for the same key is removed first, so each key has exactly
    /// one entry in the time index.
    pub fn update(&mut self, key: &GroupKey, new_time: Timestamp) -> Result<(), StateError> {
        let key_bytes = key.encode();
        let k2t = join(KEY_TO_TIME, &key_bytes);

        match self.tx.get(&k2t) {
            Ok(prev) => {
                let prev_time = decode_time(&prev)?;
                self.tx.delete(&time_index_entry(prev_time, &key_bytes))?;
            }
            Err(StateError::NotFound) => {}
            Err(e) => return Err(e),
        }

        self.tx.set(&time_index_entry(new_time, &key_bytes), b"")?;
        self.tx.set(&k2t, &new_time.to_be_bytes())?;
        Ok(())
    }

    /// All scheduled keys with `send_time <= until`, in ascending
    /// `(send_time, key)` order. The two returned vectors have equal length.
    ///
    /// The scan terminates at the first entry past `until`, so the cost is
    /// proportional to the output, not to the index size.
    pub fn get_until(
        &mut self,
        until: Timestamp,
    ) -> Result<(Vec<GroupKey>, Vec<Timestamp>), StateError> {
        let mut keys = Vec::new();
        let mut times = Vec::new();

        let mut cursor = self.tx.iterate(TIME_TO_KEY, None)?;
        while let Some((entry, _)) = cursor.next()? {
            let Some(rest) = entry.as_ref().strip_prefix(TIME_TO_KEY) else {
                break; // scanned past the time index
            };
            if rest.len() < 8 {
                return Err(StateError::Corrupt(format!(
                    "time index entry too short: {} bytes",
                    rest.len()
                )));
            }
            let (time_bytes, key_bytes) = rest.split_at(8);
            let time = decode_time(time_bytes)?;
            if time > until {
                break;
            }
            let key = GroupKey::decode(key_bytes).map_err(|e| {
                StateError::Corrupt(format!("undecodable group key in time index: {}", e))
            })?;
            keys.push(key);
            times.push(time);
        }
        cursor.close()?;

        Ok((keys, times))
    }

    /// Removes the schedule for `key` at `time` from both indexes. Quietly
    /// does nothing if the entries are already gone.
    pub fn delete(&mut self, key: &GroupKey, time: Timestamp) -> Result<(), StateError> {
        let key_bytes = key.encode();
        self.tx.delete(&time_index_entry(time, &key_bytes))?;
        self.tx.delete(&join(KEY_TO_TIME, &key_bytes))?;
        Ok(())
    }

    /// Looks up the key's scheduled time and removes both entries. Returns
    /// [`StateError::NotFound`] when the key has no schedule; callers that
    /// tolerate concurrent removal ignore that case.
    pub fn delete_by_key(&mut self, key: &GroupKey) -> Result<(), StateError> {
        let key_bytes = key.encode();
        let stored = self.tx.get(&join(KEY_TO_TIME, &key_bytes))?;
        let time = decode_time(&stored)?;
        self.delete(key, time)
    }
}

fn join(prefix: &[u8], key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + key.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(key);
    out
}

fn time_index_entry(time: Timestamp, key_bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(TIME_TO_KEY.len() + 8 + key_bytes.len());
    out.extend_from_slice(TIME_TO_KEY);
    out.extend_from_slice(&time.to_be_bytes());
    out.extend_from_slice(key_bytes);
    out
}

fn decode_time(bytes: &[u8]) -> Result<Timestamp, StateError> {
    let arr: [u8; 8] = bytes.try_into().map_err(|_| {
        StateError::Corrupt(format!("send time must be 8 bytes, got {}", bytes.len()))
    })?;
    Ok(Timestamp::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use weir_core::Value;
    use weir_state::{Commit, MemoryStore, Store};

    fn key(name: &str) -> GroupKey {
        GroupKey::new(vec![Value::Str(name.into())])
    }

    /// Reads both indexes back and checks they describe the same schedule.
    fn assert_consistent(tx: &mut impl Transaction) -> Vec<(GroupKey, Timestamp)> {
        let mut by_key = Vec::new();
        let mut cursor = tx.iterate(KEY_TO_TIME, None).unwrap();
        while let Some((entry, value)) = cursor.next().unwrap() {
            let Some(key_bytes) = entry.as_ref().strip_prefix(KEY_TO_TIME) else {
                break;
            };
            by_key.push((
                GroupKey::decode(key_bytes).unwrap(),
                decode_time(&value).unwrap(),
            ));
        }
        drop(cursor);

        let mut index = TimeSortedKeys::new(tx);
        let (keys, times) = index.get_until(Timestamp::MAX).unwrap();
        let mut by_time: Vec<(GroupKey, Timestamp)> =
            keys.into_iter().zip(times).collect();

        by_key.sort();
        by_time.sort();
        assert_eq!(by_key, by_time);
        by_time
    }

    #[test]
    fn test_update_and_get_until() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        let mut index = TimeSortedKeys::new(&mut tx);

        index.update(&key("b"), 20).unwrap();
        index.update(&key("a"), 20).unwrap();
        index.update(&key("c"), 10).unwrap();

        let (keys, times) = index.get_until(20).unwrap();
        assert_eq!(keys, vec![key("c"), key("a"), key("b")]);
        assert_eq!(times, vec![10, 20, 20]);

        let (keys, times) = index.get_until(15).unwrap();
        assert_eq!(keys, vec![key("c")]);
        assert_eq!(times, vec![10]);

        let (keys, _) = index.get_until(9).unwrap();
        assert!(keys.is_empty());
    }

    #[test]
    fn test_update_moves_schedule() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        {
            let mut index = TimeSortedKeys::new(&mut tx);
            index.update(&key("a"), 10).unwrap();
            index.update(&key("a"), 30).unwrap();

            let (keys, _) = index.get_until(10).unwrap();
            assert!(keys.is_empty(), "old schedule must be gone");
            let (keys, times) = index.get_until(30).unwrap();
            assert_eq!(keys, vec![key("a")]);
            assert_eq!(times, vec![30]);
        }
        let entries = assert_consistent(&mut tx);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_delete_by_key() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        {
            let mut index = TimeSortedKeys::new(&mut tx);
            index.update(&key("a"), 10).unwrap();
            index.delete_by_key(&key("a")).unwrap();
            assert!(index.delete_by_key(&key("a")).unwrap_err().is_not_found());
        }
        assert!(assert_consistent(&mut tx).is_empty());
    }

    #[test]
    fn test_delete_quiet_when_absent() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        let mut index = TimeSortedKeys::new(&mut tx);
        index.delete(&key("ghost"), 42).unwrap();
    }

    #[test]
    fn test_survives_commit() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        TimeSortedKeys::new(&mut tx)
            .update(&key("a"), 10)
            .unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin().unwrap();
        let (keys, _) = TimeSortedKeys::new(&mut tx).get_until(10).unwrap();
        assert_eq!(keys, vec![key("a")]);
    }
}

use crate::api::{ApiError, ApiGateway, HttpTransport};
use crate::types::HistoryOp;
use chrono::NaiveDateTime;
use serde_json::json;

const CHUNK_SIZE: u64 = 1000;
/// Operation filter bitmask selecting custom_json operations.
const CUSTOM_JSON_FILTER: u64 = 1 << 18;

/// Walks an account's operation history backward in fixed-size chunks,
/// bounded by a rolling time window.
pub struct HistoryScanner<'a, T: HttpTransport> {
    gateway: &'a ApiGateway<T>,
}

impl<'a, T: HttpTransport> HistoryScanner<'a, T> {
    pub fn new(gateway: &'a ApiGateway<T>) -> Self {
        Self { gateway }
    }

    /// Count the operations matching `predicate` in `account`'s recent
    /// custom_json history. Chunks are fetched newest-first (start `-1`,
    /// then the oldest sequence number seen); every operation of a fetched
    /// chunk is considered, including the part already past the window.
    /// Pagination stops once the oldest operation of a chunk predates
    /// `window_start`, once a chunk comes back empty (history exhausted),
    /// or once a chunk is shorter than requested (no older history left).
    pub fn scan_recent_ops<F>(
        &self,
        account: &str,
        window_start: NaiveDateTime,
        mut predicate: F,
    ) -> Result<u64, ApiError>
    where
        F: FnMut(&HistoryOp) -> bool,
    {
        let mut matches = 0u64;
        let mut start: i64 = -1;
        loop {
            let chunk = self.gateway.call_or_empty(
                "condenser_api.get_account_history",
                json!([account, start, CHUNK_SIZE, CUSTOM_JSON_FILTER]),
            )?;
            if chunk.is_empty() {
                log::debug!("history exhausted for {account}");
                return Ok(matches);
            }

            let decoded: Vec<HistoryOp> = chunk
                .iter()
                .filter_map(|raw| {
                    let op = HistoryOp::decode(raw);
                    if op.is_none() {
                        log::debug!("skipping malformed history entry for {account}");
                    }
                    op
                })
                .collect();
            // Nothing decodable left to page on.
            let Some(oldest) = decoded.first() else {
                return Ok(matches);
            };
            let oldest_sequence = oldest.sequence;
            let oldest_timestamp = oldest.timestamp;

            for op in &decoded {
                if predicate(op) {
                    matches += 1;
                }
            }

            if oldest_timestamp < window_start {
                return Ok(matches);
            }
            if (chunk.len() as u64) < CHUNK_SIZE {
                log::debug!("reached the beginning of {account}'s history");
                return Ok(matches);
            }
            start = oldest_sequence as i64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::ScriptedTransport;
    use crate::types::parse_timestamp;
    use serde_json::{json, Value};

    const HISTORY: &str = "condenser_api.get_account_history";

    /// Build a descending-page chunk: `len` ops starting at `first_seq`,
    /// all stamped `timestamp`, with `poll_votes` of them carrying the
    /// matching custom_json id.
    fn chunk(first_seq: u64, len: u64, timestamp: &str, poll_votes: u64) -> Value {
        let ops: Vec<Value> = (0..len)
            .map(|i| {
                let id = if i < poll_votes { "community-poll" } else { "other-app" };
                json!([
                    first_seq + i,
                    {
                        "timestamp": timestamp,
                        "op": ["custom_json", {"id": id, "json": "{}"}]
                    }
                ])
            })
            .collect();
        Value::Array(ops)
    }

    fn gateway_for(transport: &ScriptedTransport) -> ApiGateway<&ScriptedTransport> {
        ApiGateway::new(vec!["https://node.example".to_string()], transport)
    }

    #[test]
    fn test_stops_at_the_chunk_crossing_the_window() {
        let transport = ScriptedTransport::new();
        transport.push_result(HISTORY, &chunk(3000, 1000, "2025-08-24T10:00:00", 2));
        transport.push_result(HISTORY, &chunk(2000, 1000, "2025-08-22T10:00:00", 1));
        // Oldest op of the third chunk predates the window; its matches
        // still count, a fourth chunk is never requested.
        transport.push_result(HISTORY, &chunk(1000, 1000, "2025-08-10T10:00:00", 3));
        transport.push_result(HISTORY, &chunk(0, 1000, "2025-08-01T10:00:00", 7));

        let gateway = gateway_for(&transport);
        let scanner = HistoryScanner::new(&gateway);
        let window_start = parse_timestamp("2025-08-18T00:00:00").unwrap();
        let matches = scanner
            .scan_recent_ops("arc7icwolf", window_start, |op| {
                op.custom_json_id() == Some("community-poll")
            })
            .unwrap();

        assert_eq!(matches, 6);
        assert_eq!(transport.calls_for(HISTORY), 3);
    }

    #[test]
    fn test_empty_chunk_terminates_scan() {
        let transport = ScriptedTransport::new();
        transport.push_result(HISTORY, &chunk(2000, 1000, "2025-08-24T10:00:00", 2));
        // Second page comes back empty: history exhausted, not an error.

        let gateway = gateway_for(&transport);
        let scanner = HistoryScanner::new(&gateway);
        let window_start = parse_timestamp("2025-08-01T00:00:00").unwrap();
        let matches = scanner
            .scan_recent_ops("will91", window_start, |op| {
                op.custom_json_id() == Some("community-poll")
            })
            .unwrap();

        assert_eq!(matches, 2);
    }

    #[test]
    fn test_short_chunk_means_no_older_history() {
        let transport = ScriptedTransport::new();
        transport.push_result(HISTORY, &chunk(0, 40, "2025-08-24T10:00:00", 5));

        let gateway = gateway_for(&transport);
        let scanner = HistoryScanner::new(&gateway);
        let window_start = parse_timestamp("2025-08-01T00:00:00").unwrap();
        let matches = scanner
            .scan_recent_ops("lozio71", window_start, |op| {
                op.custom_json_id() == Some("community-poll")
            })
            .unwrap();

        assert_eq!(matches, 5);
        assert_eq!(transport.calls_for(HISTORY), 1);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let transport = ScriptedTransport::new();
        let mut ops = chunk(100, 3, "2025-08-24T10:00:00", 1);
        ops.as_array_mut()
            .unwrap()
            .push(json!({"unexpected": "shape"}));
        transport.push_result(HISTORY, &ops);

        let gateway = gateway_for(&transport);
        let scanner = HistoryScanner::new(&gateway);
        let window_start = parse_timestamp("2025-08-01T00:00:00").unwrap();
        let matches = scanner
            .scan_recent_ops("harbiter", window_start, |op| {
                op.custom_json_id() == Some("community-poll")
            })
            .unwrap();

        assert_eq!(matches, 1);
    }
}

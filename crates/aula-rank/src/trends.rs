use std::collections::BTreeMap;

use aula_core::{AggregatedQuery, RawQueryEvent, RawSearchRecord, TrendCount};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::RankError;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Validated events plus the number of rows that were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedHistory {
    pub events: Vec<RawQueryEvent>,
    pub skipped: usize,
}

/// `exp(-lambda * days)`, with events in the future treated as age 0.
pub fn decay_weight(timestamp: DateTime<Utc>, now: DateTime<Utc>, lambda: f64) -> f64 {
    let age_days = (now - timestamp).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY;
    (-lambda * age_days.max(0.0)).exp()
}

/// Groups events by their literal query text. Blank queries are dropped.
/// Output is ordered by query text.
pub fn aggregate(events: &[RawQueryEvent], lambda: f64, now: DateTime<Utc>) -> Vec<AggregatedQuery> {
    let mut groups = BTreeMap::<&str, Vec<DateTime<Utc>>>::new();
    for event in events {
        if event.query.trim().is_empty() {
            continue;
        }
        groups
            .entry(event.query.as_str())
            .or_default()
            .push(event.timestamp);
    }

    groups
        .into_iter()
        .map(|(query, mut timestamps)| {
            timestamps.sort();
            let weight = timestamps
                .iter()
                .map(|timestamp| decay_weight(*timestamp, now, lambda))
                .sum::<f64>();
            let raw_count = timestamps.len() as u64;
            AggregatedQuery::new(query, timestamps, raw_count, weight)
        })
        .collect()
}

/// Aggregates pre-counted rows that carry no timestamps: `weight = count * factor`.
pub fn aggregate_counts(counts: &[TrendCount], count_only_weight: f64) -> Vec<AggregatedQuery> {
    let mut totals = BTreeMap::<&str, u64>::new();
    for row in counts {
        if row.query.trim().is_empty() {
            continue;
        }
        *totals.entry(row.query.as_str()).or_default() += row.count;
    }

    totals
        .into_iter()
        .map(|(query, count)| {
            AggregatedQuery::with_weight(query, count, count as f64 * count_only_weight)
        })
        .collect()
}

pub fn parse_search_record(
    index: usize,
    record: &RawSearchRecord,
) -> Result<RawQueryEvent, RankError> {
    let malformed = |reason: &str| RankError::MalformedRecord {
        index,
        reason: reason.to_owned(),
    };

    let query = record
        .query
        .as_deref()
        .filter(|query| !query.trim().is_empty())
        .ok_or_else(|| malformed("missing query text"))?;
    let raw_timestamp = record
        .timestamp
        .as_deref()
        .ok_or_else(|| malformed("missing timestamp"))?;
    let timestamp = parse_timestamp(raw_timestamp)
        .ok_or_else(|| malformed(&format!("unparseable timestamp '{raw_timestamp}'")))?;

    Ok(RawQueryEvent {
        query: query.to_owned(),
        timestamp,
    })
}

/// Parses every row, skipping and logging the malformed ones.
pub fn parse_search_history(records: &[RawSearchRecord]) -> ParsedHistory {
    let mut parsed = ParsedHistory::default();
    for (index, record) in records.iter().enumerate() {
        match parse_search_record(index, record) {
            Ok(event) => parsed.events.push(event),
            Err(err) => {
                tracing::debug!(error = %err, "skipping search record");
                parsed.skipped += 1;
            }
        }
    }

    if parsed.skipped > 0 {
        tracing::warn!(
            skipped = parsed.skipped,
            kept = parsed.events.len(),
            "skipped malformed search records"
        );
    }

    parsed
}

/// RFC 3339, or `YYYY-MM-DD` with an optional `HH:MM:SS` part, read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc())
}

/// Keeps events no older than `window_days`. `None` keeps everything.
pub fn within_window(
    events: Vec<RawQueryEvent>,
    window_days: Option<u32>,
    now: DateTime<Utc>,
) -> Vec<RawQueryEvent> {
    let Some(days) = window_days else {
        return events;
    };
    let cutoff = now - chrono::Duration::days(i64::from(days));
    events
        .into_iter()
        .filter(|event| event.timestamp >= cutoff)
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn event(query: &str, days_ago: i64) -> RawQueryEvent {
        RawQueryEvent {
            query: query.to_owned(),
            timestamp: now() - Duration::days(days_ago),
        }
    }

    #[test]
    fn decay_weight_is_one_at_age_zero_and_shrinks_with_age() {
        assert_eq!(decay_weight(now(), now(), 0.05), 1.0);
        assert_eq!(decay_weight(now() + Duration::days(3), now(), 0.05), 1.0);

        let ten_days = decay_weight(now() - Duration::days(10), now(), 0.05);
        assert!((ten_days - (-0.5f64).exp()).abs() < 1e-12);
        assert!(decay_weight(now() - Duration::days(11), now(), 0.05) < ten_days);
    }

    #[test]
    fn aggregate_groups_by_literal_query() {
        let events = vec![
            event("redes", 0),
            event("Redes", 0),
            event("redes", 10),
            event("   ", 0),
        ];

        let groups = aggregate(&events, 0.05, now());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].query(), "Redes");
        assert_eq!(groups[1].query(), "redes");
        assert_eq!(groups[1].raw_count(), 2);
        assert_eq!(groups[1].timestamps().len(), 2);
        assert!(groups[1].timestamps()[0] < groups[1].timestamps()[1]);
        assert!((groups[1].decayed_weight() - (1.0 + (-0.5f64).exp())).abs() < 1e-12);
    }

    #[test]
    fn aggregate_counts_uses_count_only_weight() {
        let rows = vec![
            TrendCount {
                query: "calculo".to_owned(),
                count: 30,
            },
            TrendCount {
                query: "calculo".to_owned(),
                count: 10,
            },
            TrendCount {
                query: String::new(),
                count: 99,
            },
        ];

        let groups = aggregate_counts(&rows, 0.1);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].raw_count(), 40);
        assert!((groups[0].decayed_weight() - 4.0).abs() < 1e-12);
        assert!(groups[0].timestamps().is_empty());
    }

    #[test]
    fn parse_timestamp_accepts_supported_formats() {
        let expected = Utc
            .with_ymd_and_hms(2025, 1, 2, 8, 30, 0)
            .single()
            .expect("valid timestamp");
        assert_eq!(parse_timestamp("2025-01-02T08:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-01-02T03:30:00-05:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-01-02 08:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-01-02T08:30:00.000"), Some(expected));
        assert_eq!(
            parse_timestamp("2025-01-02"),
            Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).single()
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn parse_search_history_skips_malformed_rows() {
        let records = vec![
            RawSearchRecord {
                query: Some("redes".to_owned()),
                timestamp: Some("2025-02-28".to_owned()),
                results_count: Some(4),
            },
            RawSearchRecord {
                query: None,
                timestamp: Some("2025-02-28".to_owned()),
                results_count: None,
            },
            RawSearchRecord {
                query: Some("calculo".to_owned()),
                timestamp: Some("not a date".to_owned()),
                results_count: None,
            },
            RawSearchRecord {
                query: Some("fisica".to_owned()),
                timestamp: None,
                results_count: None,
            },
        ];

        let parsed = parse_search_history(&records);
        assert_eq!(parsed.events.len(), 1);
        assert_eq!(parsed.skipped, 3);

        let err = parse_search_record(2, &records[2]).expect_err("bad timestamp");
        assert!(matches!(err, RankError::MalformedRecord { index: 2, .. }));
    }

    #[test]
    fn within_window_drops_old_events() {
        let events = vec![event("redes", 1), event("redes", 45), event("calculo", 30)];

        let kept = within_window(events.clone(), Some(30), now());
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|event| event.timestamp >= now() - Duration::days(30)));

        assert_eq!(within_window(events, None, now()).len(), 3);
    }
}

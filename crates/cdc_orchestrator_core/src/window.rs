use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::partition::Partition;
use crate::ports::{ListError, ObjectDescriptor, ObjectLister};

/// Inclusive range of minute partitions that one incremental job folds in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start_partition: Partition,
    pub end_partition: Partition,
}

/// Objects selected for a window, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowObjects {
    pub objects: Vec<ObjectDescriptor>,
    /// More in-window objects existed beyond the file limit.
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimits {
    pub safety_lag: Duration,
    pub max_incremental_interval: Duration,
}

/// Computes the next window after `last_processed`, or `None` when no
/// complete partition has landed since the watermark.
///
/// The upper bound is the earlier of `now - safety_lag` (floored to the
/// minute) and `last_processed + max_incremental_interval`.
pub fn compute_window(
    last_processed: Partition,
    now: DateTime<Utc>,
    limits: &WindowLimits,
) -> Option<Window> {
    let start_partition = last_processed.plus_minutes(1);
    let settled = Partition::floor(now - limits.safety_lag);
    let end_partition = match last_processed.checked_add(limits.max_incremental_interval) {
        Some(capped) => settled.min(capped),
        None => settled,
    };

    if end_partition < start_partition {
        return None;
    }

    Some(Window {
        start_partition,
        end_partition,
    })
}

impl Window {
    /// Exclusive upper partition bound.
    pub fn end_before_partition(&self) -> Partition {
        self.end_partition.plus_minutes(1)
    }

    /// Exclusive listing start key. Every object inside `start_partition`
    /// sorts after its directory key.
    pub fn start_after_key(&self, stream_prefix: &str) -> String {
        self.start_partition.key_prefix(stream_prefix)
    }

    pub fn end_before_key(&self, stream_prefix: &str) -> String {
        self.end_before_partition().key_prefix(stream_prefix)
    }

    pub fn partition_count(&self) -> i64 {
        (self.end_partition.as_datetime() - self.start_partition.as_datetime()).num_minutes() + 1
    }
}

/// Collects at most `max_files` objects inside `window`, oldest key first.
///
/// The lister is consumed lazily: listing stops at the window end or at the
/// first in-window key past the file limit.
pub fn collect_window_objects(
    lister: &dyn ObjectLister,
    stream_prefix: &str,
    window: &Window,
    max_files: usize,
) -> Result<WindowObjects, ListError> {
    let start_after_key = window.start_after_key(stream_prefix);
    let end_before_key = window.end_before_key(stream_prefix);
    let list_prefix = list_prefix(stream_prefix);

    let mut objects = Vec::new();
    let mut truncated = false;
    for entry in lister.list(&list_prefix, &start_after_key) {
        let object = entry?;
        if object.key.as_str() >= end_before_key.as_str() {
            break;
        }
        if object.key.as_str() <= start_after_key.as_str() {
            continue;
        }
        // One in-window key past the limit proves the window was cut short.
        if objects.len() == max_files {
            truncated = true;
            break;
        }
        objects.push(object);
    }

    Ok(WindowObjects { objects, truncated })
}

fn list_prefix(stream_prefix: &str) -> String {
    let trimmed = stream_prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use crate::memory::InMemoryObjectStore;

    use super::*;

    fn limits() -> WindowLimits {
        WindowLimits {
            safety_lag: Duration::minutes(2),
            max_incremental_interval: Duration::days(365),
        }
    }

    fn partition(value: &str) -> Partition {
        Partition::parse(value).expect("partition should parse")
    }

    #[test]
    fn window_stops_two_minutes_before_now() {
        let now = Utc.with_ymd_and_hms(2023, 8, 1, 0, 10, 30).unwrap();
        let window = compute_window(partition("2023-08-01-00-00"), now, &limits())
            .expect("window should be open");

        assert_eq!(window.start_partition, partition("2023-08-01-00-01"));
        assert_eq!(window.end_partition, partition("2023-08-01-00-08"));
        assert_eq!(window.end_before_partition(), partition("2023-08-01-00-09"));
        assert_eq!(window.partition_count(), 8);
    }

    #[test]
    fn window_is_capped_by_max_incremental_interval() {
        let now = Utc.with_ymd_and_hms(2023, 8, 2, 0, 0, 0).unwrap();
        let capped = WindowLimits {
            max_incremental_interval: Duration::minutes(5),
            ..limits()
        };
        let window = compute_window(partition("2023-08-01-00-00"), now, &capped)
            .expect("window should be open");

        assert_eq!(window.end_partition, partition("2023-08-01-00-05"));
    }

    #[test]
    fn window_is_closed_until_a_full_partition_settles() {
        let now = Utc.with_ymd_and_hms(2023, 8, 1, 0, 2, 59).unwrap();
        assert!(compute_window(partition("2023-08-01-00-00"), now, &limits()).is_none());

        let now = Utc.with_ymd_and_hms(2023, 8, 1, 0, 3, 0).unwrap();
        let window = compute_window(partition("2023-08-01-00-00"), now, &limits())
            .expect("window should open once 00-01 settles");
        assert_eq!(window.start_partition, window.end_partition);
    }

    #[test]
    fn window_never_reaches_behind_the_watermark() {
        let now = Utc.with_ymd_and_hms(2023, 7, 1, 0, 0, 0).unwrap();
        assert!(compute_window(partition("2023-08-01-00-00"), now, &limits()).is_none());
    }

    #[test]
    fn collects_only_keys_inside_the_window() {
        let store = InMemoryObjectStore::new("lake-data");
        for key in [
            "cdc/update_at=2023-08-01-00-00/a.json",
            "cdc/update_at=2023-08-01-00-01/a.json",
            "cdc/update_at=2023-08-01-00-01/b.json",
            "cdc/update_at=2023-08-01-00-03/a.json",
            "cdc/update_at=2023-08-01-00-04/a.json",
        ] {
            store.put_object(key, b"{}");
        }
        let window = Window {
            start_partition: partition("2023-08-01-00-01"),
            end_partition: partition("2023-08-01-00-03"),
        };

        let selected =
            collect_window_objects(&store, "cdc/", &window, 100).expect("listing should pass");
        assert!(!selected.truncated);
        let objects = selected.objects;
        let keys: Vec<&str> = objects.iter().map(|object| object.key.as_str()).collect();

        assert_eq!(
            keys,
            vec![
                "cdc/update_at=2023-08-01-00-01/a.json",
                "cdc/update_at=2023-08-01-00-01/b.json",
                "cdc/update_at=2023-08-01-00-03/a.json",
            ]
        );
        assert_eq!(
            objects[0].uri,
            "s3://lake-data/cdc/update_at=2023-08-01-00-01/a.json"
        );
    }

    #[test]
    fn truncates_to_oldest_files_first() {
        let store = InMemoryObjectStore::new("lake-data");
        for minute in (1..=9).rev() {
            store.put_object(&format!("cdc/update_at=2023-08-01-00-0{minute}/part.json"), b"{}");
        }
        let window = Window {
            start_partition: partition("2023-08-01-00-01"),
            end_partition: partition("2023-08-01-00-09"),
        };

        let selected =
            collect_window_objects(&store, "cdc", &window, 3).expect("listing should pass");

        assert!(selected.truncated);
        let objects = selected.objects;
        assert_eq!(objects.len(), 3);
        assert_eq!(objects[0].key, "cdc/update_at=2023-08-01-00-01/part.json");
        assert_eq!(objects[2].key, "cdc/update_at=2023-08-01-00-03/part.json");
    }

    #[test]
    fn exactly_filling_the_limit_is_not_truncation() {
        let store = InMemoryObjectStore::new("lake-data");
        for minute in 1..=3 {
            store.put_object(&format!("cdc/update_at=2023-08-01-00-0{minute}/part.json"), b"{}");
        }
        store.put_object("cdc/update_at=2023-08-01-00-05/late.json", b"{}");
        let window = Window {
            start_partition: partition("2023-08-01-00-01"),
            end_partition: partition("2023-08-01-00-04"),
        };

        let selected =
            collect_window_objects(&store, "cdc", &window, 3).expect("listing should pass");

        assert_eq!(selected.objects.len(), 3);
        assert!(!selected.truncated);
    }

    #[test]
    fn propagates_listing_failures() {
        let store = InMemoryObjectStore::new("lake-data");
        store.fail_listing("access denied");
        let window = Window {
            start_partition: partition("2023-08-01-00-01"),
            end_partition: partition("2023-08-01-00-02"),
        };

        let error = collect_window_objects(&store, "cdc", &window, 10)
            .expect_err("listing failure should propagate");
        assert!(error.to_string().contains("access denied"));
    }
}
